//! IdGenerator port - ID 生成の抽象化
//!
//! コレクションとクレートはそれぞれ独立した生成器を持ち、
//! 種別ごとに単調増加する整数 ID を発行します。
//!
//! # 実装
//! - **SequentialIds**: AtomicU64 カウンタ（1 から開始）

use std::sync::atomic::{AtomicU64, Ordering};

/// IdGenerator は生 ID（u64）を発行
///
/// # Thread Safety
/// - `Send + Sync` を要求（スクリプトスレッド以外からも allocate できる）
pub trait IdGenerator: Send + Sync {
    /// Next raw id. Never returns the same value twice.
    fn next_raw(&self) -> u64;
}

/// Monotonic counter starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed).saturating_sub(1)
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
