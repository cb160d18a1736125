//! Errors - エラー型と分類
//!
//! # 分類
//! - ResourceNotFound: 未発行・削除済みの ID を参照した
//! - ResourceFailed: アイテムの初期化タスクが回復不能なエラーを報告した
//! - SchedulerMisuse: 回収済み ID へのスケジュールなど、呼び出し側のプログラミングエラー
//!
//! タスク本体のエラーはワーカー境界を越えて伝播しません。
//! ワーカーがアイテムのログに記録し、アイテムを Failed 状態に遷移させます。

use thiserror::Error;

/// Convenience result type used across easel.
pub type EaselResult<T> = Result<T, EaselError>;

#[derive(Debug, Error)]
pub enum EaselError {
    /// Lookup of a never-issued or removed id.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The item (or the upstream item of a pipeline) is in failed status.
    #[error("resource failed: {0}")]
    ResourceFailed(String),

    /// Programming error in calling code, surfaced at submission time.
    #[error("scheduler misuse: {0}")]
    SchedulerMisuse(String),

    /// The item exists but no task has populated its payload yet.
    #[error("{0} has no payload yet")]
    Unpopulated(String),

    /// Invalid caller-supplied data (sizes, names, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Error reported by a task body.
    #[error("task error: {0}")]
    Task(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Other(String),
}

impl EaselError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::ResourceNotFound(what.into())
    }

    pub fn failed(what: impl Into<String>) -> Self {
        Self::ResourceFailed(what.into())
    }

    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::SchedulerMisuse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }
}
