//! Item identifiers (strongly-typed, per-kind integer IDs).
//!
//! # Phantom Type パターン
//! `ItemId<K>` は `K`（リソース種別のマーカー型）を PhantomData として持つだけで、
//! 実行時には `u64` 一つ分のサイズしかありません。
//! コンパイル時に「画像の ID をファイルのコレクションに渡す」ような混同を防ぎます。
//!
//! ID はコレクションごとに単調増加し、回収（collect）後も再利用されません。

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use super::kind::{BackgroundTask, Context, File, Image, Kind, QrCode};

/// Identifier of one item inside a `Collection<K>`.
///
/// Trait impls are written by hand so that they do not require `K` itself to be
/// `Clone`/`Eq`/... (markers are uninhabited enums).
#[repr(transparent)]
pub struct ItemId<K> {
    raw: u64,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ItemId<K> {
    /// Rebuild an id from its raw integer (the kind-by-value surface passes raw ids).
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    pub const fn as_raw(self) -> u64 {
        self.raw
    }
}

impl<K> Clone for ItemId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for ItemId<K> {}

impl<K> PartialEq for ItemId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for ItemId<K> {}

impl<K> Hash for ItemId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K> PartialOrd for ItemId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for ItemId<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K> fmt::Debug for ItemId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.raw)
    }
}

impl<K: Kind> fmt::Display for ItemId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", K::KIND, self.raw)
    }
}

// ========================================
// Type Alias（使いやすさのため）
// ========================================

/// Identifier of a background task item.
pub type TaskId = ItemId<BackgroundTask>;

/// Identifier of an in-flight image.
pub type ImageId = ItemId<Image>;

/// Identifier of an open file.
pub type FileId = ItemId<File>;

/// Identifier of an execution context.
pub type ContextId = ItemId<Context>;

/// Identifier of a QR code.
pub type QrCodeId = ItemId<QrCode>;
