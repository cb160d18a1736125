//! Disposer port - 回収フック
//!
//! `collect` と終了時の sweep から、非回収アイテムごとに一度だけ呼ばれます。
//! 実行はアイテム自身のワーカー上で、既に投入済みのタスクがすべて終わった後です。

use crate::domain::errors::EaselResult;
use crate::domain::slot::Slot;

/// Disposal hook for one resource kind (e.g. "close the underlying file handle").
pub trait Disposer<P>: Send + Sync {
    fn dispose(&self, slot: &mut Slot<P>) -> EaselResult<()>;
}

impl<P, F> Disposer<P> for F
where
    F: Fn(&mut Slot<P>) -> EaselResult<()> + Send + Sync,
{
    fn dispose(&self, slot: &mut Slot<P>) -> EaselResult<()> {
        self(slot)
    }
}
