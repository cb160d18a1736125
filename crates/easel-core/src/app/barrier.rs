//! Barrier - 同期バリア
//!
//! バリアは「何もしないタスク」を投入してその完了を待つだけです。
//! アイテムのキューは FIFO なので、それ以前に投入されたタスクがすべて終わった時点で解決します。
//!
//! `DynCollection` は種別を値で受け取る側（スクリプト層、`wait_extensive`）のための
//! 型消去された面です。

use async_trait::async_trait;

use super::collection::Collection;
use crate::domain::{
    EaselResult, ItemId, ItemStatus, Kind, ResourceKind, SharedTask, Task, TaskOutcome,
};
use crate::observability::CollectionCounts;
use crate::queue::{Completion, CompletionSet};

const BARRIER: &str = "barrier";

impl<K: Kind> Collection<K> {
    /// Resolves once every task submitted to `id` before this call has finished.
    pub async fn wait(&self, id: ItemId<K>) -> EaselResult<TaskOutcome> {
        let completion = self.schedule(id, Task::noop(BARRIER))?;
        Ok(completion.wait().await)
    }

    /// `wait` on every non-collected item, concurrently.
    pub async fn wait_all(&self) -> Vec<TaskOutcome> {
        self.schedule_all(&SharedTask::noop(BARRIER))
            .wait_all()
            .await
    }
}

/// Kind-erased view of a collection.
#[async_trait]
pub trait DynCollection: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn counts(&self) -> CollectionCounts;

    fn status_raw(&self, raw: u64) -> EaselResult<ItemStatus>;

    fn collect_raw(&self, raw: u64) -> EaselResult<Completion>;

    fn sweep(&self) -> CompletionSet;

    async fn wait_raw(&self, raw: u64) -> EaselResult<TaskOutcome>;

    async fn wait_all(&self) -> Vec<TaskOutcome>;
}

#[async_trait]
impl<K: Kind> DynCollection for Collection<K> {
    fn kind(&self) -> ResourceKind {
        K::KIND
    }

    fn counts(&self) -> CollectionCounts {
        Collection::counts(self)
    }

    fn status_raw(&self, raw: u64) -> EaselResult<ItemStatus> {
        self.status(ItemId::from_raw(raw))
    }

    fn collect_raw(&self, raw: u64) -> EaselResult<Completion> {
        self.collect(ItemId::from_raw(raw))
    }

    fn sweep(&self) -> CompletionSet {
        Collection::sweep(self)
    }

    async fn wait_raw(&self, raw: u64) -> EaselResult<TaskOutcome> {
        self.wait(ItemId::from_raw(raw)).await
    }

    async fn wait_all(&self) -> Vec<TaskOutcome> {
        Collection::wait_all(self).await
    }
}
