//! Collection - 同種アイテムの集合
//!
//! # 責務
//! - ID の発行とアイテムの登録（allocate）
//! - アイテム単位のスケジュール（schedule / schedule_all / schedule_and_allocate）
//! - 回収（collect / sweep）
//!
//! 投入時のミス（未発行 ID、回収済み ID）は `SchedulerMisuse` として同期的に返します。
//! 状態の参照（`status`）で未発行 ID を引いた場合は `ResourceNotFound` です。
//! タスク本体の失敗はアイテムの状態として現れ、ここでは返りません。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::Handle;

use crate::domain::{EaselError, EaselResult, ItemId, ItemStatus, Kind, SharedTask, Task};
use crate::observability::{CollectionCounts, ResourceLog};
use crate::ports::{Disposer, IdGenerator, SequentialIds};
use crate::queue::{Completion, CompletionSet, Item};

type Items<P> = HashMap<u64, Arc<Item<P>>>;

/// All items of one resource kind.
pub struct Collection<K: Kind> {
    log: ResourceLog,
    ids: SequentialIds,
    items: RwLock<Items<K::Payload>>,
    disposer: Arc<dyn Disposer<K::Payload>>,
    runtime: Handle,
    queue_warn_depth: usize,
}

impl<K: Kind> Collection<K> {
    /// The collection's log is a child of `parent` named after the kind.
    pub fn new(
        parent: &ResourceLog,
        disposer: Arc<dyn Disposer<K::Payload>>,
        runtime: Handle,
        queue_warn_depth: usize,
    ) -> Self {
        Self {
            log: parent.child(K::KIND.as_str()),
            ids: SequentialIds::new(),
            items: RwLock::new(HashMap::new()),
            disposer,
            runtime,
            queue_warn_depth,
        }
    }

    pub fn log(&self) -> &ResourceLog {
        &self.log
    }

    /// Register a new, unpopulated item logging under this collection.
    pub fn allocate(&self) -> ItemId<K> {
        let log = self.log.clone();
        self.allocate_under(&log)
    }

    /// Register a new, unpopulated item whose log is a child of `parent`.
    ///
    /// Never blocks on any worker; the item's worker starts with its first task.
    pub fn allocate_under(&self, parent: &ResourceLog) -> ItemId<K> {
        let id = ItemId::<K>::from_raw(self.ids.next_raw());
        let label = id.to_string();
        let item = Item::new(label.clone(), parent.child(&label));
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.as_raw(), Arc::new(item));
        self.log.debug(format_args!("allocated {label}"));
        id
    }

    /// Append `task` to the item's queue.
    pub fn schedule(&self, id: ItemId<K>, task: Task<K::Payload>) -> EaselResult<Completion> {
        self.submittable(id)?
            .submit(task, &self.runtime, self.queue_warn_depth)
    }

    /// Submit one instance of `task` to every item that is not collected at
    /// call time. Items allocated afterwards are not included.
    pub fn schedule_all(&self, task: &SharedTask<K::Payload>) -> CompletionSet {
        let mut set = CompletionSet::new();
        for item in self.snapshot() {
            // an item collected between the snapshot and here just drops out
            if let Ok(completion) =
                item.submit(task.instantiate(), &self.runtime, self.queue_warn_depth)
            {
                set.push(completion);
            }
        }
        set
    }

    /// Allocate an item and make `init` its first task.
    ///
    /// Returns as soon as `init` is queued. Anything scheduled on the returned
    /// id afterwards (including a barrier) runs after `init`.
    pub fn schedule_and_allocate(&self, init: Task<K::Payload>) -> EaselResult<ItemId<K>> {
        let log = self.log.clone();
        self.schedule_and_allocate_under(&log, init)
    }

    pub fn schedule_and_allocate_under(
        &self,
        parent: &ResourceLog,
        init: Task<K::Payload>,
    ) -> EaselResult<ItemId<K>> {
        let id = self.allocate_under(parent);
        self.schedule(id, init)?.detach();
        Ok(id)
    }

    /// Release the item. The disposal hook runs once, after every task already
    /// queued on the item; later calls resolve immediately with `Skipped`.
    pub fn collect(&self, id: ItemId<K>) -> EaselResult<Completion> {
        let item = self.submittable(id)?;
        Ok(item.collect(Arc::clone(&self.disposer), &self.runtime))
    }

    /// Collect every item that is not collected yet.
    pub fn sweep(&self) -> CompletionSet {
        let items = self.snapshot();
        if !items.is_empty() {
            self.log
                .debug(format_args!("sweeping {} items", items.len()));
        }
        items
            .into_iter()
            .map(|item| item.collect(Arc::clone(&self.disposer), &self.runtime))
            .collect()
    }

    pub fn status(&self, id: ItemId<K>) -> EaselResult<ItemStatus> {
        Ok(self.item(id)?.status())
    }

    /// Every id issued so far, in allocation order (collected ones included).
    pub fn ids(&self) -> Vec<ItemId<K>> {
        let mut ids: Vec<_> = self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|raw| ItemId::from_raw(*raw))
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> CollectionCounts {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts = CollectionCounts::default();
        for item in items.values() {
            match item.status() {
                ItemStatus::Alive => counts.alive += 1,
                ItemStatus::Failed { .. } => counts.failed += 1,
                ItemStatus::Collected => counts.collected += 1,
            }
            counts.pending += item.pending();
            counts.backlog_warnings += item.backlog_warnings();
        }
        counts
    }

    /// Fails with `SchedulerMisuse` when `id` is issued but collected.
    pub(crate) fn ensure_schedulable(&self, id: ItemId<K>) -> EaselResult<()> {
        if self.submittable(id)?.status().is_collected() {
            return Err(EaselError::misuse(format!("{id} has been collected")));
        }
        Ok(())
    }

    /// Lookup for submissions: an id outside the issued range is misuse.
    fn submittable(&self, id: ItemId<K>) -> EaselResult<Arc<Item<K::Payload>>> {
        let raw = id.as_raw();
        if raw == 0 || raw > self.ids.issued() {
            return Err(EaselError::misuse(format!(
                "{id} is out of range; {} ids issued",
                self.ids.issued()
            )));
        }
        self.item(id)
    }

    fn item(&self, id: ItemId<K>) -> EaselResult<Arc<Item<K::Payload>>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id.as_raw())
            .cloned()
            .ok_or_else(|| EaselError::not_found(id.to_string()))
    }

    /// Non-collected items ordered by id.
    fn snapshot(&self) -> Vec<Arc<Item<K::Payload>>> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        let mut live: Vec<_> = items
            .iter()
            .filter(|(_, item)| !item.status().is_collected())
            .map(|(raw, item)| (*raw, Arc::clone(item)))
            .collect();
        live.sort_by_key(|(raw, _)| *raw);
        live.into_iter().map(|(_, item)| item).collect()
    }
}

impl<K: Kind> std::fmt::Debug for Collection<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("kind", &K::KIND)
            .field("log", &self.log)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::domain::{ResourceKind, Slot, TaskOutcome};
    use crate::impls::DropDisposer;

    /// Test-only kind carrying a counter.
    pub(crate) enum Counter {}

    impl Kind for Counter {
        type Payload = u64;
        const KIND: ResourceKind = ResourceKind::Task;
    }

    pub(crate) fn counters() -> Collection<Counter> {
        Collection::new(
            &ResourceLog::root("test"),
            Arc::new(DropDisposer),
            Handle::current(),
            64,
        )
    }

    fn add(n: u64) -> Task<u64> {
        Task::new("add", move |slot: &mut Slot<u64>| {
            let next = slot.value().copied().unwrap_or(0) + n;
            slot.set(next);
            Ok(())
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tasks_on_one_item_run_in_submission_order() {
        let coll = Arc::new(counters());
        let id = coll.allocate();
        let ticket = Arc::new(Mutex::new(0usize));
        let observed = Arc::new(Mutex::new(Vec::new()));

        let submitters: Vec<_> = (0..8)
            .map(|_| {
                let coll = Arc::clone(&coll);
                let ticket = Arc::clone(&ticket);
                let observed = Arc::clone(&observed);
                tokio::spawn(async move {
                    let mut pending = CompletionSet::new();
                    for _ in 0..25 {
                        // take the ticket and submit under the same lock, so
                        // ticket order is submission order
                        let completion = {
                            let mut next = ticket.lock().unwrap();
                            let n = *next;
                            *next += 1;
                            let observed = Arc::clone(&observed);
                            coll.schedule(
                                id,
                                Task::new("record", move |_: &mut Slot<u64>| {
                                    observed.lock().unwrap().push(n);
                                    Ok(())
                                }),
                            )
                            .unwrap()
                        };
                        pending.push(completion);
                        tokio::task::yield_now().await;
                    }
                    pending.wait_all().await
                })
            })
            .collect();

        for submitter in submitters {
            let outcomes = submitter.await.unwrap();
            assert!(outcomes.iter().all(TaskOutcome::is_success));
        }
        let observed = observed.lock().unwrap().clone();
        assert_eq!(observed, (0..200).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn busy_item_does_not_block_others() {
        let coll = counters();
        let a = coll.allocate();
        let b = coll.allocate();
        let (release, gate) = std::sync::mpsc::channel::<()>();

        let mut blocked = coll
            .schedule(
                a,
                Task::new("hold", move |_: &mut Slot<u64>| {
                    gate.recv().map_err(|e| EaselError::task(e.to_string()))
                }),
            )
            .unwrap();

        let done = tokio::time::timeout(
            Duration::from_secs(2),
            coll.schedule(b, add(1)).unwrap().wait(),
        )
        .await
        .expect("b should not wait for a");
        assert_eq!(done, TaskOutcome::Completed);
        assert_eq!(blocked.try_outcome(), None);

        release.send(()).unwrap();
        assert_eq!(blocked.wait().await, TaskOutcome::Completed);
    }

    #[tokio::test]
    async fn never_issued_ids_are_misuse_to_schedule_and_not_found_to_look_up() {
        let coll = counters();
        let issued = coll.allocate();
        let beyond = ItemId::<Counter>::from_raw(issued.as_raw() + 1);

        let err = coll.schedule(beyond, add(1)).unwrap_err();
        assert!(matches!(err, EaselError::SchedulerMisuse(ref why) if why.contains("task-2")));
        assert!(matches!(coll.collect(beyond), Err(EaselError::SchedulerMisuse(_))));
        assert!(matches!(
            coll.schedule(ItemId::from_raw(0), add(1)),
            Err(EaselError::SchedulerMisuse(_))
        ));
        let err = coll.status(beyond).unwrap_err();
        assert!(matches!(err, EaselError::ResourceNotFound(ref what) if what == "task-2"));
    }

    #[tokio::test]
    async fn allocate_under_parents_the_item_log() {
        let coll = counters();
        let script = ResourceLog::root("script").child("blend.lua");
        let id = coll.allocate_under(&script);

        let (tx, rx) = tokio::sync::oneshot::channel();
        coll.schedule(
            id,
            Task::new("where", move |slot: &mut Slot<u64>| {
                let _ = tx.send(slot.log().path().to_string());
                Ok(())
            }),
        )
        .unwrap()
        .detach();
        assert_eq!(rx.await.unwrap(), format!("script/blend.lua/{id}"));

        let plain = coll.allocate();
        assert_eq!(plain.as_raw(), id.as_raw() + 1);
    }

    #[tokio::test]
    async fn collect_disposes_exactly_once_after_queued_work() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let disposer = {
            let disposed = Arc::clone(&disposed);
            let seen = Arc::clone(&seen);
            move |slot: &mut Slot<u64>| -> EaselResult<()> {
                disposed.fetch_add(1, Ordering::SeqCst);
                *seen.lock().unwrap() = slot.take();
                Ok(())
            }
        };
        let coll: Collection<Counter> = Collection::new(
            &ResourceLog::root("test"),
            Arc::new(disposer),
            Handle::current(),
            64,
        );

        let id = coll.allocate();
        coll.schedule(id, add(5)).unwrap().detach();
        coll.schedule(id, add(2)).unwrap().detach();
        let first = coll.collect(id).unwrap();
        let second = coll.collect(id).unwrap();

        assert_eq!(first.wait().await, TaskOutcome::Disposed);
        assert_eq!(second.wait().await, TaskOutcome::Skipped);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        // disposal saw the effects of everything queued before it
        assert_eq!(*seen.lock().unwrap(), Some(7));

        assert!(matches!(coll.schedule(id, add(1)), Err(EaselError::SchedulerMisuse(_))));
        assert_eq!(coll.status(id).unwrap(), ItemStatus::Collected);
        assert!(coll.sweep().is_empty());
    }

    #[tokio::test]
    async fn schedule_all_covers_items_present_at_call_time() {
        let coll = counters();
        let ids: Vec<_> = (0..5).map(|_| coll.allocate()).collect();
        coll.collect(ids[4]).unwrap().wait().await;

        let set = coll.schedule_all(&SharedTask::new("inc", |slot: &mut Slot<u64>| {
            let next = slot.value().copied().unwrap_or(0) + 1;
            slot.set(next);
            Ok(())
        }));
        let late = coll.allocate();
        assert_eq!(set.len(), 4);
        assert!(set.wait_all().await.iter().all(TaskOutcome::is_success));

        let counts = coll.counts();
        assert_eq!(counts.alive, 5);
        assert_eq!(counts.collected, 1);
        assert_eq!(counts.pending, 0);
        assert_eq!(coll.ids().last(), Some(&late));
    }

    #[tokio::test]
    async fn init_runs_before_anything_scheduled_later() {
        let coll = counters();
        let id = coll.schedule_and_allocate(add(10)).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        coll.schedule(
            id,
            Task::new("read", move |slot: &mut Slot<u64>| {
                let _ = tx.send(slot.require().copied());
                Ok(())
            }),
        )
        .unwrap()
        .detach();
        assert_eq!(rx.await.unwrap().unwrap(), 10);
    }
}
