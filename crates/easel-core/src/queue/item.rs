//! Item: one resource instance plus its private, strictly ordered work queue.
//!
//! Design:
//! - `inbox` holds the sending half of the queue. Submission and collection
//!   both go through the inbox lock, so "check not collected, then enqueue" is
//!   atomic with respect to `collect`.
//! - The worker is spawned lazily on the first job; until then the receiver and
//!   the empty slot wait in `idle`.
//! - The worker owns the slot. For every job it moves the slot onto tokio's
//!   blocking pool, runs the chosen branch there, and takes the slot back.
//! - `shared` is what the worker needs to report back (failure, pending depth).
//!   It holds no sender, so dropping the item lets the worker drain and stop.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::completion::{Completion, Reply};
use crate::domain::{EaselError, EaselResult, ItemStatus, Slot, Task, TaskOutcome};
use crate::observability::ResourceLog;
use crate::ports::Disposer;

pub(crate) enum Job<P> {
    Run {
        task: Task<P>,
        reply: Reply,
    },
    Dispose {
        disposer: Arc<dyn Disposer<P>>,
        reply: Reply,
    },
}

struct Inbox<P> {
    sender: Option<mpsc::UnboundedSender<Job<P>>>,
    idle: Option<(mpsc::UnboundedReceiver<Job<P>>, Slot<P>)>,
}

#[derive(Default)]
struct Lifecycle {
    failure: Option<String>,
    collected: bool,
}

struct ItemShared {
    lifecycle: Mutex<Lifecycle>,
    pending: AtomicUsize,
}

impl ItemShared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure(&self) -> Option<String> {
        self.lifecycle().failure.clone()
    }

    fn mark_failed(&self, reason: String) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.failure.is_none() {
            lifecycle.failure = Some(reason);
        }
    }

    fn finish_job(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct Item<P> {
    label: String,
    log: ResourceLog,
    inbox: Mutex<Inbox<P>>,
    shared: Arc<ItemShared>,
    /// Times the pending depth reached the warning threshold.
    backlog_warnings: AtomicUsize,
}

impl<P: Send + 'static> Item<P> {
    pub(crate) fn new(label: String, log: ResourceLog) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let slot = Slot::new(label.clone(), log.clone());
        Self {
            label,
            log,
            inbox: Mutex::new(Inbox {
                sender: Some(sender),
                idle: Some((receiver, slot)),
            }),
            shared: Arc::new(ItemShared {
                lifecycle: Mutex::new(Lifecycle::default()),
                pending: AtomicUsize::new(0),
            }),
            backlog_warnings: AtomicUsize::new(0),
        }
    }

    pub(crate) fn status(&self) -> ItemStatus {
        let lifecycle = self.shared.lifecycle();
        if lifecycle.collected {
            ItemStatus::Collected
        } else if let Some(reason) = &lifecycle.failure {
            ItemStatus::Failed {
                reason: reason.clone(),
            }
        } else {
            ItemStatus::Alive
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub(crate) fn backlog_warnings(&self) -> usize {
        self.backlog_warnings.load(Ordering::Relaxed)
    }

    /// Append `task` to the queue.
    pub(crate) fn submit(
        &self,
        task: Task<P>,
        runtime: &Handle,
        warn_depth: usize,
    ) -> EaselResult<Completion> {
        let (reply, completion) = Completion::channel();
        let mut inbox = self.lock_inbox();
        let Some(sender) = inbox.sender.as_ref() else {
            return Err(EaselError::misuse(format!(
                "{} has been collected; cannot schedule {}",
                self.label,
                task.origin()
            )));
        };

        let depth = self.shared.pending.fetch_add(1, Ordering::AcqRel) + 1;
        if sender.send(Job::Run { task, reply }).is_err() {
            self.shared.finish_job();
            return Err(EaselError::misuse(format!(
                "worker for {} has stopped",
                self.label
            )));
        }
        self.start_worker(&mut inbox, runtime);
        drop(inbox);

        if depth == warn_depth {
            self.backlog_warnings.fetch_add(1, Ordering::Relaxed);
            self.log.warn(format_args!(
                "{depth} jobs pending on {}; callers may be outrunning the worker",
                self.label
            ));
        }
        Ok(completion)
    }

    /// Queue the disposal hook behind everything already submitted and close
    /// the queue. Only the first call does anything.
    pub(crate) fn collect(
        &self,
        disposer: Arc<dyn Disposer<P>>,
        runtime: &Handle,
    ) -> Completion {
        let mut inbox = self.lock_inbox();
        let Some(sender) = inbox.sender.take() else {
            return Completion::ready(TaskOutcome::Skipped);
        };
        self.shared.lifecycle().collected = true;

        let (reply, completion) = Completion::channel();
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(Job::Dispose { disposer, reply }).is_err() {
            self.shared.finish_job();
            return Completion::ready(TaskOutcome::Abandoned);
        }
        self.start_worker(&mut inbox, runtime);
        self.log.debug("collection requested");
        completion
    }

    fn start_worker(&self, inbox: &mut Inbox<P>, runtime: &Handle) {
        if let Some((receiver, slot)) = inbox.idle.take() {
            self.log.debug("worker started");
            runtime.spawn(drain(receiver, slot, Arc::clone(&self.shared)));
        }
    }

    fn lock_inbox(&self) -> MutexGuard<'_, Inbox<P>> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Worker loop: one per item, jobs strictly in submission order.
async fn drain<P: Send + 'static>(
    mut receiver: mpsc::UnboundedReceiver<Job<P>>,
    mut slot: Slot<P>,
    shared: Arc<ItemShared>,
) {
    while let Some(job) = receiver.recv().await {
        match job {
            Job::Run { mut task, reply } => {
                // gates are awaited here, so a waiting task holds no blocking thread
                let blocked = match (shared.failure(), task.take_gate()) {
                    (Some(reason), _) => Some(format!("item failed ({reason})")),
                    (None, Some(gate)) => gate.await.err(),
                    (None, None) => None,
                };
                let joined = tokio::task::spawn_blocking(move || {
                    let outcome = execute(&mut slot, task, blocked);
                    (slot, outcome)
                })
                .await;

                match joined {
                    Ok((returned, outcome)) => {
                        slot = returned;
                        if let TaskOutcome::Failed { reason } = &outcome {
                            shared.mark_failed(reason.clone());
                        }
                        shared.finish_job();
                        let _ = reply.send(outcome);
                    }
                    Err(err) => {
                        // the slot went down with the blocking task; nothing left to run against
                        shared.mark_failed(format!("worker lost its slot: {err}"));
                        shared.finish_job();
                        let _ = reply.send(TaskOutcome::Abandoned);
                        return;
                    }
                }
            }
            Job::Dispose { disposer, reply } => {
                let joined =
                    tokio::task::spawn_blocking(move || dispose(&mut slot, disposer)).await;
                shared.finish_job();
                let _ = reply.send(joined.unwrap_or(TaskOutcome::Abandoned));
                return;
            }
        }
    }
}

/// Pick and run a branch. `blocked` names why the main branch must not run
/// (the item failed, or the task's gate refused).
fn execute<P>(slot: &mut Slot<P>, task: Task<P>, blocked: Option<String>) -> TaskOutcome {
    let (origin, run, on_failure) = task.into_parts();

    if let Some(reason) = blocked {
        let Some(recover) = on_failure else {
            slot.log()
                .debug(format_args!("{origin} skipped: {reason}"));
            return TaskOutcome::Skipped;
        };
        return match catch_unwind(AssertUnwindSafe(|| recover(slot))) {
            Ok(()) => TaskOutcome::Recovered,
            Err(panic) => {
                let reason = format!(
                    "{origin}: failure branch panicked: {}",
                    panic_message(&*panic)
                );
                slot.log().error(&reason);
                TaskOutcome::Failed { reason }
            }
        };
    }

    let Some(run) = run else {
        return TaskOutcome::Completed;
    };
    match catch_unwind(AssertUnwindSafe(|| run(slot))) {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(err)) => {
            let reason = format!("{origin}: {err}");
            slot.log().error(&reason);
            TaskOutcome::Failed { reason }
        }
        Err(panic) => {
            let reason = format!("{origin}: panicked: {}", panic_message(&*panic));
            slot.log().error(&reason);
            TaskOutcome::Failed { reason }
        }
    }
}

fn dispose<P>(slot: &mut Slot<P>, disposer: Arc<dyn Disposer<P>>) -> TaskOutcome {
    match catch_unwind(AssertUnwindSafe(|| disposer.dispose(slot))) {
        Ok(Ok(())) => {
            slot.log().debug("disposed");
            TaskOutcome::Disposed
        }
        Ok(Err(err)) => {
            let reason = format!("dispose: {err}");
            slot.log().error(&reason);
            TaskOutcome::Failed { reason }
        }
        Err(panic) => {
            let reason = format!("dispose panicked: {}", panic_message(&*panic));
            slot.log().error(&reason);
            TaskOutcome::Failed { reason }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn item() -> Item<u32> {
        Item::new("task-1".into(), ResourceLog::root("test"))
    }

    fn set(value: u32) -> Task<u32> {
        Task::new("set", move |slot: &mut Slot<u32>| {
            slot.set(value);
            Ok(())
        })
    }

    #[tokio::test]
    async fn worker_is_not_started_until_first_job() {
        let item = item();
        assert!(item.lock_inbox().idle.is_some());

        let done = item.submit(set(1), &Handle::current(), 64).unwrap();
        assert!(item.lock_inbox().idle.is_none());
        assert_eq!(done.wait().await, TaskOutcome::Completed);
        assert_eq!(item.pending(), 0);
    }

    #[tokio::test]
    async fn run_error_marks_item_failed_before_signal() {
        let item = item();
        let rt = Handle::current();

        let failing =
            Task::new("decode", |_: &mut Slot<u32>| Err(EaselError::task("bad header")));
        let outcome = item.submit(failing, &rt, 64).unwrap().wait().await;
        assert_eq!(
            outcome,
            TaskOutcome::Failed {
                reason: "decode: task error: bad header".into()
            }
        );
        assert!(item.status().is_failed());

        // later tasks: skipped without on_failure, recovered with it
        let skipped = item.submit(set(2), &rt, 64).unwrap().wait().await;
        assert_eq!(skipped, TaskOutcome::Skipped);
        let recovered = item
            .submit(set(3).on_failure(|_| {}), &rt, 64)
            .unwrap()
            .wait()
            .await;
        assert_eq!(recovered, TaskOutcome::Recovered);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let item = item();
        let rt = Handle::current();

        let boom =
            Task::new("boom", |_: &mut Slot<u32>| -> EaselResult<()> { panic!("kaboom") });
        let outcome = item.submit(boom, &rt, 64).unwrap().wait().await;
        assert!(matches!(outcome, TaskOutcome::Failed { ref reason } if reason.contains("kaboom")));

        // the worker survives and keeps signalling
        let next = tokio::time::timeout(
            Duration::from_secs(1),
            item.submit(Task::noop("after"), &rt, 64).unwrap().wait(),
        )
        .await
        .unwrap();
        assert_eq!(next, TaskOutcome::Skipped);
    }

    #[tokio::test]
    async fn submit_after_collect_is_misuse() {
        let item = item();
        let rt = Handle::current();
        let disposer: Arc<dyn Disposer<u32>> =
            Arc::new(|_: &mut Slot<u32>| -> EaselResult<()> { Ok(()) });

        let disposed = item.collect(Arc::clone(&disposer), &rt);
        assert!(item.status().is_collected());
        assert_eq!(disposed.wait().await, TaskOutcome::Disposed);

        let err = item.submit(set(1), &rt, 64).unwrap_err();
        assert!(matches!(err, EaselError::SchedulerMisuse(_)));
        assert_eq!(item.collect(disposer, &rt).wait().await, TaskOutcome::Skipped);
    }

    #[tokio::test]
    async fn refused_gate_diverts_without_failing_the_item() {
        let item = item();
        let rt = Handle::current();
        let (open, gate) = tokio::sync::oneshot::channel::<Result<(), String>>();

        let gated_task = set(1)
            .on_failure(|_| {})
            .gated(async move { gate.await.unwrap_or_else(|_| Err("gate dropped".into())) });
        let mut gated = item.submit(gated_task, &rt, 64).unwrap();
        let after = item.submit(set(2), &rt, 64).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(gated.try_outcome(), None);

        open.send(Err("upstream task-9 failed".into())).unwrap();
        assert_eq!(gated.wait().await, TaskOutcome::Recovered);
        assert_eq!(after.wait().await, TaskOutcome::Completed);
        assert_eq!(item.status(), ItemStatus::Alive);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backlog_warning_fires_once_per_crossing() {
        let item = item();
        let rt = Handle::current();
        let (release, hold) = std::sync::mpsc::channel::<()>();

        let held = item
            .submit(
                Task::new("hold", move |_: &mut Slot<u32>| {
                    hold.recv().map_err(|e| EaselError::task(e.to_string()))
                }),
                &rt,
                3,
            )
            .unwrap();
        let queued: Vec<_> = (0..4)
            .map(|_| item.submit(Task::noop("queued"), &rt, 3).unwrap())
            .collect();
        // depths 2..=5 were seen; only 3 is the threshold
        assert_eq!(item.backlog_warnings(), 1);

        release.send(()).unwrap();
        assert_eq!(held.wait().await, TaskOutcome::Completed);
        for done in queued {
            assert_eq!(done.wait().await, TaskOutcome::Completed);
        }
        assert_eq!(item.pending(), 0);
    }
}
