//! Pipeline - アイテム間の依存関係
//!
//! # 流れ
//! 1. producer をアイテム A のキューに投入
//! 2. consumer をアイテム B のキューに投入（`Handoff` を待つゲート付き）
//! 3. B のワーカーはゲートを非同期に await し、値が届いてから本体をブロッキングプールへ渡す
//!
//! 値の受け渡しは単一代入の `Handoff<V>` で明示的に行います。
//! producer が失敗・スキップされると `Handoff` は値なしで破棄され、
//! consumer 側は上流の失敗として扱います（`UpstreamPolicy`）。
//! 待機中の consumer はブロッキングプールのスレッドを占有しないので、
//! 一つのアイテムから何百ものアイテムへ分岐させても詰まりません。

use std::borrow::Cow;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use super::collection::Collection;
use crate::domain::{EaselError, EaselResult, ItemId, Kind, Slot, Task, TaskOutcome};
use crate::queue::{Completion, panic_message};

type ProduceFn<A, V> = dyn FnOnce(&mut Slot<A>) -> EaselResult<V> + Send;
type ConsumeFn<B, V> = dyn FnOnce(&mut Slot<B>, V) -> EaselResult<()> + Send;
type RecoverFn<B> = dyn FnOnce(&mut Slot<B>) + Send;

/// Sending half of a single-assignment value transfer.
///
/// Cloneable; the first `assign` wins. When every clone is dropped without an
/// assignment the receiver reports upstream failure.
pub struct Handoff<V> {
    tx: Arc<Mutex<Option<oneshot::Sender<V>>>>,
}

/// Receiving half of a [`Handoff`].
#[derive(Debug)]
pub struct HandoffReceiver<V> {
    rx: oneshot::Receiver<V>,
}

pub fn handoff<V>() -> (Handoff<V>, HandoffReceiver<V>) {
    let (tx, rx) = oneshot::channel();
    (
        Handoff {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        HandoffReceiver { rx },
    )
}

impl<V> Handoff<V> {
    /// Returns `false` when a value was already assigned or nobody is listening.
    pub fn assign(&self, value: V) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<V> Clone for Handoff<V> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<V> fmt::Debug for Handoff<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("assigned", &self.is_assigned())
            .finish()
    }
}

impl<V> HandoffReceiver<V> {
    /// `None` means the producer never assigned.
    pub async fn take(self) -> Option<V> {
        self.rx.await.ok()
    }
}

/// What the consumer does when the producer failed or was skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpstreamPolicy {
    /// The consumer's item becomes failed (`ResourceFailed`).
    #[default]
    Propagate,
    /// The consumer's failure branch runs (if any) and reports `Recovered`;
    /// its item stays as it was.
    Tolerate,
}

/// Producer half of a pipe: runs on A and yields the value for B.
pub struct Producer<A, V> {
    origin: Cow<'static, str>,
    body: Box<ProduceFn<A, V>>,
}

impl<A, V> Producer<A, V> {
    pub fn new<F>(origin: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: FnOnce(&mut Slot<A>) -> EaselResult<V> + Send + 'static,
    {
        Self {
            origin: origin.into(),
            body: Box::new(body),
        }
    }
}

/// Consumer half of a pipe: runs on B with the producer's value.
pub struct Consumer<B, V> {
    origin: Cow<'static, str>,
    body: Box<ConsumeFn<B, V>>,
    on_failure: Option<Box<RecoverFn<B>>>,
    policy: UpstreamPolicy,
}

impl<B, V> Consumer<B, V> {
    pub fn new<F>(origin: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: FnOnce(&mut Slot<B>, V) -> EaselResult<()> + Send + 'static,
    {
        Self {
            origin: origin.into(),
            body: Box::new(body),
            on_failure: None,
            policy: UpstreamPolicy::default(),
        }
    }

    /// Runs instead of the body when B is failed, or when the producer failed
    /// under [`UpstreamPolicy::Tolerate`].
    pub fn on_failure<F>(mut self, on_failure: F) -> Self
    where
        F: FnOnce(&mut Slot<B>) + Send + 'static,
    {
        self.on_failure = Some(Box::new(on_failure));
        self
    }

    pub fn tolerate_upstream_failure(mut self) -> Self {
        self.policy = UpstreamPolicy::Tolerate;
        self
    }
}

/// Completion signals of both halves of a pipe.
#[derive(Debug)]
#[must_use = "a pipe handle does nothing unless awaited; call `detach()` to drop it explicitly"]
pub struct PipeHandle {
    pub producer: Completion,
    pub consumer: Completion,
}

impl PipeHandle {
    /// `(producer, consumer)` outcomes.
    pub async fn wait(self) -> (TaskOutcome, TaskOutcome) {
        tokio::join!(self.producer.wait(), self.consumer.wait())
    }

    pub fn detach(self) {}
}

/// Value parked by a gate for the task body that follows it.
struct Parked<T>(Arc<Mutex<Option<T>>>);

impl<T> Parked<T> {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    fn put(&self, value: T) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    fn take(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl<T> Clone for Parked<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Run `producer` on `id_a`, then `consumer` on `id_b` with its value.
///
/// A and B may live in different collections, or be the same item.
pub fn pipe<KA, KB, V>(
    src: &Collection<KA>,
    id_a: ItemId<KA>,
    dst: &Collection<KB>,
    id_b: ItemId<KB>,
    producer: Producer<KA::Payload, V>,
    consumer: Consumer<KB::Payload, V>,
) -> EaselResult<PipeHandle>
where
    KA: Kind,
    KB: Kind,
    V: Send + 'static,
{
    // reject a bad consumer before anything is queued on A
    dst.ensure_schedulable(id_b)?;

    let (tx, rx) = handoff::<V>();
    let producer_task = producer_task(producer, tx);
    let consumer_task = consumer_task(consumer, rx, id_a.to_string());

    let producer = src.schedule(id_a, producer_task)?;
    let consumer = dst.schedule(id_b, consumer_task)?;
    Ok(PipeHandle { producer, consumer })
}

/// Allocate a new item in `dest` populated from A and B.
///
/// `produce` runs on A; `combine` runs on B with that value and returns the
/// new item's payload. A and B are only read: a failed source, a failing
/// `combine` or a panic in it leave B as it was and fail the new item instead.
pub fn derive<KA, KB, KD, V>(
    src_a: &Collection<KA>,
    id_a: ItemId<KA>,
    src_b: &Collection<KB>,
    id_b: ItemId<KB>,
    dest: &Collection<KD>,
    produce: Producer<KA::Payload, V>,
    combine: impl FnOnce(&Slot<KB::Payload>, V) -> EaselResult<KD::Payload> + Send + 'static,
) -> EaselResult<ItemId<KD>>
where
    KA: Kind,
    KB: Kind,
    KD: Kind,
    V: Send + 'static,
{
    let (out_tx, out_rx) = handoff::<Result<KD::Payload, String>>();
    let sources = format!("{id_a} + {id_b}");

    let combine = Consumer::new(
        "derive.combine",
        move |slot: &mut Slot<KB::Payload>, value: V| {
            let derived = match catch_unwind(AssertUnwindSafe(|| combine(slot, value))) {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(err)) => Err(format!("derive.combine: {err}")),
                Err(panic) => Err(format!(
                    "derive.combine panicked: {}",
                    panic_message(&*panic)
                )),
            };
            out_tx.assign(derived);
            Ok(())
        },
    )
    .tolerate_upstream_failure();
    pipe(src_a, id_a, src_b, id_b, produce, combine)?.detach();

    let parked = Parked::new();
    let gate = {
        let parked = parked.clone();
        async move {
            if let Some(result) = out_rx.take().await {
                parked.put(result);
            }
            Ok(())
        }
    };
    let init = Task::new("derive.init", move |slot: &mut Slot<KD::Payload>| {
        match parked.take() {
            Some(Ok(payload)) => {
                slot.set(payload);
                Ok(())
            }
            Some(Err(reason)) => Err(EaselError::failed(reason)),
            None => Err(EaselError::failed(format!(
                "sources {sources} did not produce a value"
            ))),
        }
    })
    .gated(gate);
    dest.schedule_and_allocate(init)
}

fn producer_task<A, V>(producer: Producer<A, V>, tx: Handoff<V>) -> Task<A>
where
    A: 'static,
    V: Send + 'static,
{
    let Producer { origin, body } = producer;
    Task::new(origin, move |slot: &mut Slot<A>| {
        let value = body(slot)?;
        tx.assign(value);
        Ok(())
    })
}

fn consumer_task<B, V>(
    consumer: Consumer<B, V>,
    rx: HandoffReceiver<V>,
    upstream: String,
) -> Task<B>
where
    B: 'static,
    V: Send + 'static,
{
    let Consumer {
        origin,
        body,
        on_failure,
        policy,
    } = consumer;
    let missing = format!("upstream {upstream} of {origin} failed");

    let parked = Parked::new();
    let gate = {
        let parked = parked.clone();
        let missing = missing.clone();
        async move {
            match rx.take().await {
                Some(value) => {
                    parked.put(value);
                    Ok(())
                }
                None if policy == UpstreamPolicy::Tolerate => Err(missing),
                None => Ok(()),
            }
        }
    };

    let task = Task::new(origin, move |slot: &mut Slot<B>| match parked.take() {
        Some(value) => body(slot, value),
        None => Err(EaselError::failed(missing)),
    })
    .gated(gate);

    match on_failure {
        Some(recover) => task.on_failure(recover),
        None => task,
    }
}
