//! Task - アイテムに投入される作業単位
//!
//! - `origin`: 診断用の由来ラベル（呼び出し元のライブラリ名・操作名）
//! - `run`: アイテムのペイロードへの排他アクセスを得て実行される本体
//! - `on_failure`: アイテムが Failed のとき `run` の代わりに実行される分岐
//! - `gate`（crate 内部）: 本体をブロッキングプールへ渡す前にワーカーが await する前提条件。
//!   パイプの consumer はここで producer の値を待つので、待機中にスレッドを占有しません。

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use super::errors::EaselResult;
use super::slot::Slot;

pub(crate) type RunFn<P> = dyn FnOnce(&mut Slot<P>) -> EaselResult<()> + Send;
pub(crate) type FailureFn<P> = dyn FnOnce(&mut Slot<P>) + Send;

/// Resolves to `Err(reason)` when the task should take its failure branch
/// without failing the item.
pub(crate) type Gate = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

type SharedRunFn<P> = dyn Fn(&mut Slot<P>) -> EaselResult<()> + Send + Sync;
type SharedFailureFn<P> = dyn Fn(&mut Slot<P>) + Send + Sync;

/// One unit of work submitted against a single item.
///
/// Both branches are optional: a task without `run` is a no-op on a live item
/// (barriers use this), a task without `on_failure` is skipped on a failed item.
/// Either way the completion signal fires.
pub struct Task<P> {
    origin: Cow<'static, str>,
    run: Option<Box<RunFn<P>>>,
    on_failure: Option<Box<FailureFn<P>>>,
    gate: Option<Gate>,
}

impl<P> Task<P> {
    pub fn new<F>(origin: impl Into<Cow<'static, str>>, run: F) -> Self
    where
        F: FnOnce(&mut Slot<P>) -> EaselResult<()> + Send + 'static,
    {
        Self {
            origin: origin.into(),
            run: Some(Box::new(run)),
            on_failure: None,
            gate: None,
        }
    }

    pub fn noop(origin: impl Into<Cow<'static, str>>) -> Self {
        Self {
            origin: origin.into(),
            run: None,
            on_failure: None,
            gate: None,
        }
    }

    /// A task that only does something when the item has failed.
    pub fn failure_only<F>(origin: impl Into<Cow<'static, str>>, on_failure: F) -> Self
    where
        F: FnOnce(&mut Slot<P>) + Send + 'static,
    {
        Self::noop(origin).on_failure(on_failure)
    }

    pub fn on_failure<F>(mut self, on_failure: F) -> Self
    where
        F: FnOnce(&mut Slot<P>) + Send + 'static,
    {
        self.on_failure = Some(Box::new(on_failure));
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Hold the task in the item's queue until `gate` resolves. The item is
    /// not failed by an `Err` gate; the task takes its failure branch instead.
    pub(crate) fn gated<G>(mut self, gate: G) -> Self
    where
        G: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.gate = Some(Box::pin(gate));
        self
    }

    pub(crate) fn take_gate(&mut self) -> Option<Gate> {
        self.gate.take()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Cow<'static, str>,
        Option<Box<RunFn<P>>>,
        Option<Box<FailureFn<P>>>,
    ) {
        (self.origin, self.run, self.on_failure)
    }
}

impl<P> fmt::Debug for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("origin", &self.origin)
            .field("run", &self.run.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

/// A task that can be instantiated once per item (broadcast via `schedule_all`).
pub struct SharedTask<P> {
    origin: Cow<'static, str>,
    run: Option<Arc<SharedRunFn<P>>>,
    on_failure: Option<Arc<SharedFailureFn<P>>>,
}

impl<P: 'static> SharedTask<P> {
    pub fn new<F>(origin: impl Into<Cow<'static, str>>, run: F) -> Self
    where
        F: Fn(&mut Slot<P>) -> EaselResult<()> + Send + Sync + 'static,
    {
        Self {
            origin: origin.into(),
            run: Some(Arc::new(run)),
            on_failure: None,
        }
    }

    pub fn noop(origin: impl Into<Cow<'static, str>>) -> Self {
        Self {
            origin: origin.into(),
            run: None,
            on_failure: None,
        }
    }

    pub fn on_failure<F>(mut self, on_failure: F) -> Self
    where
        F: Fn(&mut Slot<P>) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(on_failure));
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Build the per-item `Task`.
    pub fn instantiate(&self) -> Task<P> {
        let run = self.run.clone().map(|run| {
            Box::new(move |slot: &mut Slot<P>| run(slot)) as Box<RunFn<P>>
        });
        let on_failure = self.on_failure.clone().map(|recover| {
            Box::new(move |slot: &mut Slot<P>| recover(slot)) as Box<FailureFn<P>>
        });
        Task {
            origin: self.origin.clone(),
            run,
            on_failure,
            gate: None,
        }
    }
}

impl<P> Clone for SharedTask<P> {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            run: self.run.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<P> fmt::Debug for SharedTask<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTask")
            .field("origin", &self.origin)
            .field("run", &self.run.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// What a completion signal resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// `run` finished (or there was nothing to run).
    Completed,
    /// `run` reported an unrecoverable error; the item is now failed.
    Failed { reason: String },
    /// `on_failure` ran, because the item was failed or an upstream value
    /// never arrived.
    Recovered,
    /// Same conditions as `Recovered`, but the task had no `on_failure`.
    Skipped,
    /// The disposal hook ran and the item is collected.
    Disposed,
    /// The worker went away before reporting (runtime teardown).
    Abandoned,
}

impl TaskOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }

    /// `Completed` or `Disposed`.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed | TaskOutcome::Disposed)
    }
}
