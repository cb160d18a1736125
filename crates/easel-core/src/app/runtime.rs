//! Runtime - 実行コンテキスト
//!
//! スクリプト一回分の実行に必要なコレクションとクレートをすべて所有します。
//! グローバル変数は使わず、呼び出し側が `Runtime` を明示的に持ち回ります。
//!
//! # 二つの面
//! - 型付き: `runtime.schedule::<Image>(id, task)`、`runtime.items::<File>()`
//! - 種別を値で渡す: `runtime.collection(ResourceKind::Image)`（`DynCollection`）

use std::sync::Arc;

use image::RgbaImage;
use serde_json::Value;

use super::barrier::DynCollection;
use super::builder::{Disposers, RuntimeBuilder};
use super::collection::Collection;
use super::crate_store::Crate;
use super::pipeline::{self, Consumer, PipeHandle, Producer};
use crate::config::RuntimeConfig;
use crate::domain::{
    BackgroundTask, Context, EaselResult, File, GpuBuffer, Image, ItemId, Kind, QrCode,
    ResourceKind, SharedTask, Slot, Task, TaskOutcome, TextStyle,
};
use crate::observability::{ResourceLog, RuntimeReport};
use crate::ports::Disposer;
use crate::queue::{Completion, CompletionSet};

/// A kind that has a collection in [`Runtime`].
pub trait Resident: Kind {
    fn select(runtime: &Runtime) -> &Collection<Self>;

    #[doc(hidden)]
    fn disposer_slot(disposers: &mut Disposers) -> &mut Arc<dyn Disposer<Self::Payload>>;
}

macro_rules! resident {
    ($kind:ty, $collection:ident, $disposer:ident) => {
        impl Resident for $kind {
            fn select(runtime: &Runtime) -> &Collection<Self> {
                &runtime.$collection
            }

            fn disposer_slot(disposers: &mut Disposers) -> &mut Arc<dyn Disposer<Self::Payload>> {
                &mut disposers.$disposer
            }
        }
    };
}

resident!(BackgroundTask, tasks, task);
resident!(Image, images, image);
resident!(File, files, file);
resident!(Context, contexts, context);
resident!(QrCode, qr_codes, qr_code);

pub struct Runtime {
    pub(super) config: RuntimeConfig,
    pub(super) log: ResourceLog,
    pub(super) tasks: Collection<BackgroundTask>,
    pub(super) images: Collection<Image>,
    pub(super) files: Collection<File>,
    pub(super) contexts: Collection<Context>,
    pub(super) qr_codes: Collection<QrCode>,
    pub(super) image_buffers: Crate<RgbaImage>,
    pub(super) values: Crate<Value>,
    pub(super) styles: Crate<TextStyle>,
    pub(super) gpu_buffers: Crate<GpuBuffer>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Root of the log hierarchy.
    pub fn log(&self) -> &ResourceLog {
        &self.log
    }

    /// The collection of kind `K`.
    pub fn items<K: Resident>(&self) -> &Collection<K> {
        K::select(self)
    }

    /// The collection of `kind`, kind-erased.
    pub fn collection(&self, kind: ResourceKind) -> &dyn DynCollection {
        match kind {
            ResourceKind::Task => &self.tasks,
            ResourceKind::Image => &self.images,
            ResourceKind::File => &self.files,
            ResourceKind::Context => &self.contexts,
            ResourceKind::QrCode => &self.qr_codes,
        }
    }

    // ========================================
    // Items
    // ========================================

    pub fn allocate<K: Resident>(&self) -> ItemId<K> {
        self.items::<K>().allocate()
    }

    /// Allocate with the item's log parented to `parent` instead of the collection log.
    pub fn allocate_under<K: Resident>(&self, parent: &ResourceLog) -> ItemId<K> {
        self.items::<K>().allocate_under(parent)
    }

    pub fn schedule<K: Resident>(
        &self,
        id: ItemId<K>,
        task: Task<K::Payload>,
    ) -> EaselResult<Completion> {
        self.items::<K>().schedule(id, task)
    }

    pub fn schedule_all<K: Resident>(&self, task: &SharedTask<K::Payload>) -> CompletionSet {
        self.items::<K>().schedule_all(task)
    }

    pub fn schedule_and_allocate<K: Resident>(
        &self,
        init: Task<K::Payload>,
    ) -> EaselResult<ItemId<K>> {
        self.items::<K>().schedule_and_allocate(init)
    }

    pub fn collect<K: Resident>(&self, id: ItemId<K>) -> EaselResult<Completion> {
        self.items::<K>().collect(id)
    }

    pub fn pipe<KA, KB, V>(
        &self,
        id_a: ItemId<KA>,
        id_b: ItemId<KB>,
        producer: Producer<KA::Payload, V>,
        consumer: Consumer<KB::Payload, V>,
    ) -> EaselResult<PipeHandle>
    where
        KA: Resident,
        KB: Resident,
        V: Send + 'static,
    {
        pipeline::pipe(
            self.items::<KA>(),
            id_a,
            self.items::<KB>(),
            id_b,
            producer,
            consumer,
        )
    }

    /// New item of kind `KD` computed from `id_a` and `id_b`.
    pub fn derive<KA, KB, KD, V>(
        &self,
        id_a: ItemId<KA>,
        id_b: ItemId<KB>,
        produce: Producer<KA::Payload, V>,
        combine: impl FnOnce(&Slot<KB::Payload>, V) -> EaselResult<KD::Payload> + Send + 'static,
    ) -> EaselResult<ItemId<KD>>
    where
        KA: Resident,
        KB: Resident,
        KD: Resident,
        V: Send + 'static,
    {
        pipeline::derive(
            self.items::<KA>(),
            id_a,
            self.items::<KB>(),
            id_b,
            self.items::<KD>(),
            produce,
            combine,
        )
    }

    // ========================================
    // Barriers
    // ========================================

    pub async fn wait<K: Resident>(&self, id: ItemId<K>) -> EaselResult<TaskOutcome> {
        self.items::<K>().wait(id).await
    }

    pub async fn wait_all(&self, kind: ResourceKind) -> Vec<TaskOutcome> {
        self.collection(kind).wait_all().await
    }

    /// `wait_all` on every kind at once.
    pub async fn wait_extensive(&self) {
        tokio::join!(
            self.tasks.wait_all(),
            self.images.wait_all(),
            self.files.wait_all(),
            self.contexts.wait_all(),
            self.qr_codes.wait_all(),
        );
    }

    // ========================================
    // Crates
    // ========================================

    pub fn image_buffers(&self) -> &Crate<RgbaImage> {
        &self.image_buffers
    }

    pub fn image_buffers_mut(&mut self) -> &mut Crate<RgbaImage> {
        &mut self.image_buffers
    }

    /// References to values owned by other script runtimes.
    pub fn values(&self) -> &Crate<Value> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Crate<Value> {
        &mut self.values
    }

    pub fn styles(&self) -> &Crate<TextStyle> {
        &self.styles
    }

    pub fn styles_mut(&mut self) -> &mut Crate<TextStyle> {
        &mut self.styles
    }

    pub fn gpu_buffers(&self) -> &Crate<GpuBuffer> {
        &self.gpu_buffers
    }

    pub fn gpu_buffers_mut(&mut self) -> &mut Crate<GpuBuffer> {
        &mut self.gpu_buffers
    }

    // ========================================
    // Reporting / teardown
    // ========================================

    pub fn report(&self) -> RuntimeReport {
        let mut report = RuntimeReport::default();
        for kind in ResourceKind::ALL {
            report
                .collections
                .insert(kind.to_string(), self.collection(kind).counts());
        }
        for (name, len) in [
            (self.image_buffers.name(), self.image_buffers.len()),
            (self.values.name(), self.values.len()),
            (self.styles.name(), self.styles.len()),
            (self.gpu_buffers.name(), self.gpu_buffers.len()),
        ] {
            report.crates.insert(name.to_string(), len);
        }
        report
    }

    /// Wait for all queued work, then (when configured) collect every
    /// remaining item and wait for the disposals.
    pub async fn shutdown(self) -> RuntimeReport {
        self.wait_extensive().await;

        if self.config.sweep_on_shutdown {
            let mut disposals = CompletionSet::new();
            for kind in ResourceKind::ALL {
                disposals.extend(self.collection(kind).sweep());
            }
            let outcomes = disposals.wait_all().await;
            let failed = outcomes.iter().filter(|o| o.is_failed()).count();
            if failed > 0 {
                self.log
                    .warn(format_args!("{failed} of {} disposals failed", outcomes.len()));
            }
        }

        let report = self.report();
        self.log.info(format_args!(
            "shutdown: {}",
            serde_json::to_string(&report).unwrap_or_default()
        ));
        report
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("log", &self.log)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
