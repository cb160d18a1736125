//! RuntimeBuilder - ランタイムの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 設定値の検証は build() 時に行う
//! - tokio ランタイムの外で build() すると BuildError::NoAsyncRuntime
//!   （ワーカーを spawn する先がないため、最初の schedule まで待たずに失敗させる）

use std::sync::Arc;

use image::RgbaImage;
use tokio::runtime::Handle;

use super::collection::Collection;
use super::crate_store::Crate;
use super::runtime::{Resident, Runtime};
use crate::config::RuntimeConfig;
use crate::domain::{EaselError, ExecContext, FileHandle, QrMatrix};
use crate::impls::{DropDisposer, FileDisposer};
use crate::observability::ResourceLog;
use crate::ports::Disposer;

/// Disposal hooks, one per resource kind.
pub struct Disposers {
    pub(crate) task: Arc<dyn Disposer<serde_json::Value>>,
    pub(crate) image: Arc<dyn Disposer<RgbaImage>>,
    pub(crate) file: Arc<dyn Disposer<FileHandle>>,
    pub(crate) context: Arc<dyn Disposer<ExecContext>>,
    pub(crate) qr_code: Arc<dyn Disposer<QrMatrix>>,
}

impl Default for Disposers {
    /// Drop every payload; close files.
    fn default() -> Self {
        Self {
            task: Arc::new(DropDisposer),
            image: Arc::new(DropDisposer),
            file: Arc::new(FileDisposer),
            context: Arc::new(DropDisposer),
            qr_code: Arc::new(DropDisposer),
        }
    }
}

/// Builds a [`Runtime`].
///
/// # 使用例
/// ```ignore
/// let runtime = Runtime::builder()
///     .config(RuntimeConfig::from_env()?)
///     .name("script-42")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    name: String,
    disposers: Disposers,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no tokio runtime is running; build the easel runtime from inside one")]
    NoAsyncRuntime,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[source] EaselError),
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            name: "easel".to_string(),
            disposers: Disposers::default(),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Name of the root log.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the disposal hook of kind `K`.
    pub fn disposer<K: Resident>(mut self, disposer: impl Disposer<K::Payload> + 'static) -> Self {
        *K::disposer_slot(&mut self.disposers) = Arc::new(disposer);
        self
    }

    pub fn build(self) -> Result<Runtime, BuildError> {
        self.config.validate().map_err(BuildError::InvalidConfig)?;
        let handle = Handle::try_current().map_err(|_| BuildError::NoAsyncRuntime)?;

        let log = ResourceLog::root(&self.name);
        let depth = self.config.queue_warn_depth;
        let Disposers {
            task,
            image,
            file,
            context,
            qr_code,
        } = self.disposers;

        log.debug("runtime built");
        Ok(Runtime {
            tasks: Collection::new(&log, task, handle.clone(), depth),
            images: Collection::new(&log, image, handle.clone(), depth),
            files: Collection::new(&log, file, handle.clone(), depth),
            contexts: Collection::new(&log, context, handle.clone(), depth),
            qr_codes: Collection::new(&log, qr_code, handle, depth),
            image_buffers: Crate::new("image_buffers"),
            values: Crate::new("values"),
            styles: Crate::new("styles"),
            gpu_buffers: Crate::new("gpu_buffers"),
            config: self.config,
            log,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
