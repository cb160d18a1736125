//! Observability: hierarchical resource logs and status views.
//!
//! ログの階層は tracing の span で表現します：
//! runtime span → collection span → item span。
//! アイテムのログに出したイベントは、親のスパン情報付きで購読側に届きます。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::Span;

/// Resource-scoped diagnostic sink, parented to the log it was created from.
#[derive(Clone)]
pub struct ResourceLog {
    path: Arc<str>,
    span: Span,
}

impl ResourceLog {
    /// Top-level log of a run.
    pub fn root(name: &str) -> Self {
        Self {
            path: Arc::from(name),
            span: tracing::info_span!("easel", log = %name),
        }
    }

    /// `newChildLog(parent, name)`.
    pub fn child(&self, name: &str) -> Self {
        Self {
            path: Arc::from(format!("{}/{}", self.path, name)),
            span: tracing::info_span!(parent: &self.span, "resource", log = %name),
        }
    }

    /// Slash-separated path from the root (`run/image/image-3`).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.span
            .in_scope(|| tracing::debug!(log = %self.path, "{message}"));
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.span
            .in_scope(|| tracing::info!(log = %self.path, "{message}"));
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.span
            .in_scope(|| tracing::warn!(log = %self.path, "{message}"));
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.span
            .in_scope(|| tracing::error!(log = %self.path, "{message}"));
    }
}

impl fmt::Debug for ResourceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceLog").field(&self.path).finish()
    }
}

/// Per-collection counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    pub alive: usize,
    pub failed: usize,
    pub collected: usize,
    /// Jobs submitted but not finished yet, across all items.
    pub pending: usize,
    /// How often an item's queue reached `queue_warn_depth`.
    pub backlog_warnings: usize,
}

/// Snapshot of a whole run context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeReport {
    pub collections: BTreeMap<String, CollectionCounts>,
    pub crates: BTreeMap<String, usize>,
}
