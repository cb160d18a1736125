//! Slot - タスクに渡されるアイテムの排他ビュー

use crate::domain::errors::{EaselError, EaselResult};
use crate::observability::ResourceLog;

/// Exclusive view of one item handed to a task body.
///
/// The payload is `None` until the first task populates it, which is what
/// "allocate now, fill in later" relies on.
pub struct Slot<P> {
    label: String,
    value: Option<P>,
    log: ResourceLog,
}

impl<P> Slot<P> {
    pub(crate) fn new(label: String, log: ResourceLog) -> Self {
        Self {
            label,
            value: None,
            log,
        }
    }

    /// Display form of the item id (e.g. `image-3`).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn log(&self) -> &ResourceLog {
        &self.log
    }

    pub fn is_populated(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&P> {
        self.value.as_ref()
    }

    pub fn value_mut(&mut self) -> Option<&mut P> {
        self.value.as_mut()
    }

    /// Replace the payload, returning the previous one.
    pub fn set(&mut self, value: P) -> Option<P> {
        self.value.replace(value)
    }

    pub fn take(&mut self) -> Option<P> {
        self.value.take()
    }

    /// Payload or [`EaselError::Unpopulated`].
    pub fn require(&self) -> EaselResult<&P> {
        self.value
            .as_ref()
            .ok_or_else(|| EaselError::Unpopulated(self.label.clone()))
    }

    pub fn require_mut(&mut self) -> EaselResult<&mut P> {
        match self.value.as_mut() {
            Some(value) => Ok(value),
            None => Err(EaselError::Unpopulated(self.label.clone())),
        }
    }
}

impl<P> std::fmt::Debug for Slot<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("label", &self.label)
            .field("populated", &self.value.is_some())
            .finish()
    }
}
