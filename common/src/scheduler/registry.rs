// Registry of cancel handles for tasks that have not fired yet

use super::key::TaskKey;
use crate::context::CancelHandle;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock-protected map from task key to the cancel handle of its context.
///
/// Every operation holds the lock only for the map access itself.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<TaskKey, CancelHandle>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TaskKey, CancelHandle>> {
        // The map is never left half-updated, so a poisoned lock is still usable
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a handle. Key uniqueness is the caller's responsibility.
    pub fn register(&self, key: TaskKey, cancel: CancelHandle) {
        self.entries().insert(key, cancel);
    }

    /// Remove and return the handle for `key`, if it is still pending
    pub fn remove(&self, key: &TaskKey) -> Option<CancelHandle> {
        self.entries().remove(key)
    }

    /// Empty the registry, returning every remaining handle
    pub fn drain_all(&self) -> Vec<CancelHandle> {
        self.entries().drain().map(|(_, cancel)| cancel).collect()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
