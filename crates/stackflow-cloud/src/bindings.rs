//! Results of earlier steps, used to bind handles and resolve references

use crate::handle::{HandleKey, PARENT_ID, ResourceHandle};
use crate::status::{OperationResult, ResourceStatus};
use std::collections::HashMap;

/// Latest observation per handle during one plan run
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    results: HashMap<HandleKey, OperationResult>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest result for a handle.
    ///
    /// A `NotFound` observation drops the binding so later steps fall back to
    /// looking the resource up by name.
    pub fn record(&mut self, key: HandleKey, result: OperationResult) {
        if result.status == ResourceStatus::NotFound {
            self.results.remove(&key);
        } else {
            self.results.insert(key, result);
        }
    }

    pub fn get(&self, key: &HandleKey) -> Option<&OperationResult> {
        self.results.get(key)
    }

    pub fn id_of(&self, key: &HandleKey) -> Option<&str> {
        self.results.get(key).and_then(|r| r.resource_id.as_deref())
    }

    pub fn raw_str(&self, key: &HandleKey, field: &str) -> Option<&str> {
        self.results.get(key).and_then(|r| r.raw_str(field))
    }

    /// Fill in the handle's provider id and its parent's id when known
    pub fn bind(&self, handle: &ResourceHandle) -> ResourceHandle {
        let mut bound = handle.clone();
        if bound.id().is_none() {
            if let Some(id) = self.id_of(&handle.key()) {
                bound = bound.with_id(id);
            }
        }
        if bound.parent_id().is_none() {
            if let Some(parent_id) = handle.parent().and_then(|parent| self.id_of(parent)) {
                bound = bound.with_context(PARENT_ID, parent_id);
            }
        }
        bound
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
