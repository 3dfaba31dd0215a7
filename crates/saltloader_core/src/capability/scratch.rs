//! Per-context mutable scratch space (`__context__`).
//!
//! # Responsibility
//! - Give adapters one place to memoize data and connection handles.
//!
//! # Invariants
//! - One scratch space belongs to exactly one registry; it is not `Clone`, so
//!   two execution contexts can never share it.
//! - Dropping the owning registry drops every cached handle.

use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Handle = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct ScratchState {
    values: BTreeMap<String, Value>,
    handles: BTreeMap<String, Handle>,
}

/// Context-scoped scratch storage.
#[derive(Default)]
pub struct ScratchSpace {
    state: Mutex<ScratchState>,
}

impl std::fmt::Debug for ScratchSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ScratchSpace")
            .field("values", &state.values.keys().collect::<Vec<_>>())
            .field("handles", &state.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScratchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().values.get(key).cloned()
    }

    /// Stores a value and returns the previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.lock().values.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        let state = self.lock();
        state.values.contains_key(key) || state.handles.contains_key(key)
    }

    /// Returns the cached handle for `key`, creating it with `init` on first
    /// use.
    ///
    /// `init` runs without the scratch lock held, so it may read or write the
    /// scratch space itself. When two callers race, the first handle stored
    /// wins and every caller gets it. A handle stored under the same key with
    /// a different type is replaced.
    pub fn handle_or_insert_with<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.handle::<T>(key) {
            return existing;
        }
        let created = Arc::new(init());
        let mut state = self.lock();
        if let Some(existing) = state.handles.get(key) {
            if let Ok(winner) = Arc::clone(existing).downcast::<T>() {
                return winner;
            }
        }
        state
            .handles
            .insert(key.to_string(), Arc::clone(&created) as Handle);
        created
    }

    pub fn handle<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let existing = Arc::clone(self.lock().handles.get(key)?);
        existing.downcast::<T>().ok()
    }

    pub fn drop_handle(&self, key: &str) -> bool {
        self.lock().handles.remove(key).is_some()
    }

    /// Drops every value and handle.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.values.clear();
        state.handles.clear();
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.values.len() + state.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, ScratchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
