// src/context.rs

//! Run context shared by all operators of a graph.
//!
//! Operators use the context to pass data between stages. The solver never
//! looks inside it; it only forwards the same handle to every operator.
//! Because operators run in parallel, implementations must synchronise
//! internally.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

/// Thread-safe key/value store handed to every operator of a run.
pub trait RunContext: Send + Sync {
    /// Insert or replace a value.
    fn set(&self, key: &str, val: Value);

    /// Clone of the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    fn has(&self, key: &str) -> bool;

    fn remove(&self, key: &str);

    /// Number of entries.
    fn count(&self) -> usize;

    fn keys(&self) -> Vec<String>;

    fn values(&self) -> Vec<Value>;

    /// Snapshot of all entries, taken atomically.
    ///
    /// Writes made after the call are not reflected in the returned iterator.
    fn iter(&self) -> std::vec::IntoIter<(String, Value)>;
}

/// In-memory [`RunContext`] backed by a `RwLock<HashMap>`.
///
/// A poisoned lock is recovered rather than propagated: each entry is
/// written in a single `insert`/`remove`, so a panicking writer cannot leave
/// the map half-updated.
#[derive(Debug, Default)]
pub struct MemoryContext {
    items: RwLock<HashMap<String, Value>>,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context pre-populated with the given entries.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let items = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            items: RwLock::new(items),
        }
    }
}

impl RunContext for MemoryContext {
    fn set(&self, key: &str, val: Value) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), val);
    }

    fn get(&self, key: &str) -> Option<Value> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.get(key).cloned()
    }

    fn has(&self, key: &str) -> bool {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.contains_key(key)
    }

    fn remove(&self, key: &str) {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
    }

    fn count(&self) -> usize {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.len()
    }

    fn keys(&self) -> Vec<String> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.keys().cloned().collect()
    }

    fn values(&self) -> Vec<Value> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.values().cloned().collect()
    }

    fn iter(&self) -> std::vec::IntoIter<(String, Value)> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Render a context value the way it should appear in an environment
/// variable: strings verbatim, everything else as compact JSON.
pub fn value_to_env_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
