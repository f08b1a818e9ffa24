//! In-memory key-value backend for testing and ephemeral use.
//!
//! [`InMemoryKvBackend`] stores all entries in a `HashMap` protected by a
//! `RwLock`. It implements the full [`KvBackend`] trait and is suitable for
//! unit tests, REPL sessions, and short-lived processes.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{KvError, KvResult};
use crate::next_counter_value;
use crate::pattern::Pattern;
use crate::traits::KvBackend;

/// An in-memory implementation of [`KvBackend`].
///
/// All data lives in a `HashMap` behind a `RwLock`. Data is lost when the
/// backend is dropped.
#[derive(Debug, Default)]
pub struct InMemoryKvBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryKvBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> KvResult<usize> {
        Ok(self.read_lock()?.len())
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> KvResult<bool> {
        Ok(self.read_lock()?.is_empty())
    }

    /// Remove every key.
    pub fn clear(&self) -> KvResult<()> {
        self.write_lock()?.clear();
        Ok(())
    }

    /// Return a sorted list of all keys.
    pub fn keys(&self) -> KvResult<Vec<String>> {
        let mut keys: Vec<String> = self.read_lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn read_lock(&self) -> KvResult<std::sync::RwLockReadGuard<'_, HashMap<String, String>>> {
        self.entries
            .read()
            .map_err(|e| KvError::LockPoisoned(e.to_string()))
    }

    fn write_lock(&self) -> KvResult<std::sync::RwLockWriteGuard<'_, HashMap<String, String>>> {
        self.entries
            .write()
            .map_err(|e| KvError::LockPoisoned(e.to_string()))
    }
}

#[async_trait]
impl KvBackend for InMemoryKvBackend {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.read_lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        self.write_lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        Ok(self.write_lock()?.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.read_lock()?.contains_key(key))
    }

    async fn increment(&self, key: &str) -> KvResult<i64> {
        // Read and write under the same guard so concurrent callers never
        // observe the same value.
        let mut entries = self.write_lock()?;
        let next = next_counter_value(key, entries.get(key))?;
        entries.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn scan_keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let pattern = Pattern::new(pattern);
        let entries = self.read_lock()?;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
