//! File-backed key-value store.
//!
//! [`FileKvBackend`] keeps the whole keyspace in memory and rewrites a single
//! JSON file after every mutating call. The file is replaced atomically:
//! the new contents go to a temporary file in the same directory, which is
//! then renamed over the old one. A crash mid-write leaves the previous
//! contents intact.
//!
//! File I/O is synchronous and runs on the calling task, and every mutation
//! rewrites the whole file. This suits the CLI and tests; a server should
//! put a network backend behind [`KvBackend`] instead.
//!
//! On-disk format is a flat JSON object:
//!
//! ```text
//! { "app:aspnetusers": "2", "app:aspnetusers:alice:1": "{...}", ... }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{KvError, KvResult};
use crate::next_counter_value;
use crate::pattern::Pattern;
use crate::traits::KvBackend;

type Entries = BTreeMap<String, String>;

/// A [`KvBackend`] persisted to one JSON file.
#[derive(Debug)]
pub struct FileKvBackend {
    path: PathBuf,
    entries: RwLock<Entries>,
}

impl FileKvBackend {
    /// Open the store at `path`, creating an empty one if the file does not
    /// exist yet. Parent directories are created as needed.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Entries::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| KvError::Serialization(e.to_string()))?
            }
        } else {
            Entries::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "opened file backend");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> KvResult<usize> {
        Ok(self.read_lock()?.len())
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> KvResult<bool> {
        Ok(self.read_lock()?.is_empty())
    }

    fn read_lock(&self) -> KvResult<RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|e| KvError::LockPoisoned(e.to_string()))
    }

    fn write_lock(&self) -> KvResult<RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|e| KvError::LockPoisoned(e.to_string()))
    }

    /// Write `entries` to disk. Called with the write lock held so that
    /// file contents follow the in-memory order of mutations.
    fn flush(&self, entries: &Entries) -> KvResult<()> {
        let data = serde_json::to_vec_pretty(entries)
            .map_err(|e| KvError::Serialization(e.to_string()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| KvError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl KvBackend for FileKvBackend {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.read_lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        let mut entries = self.write_lock()?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut entries = self.write_lock()?;
        let existed = entries.remove(key).is_some();
        if existed {
            self.flush(&entries)?;
        }
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.read_lock()?.contains_key(key))
    }

    async fn increment(&self, key: &str) -> KvResult<i64> {
        let mut entries = self.write_lock()?;
        let next = next_counter_value(key, entries.get(key))?;
        entries.insert(key.to_string(), next.to_string());
        self.flush(&entries)?;
        Ok(next)
    }

    async fn scan_keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let pattern = Pattern::new(pattern);
        let prefix = pattern.literal_prefix();
        let entries = self.read_lock()?;
        // Keys are ordered, so start at the literal prefix and stop once it
        // no longer matches.
        Ok(entries
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(&prefix))
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect())
    }
}
