//! The [`KvBackend`] trait defining the key-value storage interface.

use async_trait::async_trait;

use crate::error::KvResult;

/// A string-keyed, string-valued store with counters and key scans.
///
/// Every method is a single backend operation. Nothing here groups several
/// operations into a transaction: callers composing multi-key writes get no
/// atomicity beyond what each call provides on its own.
///
/// Implementations must be thread-safe (`Send + Sync`) and must make
/// [`increment`](KvBackend::increment) atomic. It is the only primitive
/// callers rely on for exclusivity.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read the value stored at `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Store `value` at `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> KvResult<()>;

    /// Delete `key`. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Check whether `key` exists.
    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Atomically add one to the integer stored at `key` and return the new
    /// value. An unset key counts as zero, so the first call returns 1.
    async fn increment(&self, key: &str) -> KvResult<i64>;

    /// List every key matching the glob `pattern`.
    ///
    /// `*` matches any run of characters and `?` matches exactly one. See
    /// [`Pattern`](crate::Pattern) for details.
    async fn scan_keys(&self, pattern: &str) -> KvResult<Vec<String>>;
}
