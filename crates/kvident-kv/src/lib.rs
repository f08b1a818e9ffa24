//! Key-value backend abstraction for kvident.
//!
//! The account store never talks to a concrete database. It is written
//! against [`KvBackend`], a narrow surface of six primitives that any
//! Redis-like store can provide:
//!
//! - `get` / `set` / `delete` / `exists` on string values
//! - `increment`, an atomic counter bump
//! - `scan_keys`, a glob-style key scan (`*` and `?` wildcards)
//!
//! # Backends
//!
//! - [`InMemoryKvBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`FileKvBackend`] -- JSON-file backend for the CLI and small deployments
//!
//! # Modules
//!
//! - [`error`] -- [`KvError`] and the [`KvResult`] alias
//! - [`traits`] -- the [`KvBackend`] trait
//! - [`pattern`] -- the glob [`Pattern`] matcher shared by the backends
//! - [`memory`] -- [`InMemoryKvBackend`]
//! - [`file`] -- [`FileKvBackend`]

pub mod error;
pub mod file;
pub mod memory;
pub mod pattern;
pub mod traits;

pub use error::{KvError, KvResult};
pub use file::FileKvBackend;
pub use memory::InMemoryKvBackend;
pub use pattern::Pattern;
pub use traits::KvBackend;

/// Compute the next value of an integer counter stored as text.
///
/// An unset counter counts as zero.
pub(crate) fn next_counter_value(key: &str, current: Option<&String>) -> KvResult<i64> {
    let value = match current {
        None => 0,
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| KvError::NotAnInteger {
            key: key.to_string(),
        })?,
    };
    value.checked_add(1).ok_or_else(|| KvError::NotAnInteger {
        key: key.to_string(),
    })
}
