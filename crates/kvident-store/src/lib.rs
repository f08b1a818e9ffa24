//! User-account persistence over a key-value store.
//!
//! A key-value backend offers get/set/delete, counters and key scans, but no
//! secondary indexes. This crate lays account data out so the lookups an
//! account framework needs still work:
//!
//! - **by id** and **by username**: the record key embeds both
//!   (`aspnetusers:<username>:<id>`), and a scan wildcards whichever side is
//!   unknown.
//! - **by external login**: a reverse index key per login
//!   (`userlogins:<provider>:<providerKey>`) holds the account id.
//!
//! Ids come from an atomic counter and are never reused. Because the
//! username is part of the key, renaming an account rewrites its record.
//!
//! # Consistency
//!
//! Backend calls are issued one at a time with no transaction around them.
//! In [`WriteMode::Simple`] a failure part-way through a create, update or
//! delete leaves the earlier writes in place. [`WriteMode::Journaled`]
//! records each multi-key write first so that [`AccountStore::recover`] can
//! finish it later.
//!
//! # Modules
//!
//! - [`account`] -- [`Account`], [`Login`], [`Claim`]
//! - [`keys`] -- [`KeyBuilder`] and the process-wide namespace
//! - [`store`] -- [`AccountStore`]
//! - [`traits`] -- capability traits implemented by [`AccountStore`]
//! - [`journal`] -- pending-write records for journaled mode
//! - [`config`] -- [`StoreConfig`], loadable from TOML
//! - [`error`] -- [`StoreError`] and [`StoreResult`]

pub mod account;
pub mod config;
pub mod error;
pub mod journal;
pub mod keys;
pub mod store;
pub mod traits;

pub use account::{Account, Claim, Login};
pub use config::{StoreConfig, WriteMode};
pub use error::{StoreError, StoreResult};
pub use journal::{PendingKind, PendingWrite};
pub use keys::{default_namespace, set_default_namespace, KeyBuilder, RecordKind};
pub use store::AccountStore;
pub use traits::{
    UserClaimStore, UserLoginStore, UserPasswordStore, UserRoleStore, UserSecurityStampStore,
    UserStore,
};

// Re-export the backend surface so hosts need only one dependency.
pub use kvident_kv::{FileKvBackend, InMemoryKvBackend, KvBackend, KvError};
