//! Store key construction.
//!
//! Every key the account store reads or writes comes from [`KeyBuilder`].
//! The layout, with `<ns>` the namespace prefix written verbatim:
//!
//! ```text
//! <ns>aspnetusers                          id counter
//! <ns>aspnetusers:<username>:<id>          account record (JSON)
//! <ns>userlogins:<provider>:<providerKey>  login index (value: account id)
//! <ns>pending:<id>                         journaled write in progress
//! ```
//!
//! Trailing `:` separators are trimmed. Nothing else is normalized: a
//! username or provider containing `:` (or a glob wildcard) yields keys
//! that collide with, or match patterns meant for, other accounts.

use std::sync::OnceLock;

use crate::account::Login;
use crate::error::{StoreError, StoreResult};

const ACCOUNT_SEGMENT: &str = "aspnetusers:";
const LOGIN_SEGMENT: &str = "userlogins:";
const PENDING_SEGMENT: &str = "pending:";
const SEPARATOR: char = ':';

static DEFAULT_NAMESPACE: OnceLock<String> = OnceLock::new();

/// Set the process-wide namespace used by [`KeyBuilder::default`].
///
/// Must be called before the namespace is first read. Changing the
/// namespace orphans every key already written under the old one, so a
/// second call is rejected.
pub fn set_default_namespace(namespace: impl Into<String>) -> StoreResult<()> {
    DEFAULT_NAMESPACE.set(namespace.into()).map_err(|rejected| {
        StoreError::InvalidArgument(format!(
            "default namespace already fixed; cannot change it to {rejected:?}"
        ))
    })
}

/// The process-wide namespace. Reading it fixes it (empty if never set).
pub fn default_namespace() -> &'static str {
    DEFAULT_NAMESPACE.get_or_init(String::new)
}

/// The kind of record a key addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// Account records and, with no id, the id counter.
    AccountRecord,
    /// Reverse index from an external login to an account id.
    LoginIndex,
    /// Journal entry for a multi-key write that has not finished.
    PendingWrite,
}

/// Deterministic mapping from (kind, entity, id) to a store key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBuilder {
    namespace: String,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(default_namespace())
    }
}

impl KeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Build a key.
    ///
    /// `entity` is required for [`RecordKind::LoginIndex`] and ignored
    /// otherwise. `id` is appended verbatim and may contain wildcards, in
    /// which case the result is a scan pattern rather than a key.
    pub fn build(
        &self,
        kind: RecordKind,
        entity: Option<&Login>,
        id: Option<&str>,
    ) -> StoreResult<String> {
        let mut key = String::with_capacity(self.namespace.len() + 32);
        key.push_str(&self.namespace);
        match kind {
            RecordKind::AccountRecord => key.push_str(ACCOUNT_SEGMENT),
            RecordKind::PendingWrite => key.push_str(PENDING_SEGMENT),
            RecordKind::LoginIndex => {
                let login = entity.ok_or_else(|| {
                    StoreError::InvalidArgument("login index key requires a login".into())
                })?;
                if !login.is_well_formed() {
                    return Err(StoreError::InvalidArgument(format!(
                        "login needs a provider and provider key: {login:?}"
                    )));
                }
                key.push_str(LOGIN_SEGMENT);
                key.push_str(&login.provider);
                key.push(SEPARATOR);
                key.push_str(&login.provider_key);
                key.push(SEPARATOR);
            }
        }
        if let Some(id) = id {
            key.push_str(id);
        }
        let trimmed = key.trim_end_matches(SEPARATOR).len();
        key.truncate(trimmed);
        Ok(key)
    }

    /// Key of the id counter.
    pub fn counter_key(&self) -> String {
        self.unchecked(RecordKind::AccountRecord, None)
    }

    /// Key of the record for `username` with `id`.
    pub fn account_key(&self, username: &str, id: &str) -> String {
        self.unchecked(RecordKind::AccountRecord, Some(&format!("{username}:{id}")))
    }

    /// Pattern matching the record with `id`, whatever its username.
    pub fn account_pattern_by_id(&self, id: &str) -> String {
        self.unchecked(RecordKind::AccountRecord, Some(&format!("*:{id}")))
    }

    /// Pattern matching the record for `username`, whatever its id.
    pub fn account_pattern_by_username(&self, username: &str) -> String {
        self.unchecked(RecordKind::AccountRecord, Some(&format!("{username}:*")))
    }

    /// Exact login index key.
    pub fn login_key(&self, login: &Login) -> StoreResult<String> {
        self.build(RecordKind::LoginIndex, Some(login), None)
    }

    /// Pattern matching login index keys from the older layout, which
    /// carried an extra suffix after the provider key.
    pub fn legacy_login_pattern(&self, login: &Login) -> StoreResult<String> {
        self.build(RecordKind::LoginIndex, Some(login), Some("*"))
    }

    /// Journal key for account `id`.
    pub fn pending_key(&self, id: &str) -> String {
        self.unchecked(RecordKind::PendingWrite, Some(id))
    }

    /// Pattern matching every journal key.
    pub fn pending_pattern(&self) -> String {
        self.unchecked(RecordKind::PendingWrite, Some("*"))
    }

    // Kinds other than LoginIndex cannot fail.
    fn unchecked(&self, kind: RecordKind, id: Option<&str>) -> String {
        debug_assert!(kind != RecordKind::LoginIndex);
        let mut key = self.namespace.clone();
        key.push_str(match kind {
            RecordKind::PendingWrite => PENDING_SEGMENT,
            _ => ACCOUNT_SEGMENT,
        });
        if let Some(id) = id {
            key.push_str(id);
        }
        let trimmed = key.trim_end_matches(SEPARATOR).len();
        key.truncate(trimmed);
        key
    }
}
