//! Capability traits presented to an account framework.
//!
//! Each trait covers one group of operations. [`AccountStore`](crate::AccountStore)
//! implements all of them; a host can depend on just the groups it uses.
//!
//! Only [`UserStore`] and [`UserLoginStore::find_by_login`] touch the
//! backend. Every other method edits or reads the caller's [`Account`] value
//! in place, and the caller persists it afterwards with
//! [`UserStore::create`] or [`UserStore::update`].

use async_trait::async_trait;

use crate::account::{Account, Claim, Login};
use crate::error::StoreResult;

/// Record lifecycle and primary lookups.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Assign a fresh id and write the record and its login index entries.
    async fn create(&self, account: Account) -> StoreResult<Account>;

    /// Rewrite the record under its current username, keeping its id.
    async fn update(&self, account: Account) -> StoreResult<Account>;

    /// Remove the record and the index entries of its logins.
    async fn delete(&self, account: &Account) -> StoreResult<()>;

    /// Returns `Ok(None)` if no record has this id.
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>>;

    /// Returns `Ok(None)` if no record has this username.
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>>;
}

/// External logins.
#[async_trait]
pub trait UserLoginStore: Send + Sync {
    /// No-op if the account already has this (provider, provider key).
    async fn add_login(&self, account: &mut Account, login: Login) -> StoreResult<()>;

    async fn remove_login(&self, account: &mut Account, login: &Login) -> StoreResult<()>;

    async fn logins(&self, account: &Account) -> StoreResult<Vec<Login>>;

    /// Resolve a login through the reverse index.
    async fn find_by_login(&self, login: &Login) -> StoreResult<Option<Account>>;
}

/// Claims, unique by (type, value).
#[async_trait]
pub trait UserClaimStore: Send + Sync {
    async fn add_claim(&self, account: &mut Account, claim: Claim) -> StoreResult<()>;

    async fn remove_claim(&self, account: &mut Account, claim: &Claim) -> StoreResult<()>;

    async fn claims(&self, account: &Account) -> StoreResult<Vec<Claim>>;
}

/// Role membership. Role names compare case-insensitively.
#[async_trait]
pub trait UserRoleStore: Send + Sync {
    async fn add_to_role(&self, account: &mut Account, role: &str) -> StoreResult<()>;

    async fn remove_from_role(&self, account: &mut Account, role: &str) -> StoreResult<()>;

    async fn roles(&self, account: &Account) -> StoreResult<Vec<String>>;

    async fn is_in_role(&self, account: &Account, role: &str) -> StoreResult<bool>;
}

/// Pre-computed password hashes. The store never hashes anything itself.
#[async_trait]
pub trait UserPasswordStore: Send + Sync {
    async fn password_hash(&self, account: &Account) -> StoreResult<Option<String>>;

    async fn set_password_hash(
        &self,
        account: &mut Account,
        hash: Option<String>,
    ) -> StoreResult<()>;

    async fn has_password(&self, account: &Account) -> StoreResult<bool>;
}

/// Security stamps, supplied by the caller.
#[async_trait]
pub trait UserSecurityStampStore: Send + Sync {
    async fn security_stamp(&self, account: &Account) -> StoreResult<Option<String>>;

    async fn set_security_stamp(
        &self,
        account: &mut Account,
        stamp: Option<String>,
    ) -> StoreResult<()>;
}
