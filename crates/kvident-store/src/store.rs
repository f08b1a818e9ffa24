//! [`AccountStore`]: account persistence over a [`KvBackend`].
//!
//! Records are found by scanning for `aspnetusers:<username>:<id>` keys with
//! one side wildcarded. Logins are resolved through a reverse index whose
//! values are account ids. The store holds no locks and caches nothing;
//! every lookup goes to the backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kvident_kv::KvBackend;
use tracing::{debug, info, warn};

use crate::account::{roles_equal, Account, Claim, Login};
use crate::config::{StoreConfig, WriteMode};
use crate::error::{StoreError, StoreResult};
use crate::journal::{PendingKind, PendingWrite};
use crate::keys::KeyBuilder;
use crate::traits::{
    UserClaimStore, UserLoginStore, UserPasswordStore, UserRoleStore, UserSecurityStampStore,
    UserStore,
};

/// Account store backed by a key-value backend.
///
/// A store starts active and can be disposed once. After
/// [`dispose`](Self::dispose) every operation fails with
/// [`StoreError::Disposed`]; disposing again is allowed and does nothing.
pub struct AccountStore<B> {
    backend: Arc<B>,
    keys: KeyBuilder,
    config: StoreConfig,
    disposed: AtomicBool,
}

impl<B: KvBackend> AccountStore<B> {
    /// Create a store with the default configuration.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: Arc<B>, config: StoreConfig) -> Self {
        Self {
            backend,
            keys: KeyBuilder::new(config.namespace.clone()),
            config,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Release the store. Irreversible and idempotent.
    pub fn dispose(&self) -> StoreResult<()> {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(namespace = %self.keys.namespace(), "account store disposed");
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Finish every journaled write left behind by an interrupted process.
    ///
    /// Returns the number of writes replayed. Safe to call in
    /// [`WriteMode::Simple`], where it finds nothing unless the same
    /// namespace was previously used in journaled mode.
    pub async fn recover(&self) -> StoreResult<usize> {
        self.ensure_active()?;
        let pending = self.backend.scan_keys(&self.keys.pending_pattern()).await?;
        let mut recovered = 0;
        for key in pending {
            let Some(raw) = self.backend.get(&key).await? else {
                continue;
            };
            let op: PendingWrite = serde_json::from_str(&raw)?;
            warn!(key = %key, kind = ?op.kind, id = %op.account.id, "replaying unfinished write");
            self.apply(&op).await?;
            self.backend.delete(&key).await?;
            recovered += 1;
        }
        Ok(recovered)
    }

    fn ensure_active(&self) -> StoreResult<()> {
        if self.is_disposed() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    /// Run a multi-key write according to the configured [`WriteMode`].
    async fn run(&self, op: PendingWrite) -> StoreResult<()> {
        match self.config.write_mode {
            WriteMode::Simple => self.apply(&op).await,
            WriteMode::Journaled => {
                let key = self.keys.pending_key(&op.account.id);
                self.backend.set(&key, &serde_json::to_string(&op)?).await?;
                self.apply(&op).await?;
                self.backend.delete(&key).await?;
                Ok(())
            }
        }
    }

    /// Carry out the steps of `op` in order, stopping at the first failure.
    async fn apply(&self, op: &PendingWrite) -> StoreResult<()> {
        match op.kind {
            PendingKind::Create => self.write_record(&op.account).await,
            PendingKind::Update => {
                if let Some(previous) = &op.previous {
                    self.remove_record(previous).await?;
                }
                self.write_record(&op.account).await
            }
            PendingKind::Delete => self.remove_record(&op.account).await,
        }
    }

    /// Write the primary record, then one index entry per login.
    async fn write_record(&self, account: &Account) -> StoreResult<()> {
        let key = self.keys.account_key(&account.username, &account.id);
        debug!(key = %key, "writing account record");
        self.backend
            .set(&key, &serde_json::to_string(account)?)
            .await?;

        for login in &account.logins {
            let index_key = self.keys.login_key(login)?;
            debug!(key = %index_key, id = %account.id, "writing login index");
            self.backend.set(&index_key, &account.id).await?;
        }
        Ok(())
    }

    /// Remove the primary record, then each login's index entry if present.
    async fn remove_record(&self, account: &Account) -> StoreResult<()> {
        let key = self.keys.account_key(&account.username, &account.id);
        debug!(key = %key, "removing account record");
        self.backend.delete(&key).await?;

        for login in &account.logins {
            let index_key = self.keys.login_key(login)?;
            if self.backend.exists(&index_key).await? {
                debug!(key = %index_key, "removing login index");
                self.backend.delete(&index_key).await?;
            }
        }
        Ok(())
    }

    /// Read the first record matching `pattern`, in scan order.
    async fn read_first(&self, pattern: &str) -> StoreResult<Option<Account>> {
        let keys = self.backend.scan_keys(pattern).await?;
        let Some(key) = keys.first() else {
            return Ok(None);
        };
        if keys.len() > 1 {
            warn!(
                pattern = %pattern,
                matches = keys.len(),
                "ambiguous account lookup; using first match"
            );
        }
        match self.backend.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            // Removed between the scan and the read.
            None => Ok(None),
        }
    }

    /// Follow one index value to a live account that still holds `login`.
    async fn resolve_index_value(
        &self,
        index_key: &str,
        value: Option<String>,
        login: &Login,
    ) -> StoreResult<Option<Account>> {
        let id = match value {
            Some(id) if !id.is_empty() => id,
            _ => return Ok(None),
        };
        match self.find_by_id(&id).await? {
            Some(account) if account.has_login(login) => Ok(Some(account)),
            Some(_) => {
                debug!(key = %index_key, id = %id, "index entry belongs to another login");
                Ok(None)
            }
            None => {
                warn!(key = %index_key, id = %id, "stale login index entry");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl<B: KvBackend> UserStore for AccountStore<B> {
    async fn create(&self, mut account: Account) -> StoreResult<Account> {
        self.ensure_active()?;
        if account.username.is_empty() {
            return Err(StoreError::InvalidArgument(
                "account needs a username".into(),
            ));
        }
        if let Some(bad) = account.logins.iter().find(|l| !l.is_well_formed()) {
            return Err(StoreError::InvalidArgument(format!(
                "login needs a provider and provider key: {bad:?}"
            )));
        }

        let id = self.backend.increment(&self.keys.counter_key()).await?;
        account.id = id.to_string();
        self.run(PendingWrite::create(account.clone())).await?;
        info!(id = %account.id, username = %account.username, "account created");
        Ok(account)
    }

    async fn update(&self, account: Account) -> StoreResult<Account> {
        self.ensure_active()?;
        if !account.has_id() {
            return Err(StoreError::InvalidArgument(
                "cannot update an account that was never created".into(),
            ));
        }
        if account.username.is_empty() {
            return Err(StoreError::InvalidArgument(
                "account needs a username".into(),
            ));
        }

        // The stored record may sit under a different username if the
        // caller renamed the account.
        let previous = self
            .read_first(&self.keys.account_pattern_by_id(&account.id))
            .await?;
        self.run(PendingWrite::update(account.clone(), previous))
            .await?;
        info!(id = %account.id, username = %account.username, "account updated");
        Ok(account)
    }

    async fn delete(&self, account: &Account) -> StoreResult<()> {
        self.ensure_active()?;
        if !account.has_id() {
            return Err(StoreError::InvalidArgument(
                "cannot delete an account that was never created".into(),
            ));
        }
        self.run(PendingWrite::delete(account.clone())).await?;
        info!(id = %account.id, username = %account.username, "account deleted");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        self.ensure_active()?;
        if id.is_empty() {
            return Ok(None);
        }
        self.read_first(&self.keys.account_pattern_by_id(id)).await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        self.ensure_active()?;
        if username.is_empty() {
            return Ok(None);
        }
        self.read_first(&self.keys.account_pattern_by_username(username))
            .await
    }
}

#[async_trait]
impl<B: KvBackend> UserLoginStore for AccountStore<B> {
    async fn add_login(&self, account: &mut Account, login: Login) -> StoreResult<()> {
        self.ensure_active()?;
        if !login.is_well_formed() {
            return Err(StoreError::InvalidArgument(format!(
                "login needs a provider and provider key: {login:?}"
            )));
        }
        if !account.has_login(&login) {
            account.logins.push(login);
        }
        Ok(())
    }

    async fn remove_login(&self, account: &mut Account, login: &Login) -> StoreResult<()> {
        self.ensure_active()?;
        account.logins.retain(|l| l != login);
        Ok(())
    }

    async fn logins(&self, account: &Account) -> StoreResult<Vec<Login>> {
        self.ensure_active()?;
        Ok(account.logins.clone())
    }

    async fn find_by_login(&self, login: &Login) -> StoreResult<Option<Account>> {
        self.ensure_active()?;
        let key = self.keys.login_key(login)?;
        let value = self.backend.get(&key).await?;
        if let Some(account) = self.resolve_index_value(&key, value, login).await? {
            return Ok(Some(account));
        }
        if !self.config.legacy_login_scan {
            return Ok(None);
        }

        let pattern = self.keys.legacy_login_pattern(login)?;
        for legacy_key in self.backend.scan_keys(&pattern).await? {
            let value = self.backend.get(&legacy_key).await?;
            if let Some(account) = self
                .resolve_index_value(&legacy_key, value, login)
                .await?
            {
                debug!(key = %legacy_key, "login resolved through legacy index");
                return Ok(Some(account));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl<B: KvBackend> UserClaimStore for AccountStore<B> {
    async fn add_claim(&self, account: &mut Account, claim: Claim) -> StoreResult<()> {
        self.ensure_active()?;
        if claim.claim_type.is_empty() {
            return Err(StoreError::InvalidArgument("claim needs a type".into()));
        }
        if !account.has_claim(&claim) {
            account.claims.push(claim);
        }
        Ok(())
    }

    async fn remove_claim(&self, account: &mut Account, claim: &Claim) -> StoreResult<()> {
        self.ensure_active()?;
        account.claims.retain(|c| c != claim);
        Ok(())
    }

    async fn claims(&self, account: &Account) -> StoreResult<Vec<Claim>> {
        self.ensure_active()?;
        Ok(account.claims.clone())
    }
}

#[async_trait]
impl<B: KvBackend> UserRoleStore for AccountStore<B> {
    async fn add_to_role(&self, account: &mut Account, role: &str) -> StoreResult<()> {
        self.ensure_active()?;
        if role.is_empty() {
            return Err(StoreError::InvalidArgument("role name is empty".into()));
        }
        if !account.has_role(role) {
            account.roles.push(role.to_string());
        }
        Ok(())
    }

    async fn remove_from_role(&self, account: &mut Account, role: &str) -> StoreResult<()> {
        self.ensure_active()?;
        account.roles.retain(|r| !roles_equal(r, role));
        Ok(())
    }

    async fn roles(&self, account: &Account) -> StoreResult<Vec<String>> {
        self.ensure_active()?;
        Ok(account.roles.clone())
    }

    async fn is_in_role(&self, account: &Account, role: &str) -> StoreResult<bool> {
        self.ensure_active()?;
        Ok(account.has_role(role))
    }
}

#[async_trait]
impl<B: KvBackend> UserPasswordStore for AccountStore<B> {
    async fn password_hash(&self, account: &Account) -> StoreResult<Option<String>> {
        self.ensure_active()?;
        Ok(account.password_hash.clone())
    }

    async fn set_password_hash(
        &self,
        account: &mut Account,
        hash: Option<String>,
    ) -> StoreResult<()> {
        self.ensure_active()?;
        account.password_hash = hash;
        Ok(())
    }

    async fn has_password(&self, account: &Account) -> StoreResult<bool> {
        self.ensure_active()?;
        Ok(account.password_hash.is_some())
    }
}

#[async_trait]
impl<B: KvBackend> UserSecurityStampStore for AccountStore<B> {
    async fn security_stamp(&self, account: &Account) -> StoreResult<Option<String>> {
        self.ensure_active()?;
        Ok(account.security_stamp.clone())
    }

    async fn set_security_stamp(
        &self,
        account: &mut Account,
        stamp: Option<String>,
    ) -> StoreResult<()> {
        self.ensure_active()?;
        account.security_stamp = stamp;
        Ok(())
    }
}

impl<B> std::fmt::Debug for AccountStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore")
            .field("namespace", &self.keys.namespace())
            .field("write_mode", &self.config.write_mode)
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use kvident_kv::{InMemoryKvBackend, KvError, KvResult};

    const NS: &str = "test:";

    fn store() -> AccountStore<InMemoryKvBackend> {
        store_with(StoreConfig::with_namespace(NS))
    }

    fn store_with(config: StoreConfig) -> AccountStore<InMemoryKvBackend> {
        AccountStore::with_config(Arc::new(InMemoryKvBackend::new()), config)
    }

    fn journaled() -> StoreConfig {
        StoreConfig {
            write_mode: WriteMode::Journaled,
            ..StoreConfig::with_namespace(NS)
        }
    }

    fn alice() -> Account {
        let mut a = Account::new("alice");
        a.password_hash = Some("hash".into());
        a.security_stamp = Some("stamp".into());
        a.logins.push(Login::new("google", "g-1"));
        a.claims.push(Claim::new("email", "alice@example.com"));
        a.roles.push("Admin".into());
        a
    }

    /// Backend that starts failing `set` or `delete` after a number of
    /// successful calls.
    struct FailingBackend {
        inner: InMemoryKvBackend,
        sets_left: AtomicUsize,
        deletes_left: AtomicUsize,
    }

    impl FailingBackend {
        fn new(inner: InMemoryKvBackend, sets_allowed: usize) -> Self {
            Self {
                inner,
                sets_left: AtomicUsize::new(sets_allowed),
                deletes_left: AtomicUsize::new(usize::MAX),
            }
        }

        fn failing_deletes(inner: InMemoryKvBackend, deletes_allowed: usize) -> Self {
            Self {
                inner,
                sets_left: AtomicUsize::new(usize::MAX),
                deletes_left: AtomicUsize::new(deletes_allowed),
            }
        }

        fn take(budget: &AtomicUsize) -> KvResult<()> {
            let left = budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(KvError::Io(std::io::Error::other("injected failure")));
            }
            budget.store(left - 1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl KvBackend for FailingBackend {
        async fn get(&self, key: &str) -> KvResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> KvResult<()> {
            Self::take(&self.sets_left)?;
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> KvResult<bool> {
            Self::take(&self.deletes_left)?;
            self.inner.delete(key).await
        }

        async fn exists(&self, key: &str) -> KvResult<bool> {
            self.inner.exists(key).await
        }

        async fn increment(&self, key: &str) -> KvResult<i64> {
            self.inner.increment(key).await
        }

        async fn scan_keys(&self, pattern: &str) -> KvResult<Vec<String>> {
            self.inner.scan_keys(pattern).await
        }
    }

    async fn copy_backend(from: &InMemoryKvBackend) -> InMemoryKvBackend {
        let fresh = InMemoryKvBackend::new();
        for key in from.keys().unwrap() {
            let value = from.get(&key).await.unwrap().unwrap();
            fresh.set(&key, &value).await.unwrap();
        }
        fresh
    }

    /// Stands in for a restarted process reading the same data.
    async fn restart(failing: &FailingBackend) -> Arc<InMemoryKvBackend> {
        Arc::new(copy_backend(&failing.inner).await)
    }

    // ---- Record lifecycle ----

    #[tokio::test]
    async fn ids_come_from_counter() {
        let store = store();
        let first = store.create(Account::new("alice")).await.unwrap();
        assert!(store.find_by_username("nobody").await.unwrap().is_none());
        let second = store.create(Account::new("bob")).await.unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(second.id, "2");
        assert_eq!(
            store
                .backend()
                .get("test:aspnetusers")
                .await
                .unwrap()
                .as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn create_then_find_by_id_round_trips() {
        let store = store();
        let created = store.create(alice()).await.unwrap();
        let found = store.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store
            .backend()
            .exists("test:aspnetusers:alice:1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn find_by_username() {
        let store = store();
        let created = store.create(alice()).await.unwrap();
        store.create(Account::new("alice2")).await.unwrap();
        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn missing_records_are_none() {
        let store = store();
        store.create(Account::new("alice")).await.unwrap();
        assert!(store.find_by_id("99").await.unwrap().is_none());
        assert!(store.find_by_id("").await.unwrap().is_none());
        assert!(store.find_by_username("bob").await.unwrap().is_none());
        assert!(store.find_by_username("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn id_lookup_does_not_match_longer_ids() {
        let store = store();
        for i in 0..12 {
            store.create(Account::new(format!("u{i}"))).await.unwrap();
        }
        let found = store.find_by_id("1").await.unwrap().unwrap();
        assert_eq!(found.username, "u0");
        let found = store.find_by_id("11").await.unwrap().unwrap();
        assert_eq!(found.username, "u10");
    }

    #[tokio::test]
    async fn rename_keeps_id() {
        let store = store();
        let mut account = store.create(alice()).await.unwrap();
        let id = account.id.clone();

        account.username = "alice2".into();
        let updated = store.update(account).await.unwrap();
        assert_eq!(updated.id, id);

        let by_id = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice2");
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        assert_eq!(
            store.find_by_username("alice2").await.unwrap().unwrap().id,
            id
        );
        // Login index survives the rewrite.
        let by_login = store
            .find_by_login(&Login::new("google", "g-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_login.id, id);
        // Counter was not bumped.
        assert_eq!(store.create(Account::new("carol")).await.unwrap().id, "2");
    }

    #[tokio::test]
    async fn update_drops_index_for_removed_login() {
        let store = store();
        let mut account = store.create(alice()).await.unwrap();
        let google = Login::new("google", "g-1");
        let github = Login::new("github", "h-1");

        store.remove_login(&mut account, &google).await.unwrap();
        store.add_login(&mut account, github.clone()).await.unwrap();
        let account = store.update(account).await.unwrap();

        assert!(store.find_by_login(&google).await.unwrap().is_none());
        assert_eq!(
            store.find_by_login(&github).await.unwrap().unwrap().id,
            account.id
        );
    }

    #[tokio::test]
    async fn update_requires_id() {
        let store = store();
        let err = store.update(Account::new("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn update_of_vanished_record_recreates_it() {
        let store = store();
        let account = store.create(Account::new("alice")).await.unwrap();
        store
            .backend()
            .delete("test:aspnetusers:alice:1")
            .await
            .unwrap();
        store.update(account).await.unwrap();
        assert!(store.find_by_id("1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_rejects_bad_input_without_using_an_id() {
        let store = store();
        let err = store.create(Account::new("")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        let mut bad = Account::new("alice");
        bad.logins.push(Login::new("google", ""));
        let err = store.create(bad).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        assert_eq!(store.create(Account::new("bob")).await.unwrap().id, "1");
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let store = store();
        let a = store.create(Account::new("alice")).await.unwrap();
        store.delete(&a).await.unwrap();
        let b = store.create(Account::new("alice")).await.unwrap();
        assert_eq!(b.id, "2");
        assert!(store.find_by_id("1").await.unwrap().is_none());
    }

    // ---- Login index ----

    #[tokio::test]
    async fn login_index_follows_create_and_delete() {
        let store = store();
        let login = Login::new("google", "g-1");
        let created = store.create(alice()).await.unwrap();

        assert_eq!(
            store
                .backend()
                .get("test:userlogins:google:g-1")
                .await
                .unwrap()
                .as_deref(),
            Some("1")
        );
        let found = store.find_by_login(&login).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        store.delete(&created).await.unwrap();
        assert!(store.find_by_login(&login).await.unwrap().is_none());
        assert!(!store
            .backend()
            .exists("test:userlogins:google:g-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_tolerates_missing_index_entries() {
        let store = store();
        let mut account = store.create(Account::new("alice")).await.unwrap();
        // Added in memory only, so no index entry exists.
        store
            .add_login(&mut account, Login::new("github", "h-1"))
            .await
            .unwrap();
        store.delete(&account).await.unwrap();
        assert!(store.find_by_id(&account.id).await.unwrap().is_none());
    }

    /// Account holding `twitter:t-1` whose exact index key is absent, as in
    /// data written under the older layout.
    async fn legacy_twitter_account(store: &AccountStore<InMemoryKvBackend>) -> Account {
        let mut account = Account::new("alice");
        account.logins.push(Login::new("twitter", "t-1"));
        let account = store.create(account).await.unwrap();
        store
            .backend()
            .delete("test:userlogins:twitter:t-1")
            .await
            .unwrap();
        account
    }

    #[tokio::test]
    async fn legacy_index_layout_resolves() {
        let store = store();
        let account = legacy_twitter_account(&store).await;
        let login = Login::new("twitter", "t-1");
        let backend = store.backend();
        backend.set("test:userlogins:twitter:t-1:a", "").await.unwrap();
        backend.set("test:userlogins:twitter:t-1:b", "42").await.unwrap();
        backend
            .set("test:userlogins:twitter:t-1:c", &account.id)
            .await
            .unwrap();

        let found = store.find_by_login(&login).await.unwrap().unwrap();
        assert_eq!(found.id, account.id);
    }

    #[tokio::test]
    async fn stale_exact_entry_falls_back_to_legacy() {
        let store = store();
        let account = legacy_twitter_account(&store).await;
        let login = Login::new("twitter", "t-1");
        let backend = store.backend();
        backend.set("test:userlogins:twitter:t-1", "77").await.unwrap();
        backend
            .set("test:userlogins:twitter:t-1:old", &account.id)
            .await
            .unwrap();

        let found = store.find_by_login(&login).await.unwrap().unwrap();
        assert_eq!(found.id, account.id);
    }

    #[tokio::test]
    async fn legacy_scan_can_be_disabled() {
        let store = store_with(StoreConfig {
            legacy_login_scan: false,
            ..StoreConfig::with_namespace(NS)
        });
        let account = legacy_twitter_account(&store).await;
        store
            .backend()
            .set("test:userlogins:twitter:t-1:old", &account.id)
            .await
            .unwrap();
        assert!(store
            .find_by_login(&Login::new("twitter", "t-1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn login_lookup_ignores_longer_provider_keys() {
        let store = store();
        let mut account = Account::new("alice");
        account.logins.push(Login::new("oidc", "a:b"));
        let account = store.create(account).await.unwrap();

        // `userlogins:oidc:a:*` matches alice's `userlogins:oidc:a:b` entry.
        assert!(store
            .find_by_login(&Login::new("oidc", "a"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .find_by_login(&Login::new("oidc", "a:b"))
                .await
                .unwrap()
                .unwrap()
                .id,
            account.id
        );
    }

    #[tokio::test]
    async fn index_entry_for_unheld_login_is_ignored() {
        let store = store();
        let bob = store.create(Account::new("bob")).await.unwrap();
        store
            .backend()
            .set("test:userlogins:google:g-9", &bob.id)
            .await
            .unwrap();
        assert!(store
            .find_by_login(&Login::new("google", "g-9"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn find_by_login_rejects_malformed_login() {
        let store = store();
        let err = store
            .find_by_login(&Login::new("", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    // ---- In-memory mutators ----

    #[tokio::test]
    async fn duplicate_login_is_ignored() {
        let store = store();
        let mut account = alice();
        store
            .add_login(&mut account, Login::new("google", "g-1"))
            .await
            .unwrap();
        assert_eq!(account.logins.len(), 1);
        store
            .add_login(&mut account, Login::new("google", "g-2"))
            .await
            .unwrap();
        assert_eq!(store.logins(&account).await.unwrap().len(), 2);

        store
            .remove_login(&mut account, &Login::new("google", "g-1"))
            .await
            .unwrap();
        assert_eq!(account.logins, vec![Login::new("google", "g-2")]);
    }

    #[tokio::test]
    async fn add_login_rejects_malformed_login() {
        let store = store();
        let mut account = Account::new("alice");
        let err = store
            .add_login(&mut account, Login::new("google", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(account.logins.is_empty());
    }

    #[tokio::test]
    async fn claims_are_unique_by_type_and_value() {
        let store = store();
        let mut account = Account::new("alice");
        let email = Claim::new("email", "a@example.com");
        store.add_claim(&mut account, email.clone()).await.unwrap();
        store.add_claim(&mut account, email.clone()).await.unwrap();
        store
            .add_claim(&mut account, Claim::new("email", "b@example.com"))
            .await
            .unwrap();
        assert_eq!(store.claims(&account).await.unwrap().len(), 2);

        store.remove_claim(&mut account, &email).await.unwrap();
        assert_eq!(
            store.claims(&account).await.unwrap(),
            vec![Claim::new("email", "b@example.com")]
        );

        let err = store
            .add_claim(&mut account, Claim::new("", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn roles_compare_case_insensitively() {
        let store = store();
        let mut account = Account::new("alice");
        store.add_to_role(&mut account, "Admin").await.unwrap();
        store.add_to_role(&mut account, "admin").await.unwrap();
        assert!(store.is_in_role(&account, "admin").await.unwrap());
        assert_eq!(store.roles(&account).await.unwrap(), vec!["Admin"]);

        store.remove_from_role(&mut account, "ADMIN").await.unwrap();
        assert!(!store.is_in_role(&account, "admin").await.unwrap());
        assert!(account.roles.is_empty());
    }

    #[tokio::test]
    async fn setters_do_not_persist() {
        let store = store();
        let mut account = store.create(alice()).await.unwrap();
        let keys_before = store.backend().keys().unwrap();

        store
            .set_password_hash(&mut account, Some("new-hash".into()))
            .await
            .unwrap();
        store.set_security_stamp(&mut account, None).await.unwrap();
        store.add_to_role(&mut account, "ops").await.unwrap();

        assert_eq!(store.backend().keys().unwrap(), keys_before);
        let stored = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash.as_deref(), Some("hash"));
        assert_eq!(stored.security_stamp.as_deref(), Some("stamp"));

        store.update(account.clone()).await.unwrap();
        let stored = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(stored, account);
    }

    #[tokio::test]
    async fn password_accessors() {
        let store = store();
        let mut account = Account::new("alice");
        assert!(!store.has_password(&account).await.unwrap());
        store
            .set_password_hash(&mut account, Some("h".into()))
            .await
            .unwrap();
        assert!(store.has_password(&account).await.unwrap());
        assert_eq!(
            store.password_hash(&account).await.unwrap().as_deref(),
            Some("h")
        );
        store
            .set_security_stamp(&mut account, Some("s".into()))
            .await
            .unwrap();
        assert_eq!(
            store.security_stamp(&account).await.unwrap().as_deref(),
            Some("s")
        );
    }

    // ---- Disposal ----

    #[tokio::test]
    async fn disposed_store_rejects_everything() {
        let store = store();
        let mut account = store.create(alice()).await.unwrap();
        store.dispose().unwrap();
        assert!(store.is_disposed());
        store.dispose().unwrap();

        let login = Login::new("google", "g-1");
        assert!(matches!(
            store.create(Account::new("bob")).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(
            store.update(account.clone()).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(store.delete(&account).await, Err(StoreError::Disposed)));
        assert!(matches!(store.find_by_id("1").await, Err(StoreError::Disposed)));
        assert!(matches!(
            store.find_by_username("alice").await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(
            store.find_by_login(&login).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(
            store.add_login(&mut account, login.clone()).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(store.logins(&account).await, Err(StoreError::Disposed)));
        assert!(matches!(
            store.add_to_role(&mut account, "x").await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(
            store.is_in_role(&account, "x").await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(
            store.claims(&account).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(
            store.has_password(&account).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(
            store.set_security_stamp(&mut account, None).await,
            Err(StoreError::Disposed)
        ));
        assert!(matches!(store.recover().await, Err(StoreError::Disposed)));
    }

    // ---- Failure behaviour ----

    #[tokio::test]
    async fn backend_failure_leaves_partial_write() {
        // Record write succeeds, index write fails.
        let backend = Arc::new(FailingBackend::new(InMemoryKvBackend::new(), 1));
        let store = AccountStore::with_config(backend, StoreConfig::with_namespace(NS));

        let err = store.create(alice()).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(KvError::Io(_))));

        assert!(store.find_by_id("1").await.unwrap().is_some());
        assert!(store
            .find_by_login(&Login::new("google", "g-1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn journaled_create_is_completed_by_recover() {
        // Journal write and record write succeed, index write fails.
        let failing = FailingBackend::new(InMemoryKvBackend::new(), 2);
        let store = AccountStore::with_config(Arc::new(failing), journaled());
        assert!(store.create(alice()).await.is_err());
        assert!(store.backend().inner.exists("test:pending:1").await.unwrap());

        let store = AccountStore::with_config(restart(store.backend()).await, journaled());
        assert_eq!(store.recover().await.unwrap(), 1);
        assert!(!store.backend().exists("test:pending:1").await.unwrap());

        let found = store
            .find_by_login(&Login::new("google", "g-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "1");
        assert_eq!(store.recover().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn journaled_rename_survives_crash_after_delete() {
        let seeded = store_with(journaled());
        let mut account = seeded.create(alice()).await.unwrap();
        let inner = copy_backend(seeded.backend()).await;

        // Journal write succeeds, then the old record is deleted, then the
        // new record write fails.
        let failing = FailingBackend::new(inner, 1);
        let store = AccountStore::with_config(Arc::new(failing), journaled());
        account.username = "alice2".into();
        assert!(store.update(account.clone()).await.is_err());
        assert!(store.find_by_id("1").await.unwrap().is_none());

        let store = AccountStore::with_config(restart(store.backend()).await, journaled());
        assert_eq!(store.recover().await.unwrap(), 1);
        let found = store.find_by_id("1").await.unwrap().unwrap();
        assert_eq!(found, account);
        assert!(store.find_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn journaled_delete_is_completed_by_recover() {
        let seeded = store_with(journaled());
        let account = seeded.create(alice()).await.unwrap();
        let inner = copy_backend(seeded.backend()).await;

        // Record delete succeeds, login index delete fails.
        let failing = FailingBackend::failing_deletes(inner, 1);
        let store = AccountStore::with_config(Arc::new(failing), journaled());
        assert!(store.delete(&account).await.is_err());
        assert!(store
            .backend()
            .inner
            .exists("test:userlogins:google:g-1")
            .await
            .unwrap());

        let store = AccountStore::with_config(restart(store.backend()).await, journaled());
        assert_eq!(store.recover().await.unwrap(), 1);
        assert!(store.find_by_id("1").await.unwrap().is_none());
        assert!(store
            .find_by_login(&Login::new("google", "g-1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.backend().keys().unwrap(), vec!["test:aspnetusers"]);
    }

    #[tokio::test]
    async fn journaled_update_recovery_drops_removed_login() {
        let seeded = store_with(journaled());
        let mut account = seeded.create(alice()).await.unwrap();
        let inner = copy_backend(seeded.backend()).await;
        let google = Login::new("google", "g-1");
        let github = Login::new("github", "h-1");

        // Old record delete succeeds, old login index delete fails.
        let failing = FailingBackend::failing_deletes(inner, 1);
        let store = AccountStore::with_config(Arc::new(failing), journaled());
        store.remove_login(&mut account, &google).await.unwrap();
        store.add_login(&mut account, github.clone()).await.unwrap();
        assert!(store.update(account.clone()).await.is_err());

        let store = AccountStore::with_config(restart(store.backend()).await, journaled());
        assert_eq!(store.recover().await.unwrap(), 1);
        assert!(!store
            .backend()
            .exists("test:userlogins:google:g-1")
            .await
            .unwrap());
        assert!(store.find_by_login(&google).await.unwrap().is_none());
        let found = store.find_by_login(&github).await.unwrap().unwrap();
        assert_eq!(found, account);
    }

    #[tokio::test]
    async fn journaled_writes_clear_their_journal() {
        let store = store_with(journaled());
        let account = store.create(alice()).await.unwrap();
        store.update(account.clone()).await.unwrap();
        store.delete(&account).await.unwrap();
        assert!(store
            .backend()
            .scan_keys("test:pending:*")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.backend().keys().unwrap(), vec!["test:aspnetusers"]);
    }
}
