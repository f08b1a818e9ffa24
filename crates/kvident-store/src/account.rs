//! The account entity and its embedded collections.
//!
//! An [`Account`] is stored as one serialized record. Its logins, claims and
//! roles live inside that record; only logins are additionally mirrored into
//! a reverse index (see [`KeyBuilder::login_key`](crate::KeyBuilder::login_key)).

use serde::{Deserialize, Serialize};

/// An external login: a provider name and the key that provider uses for
/// the user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Login {
    /// Provider name (e.g. "google").
    pub provider: String,
    /// The provider's identifier for the user.
    pub provider_key: String,
}

impl Login {
    pub fn new(provider: impl Into<String>, provider_key: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            provider_key: provider_key.into(),
        }
    }

    /// Both parts are non-empty.
    pub fn is_well_formed(&self) -> bool {
        !self.provider.is_empty() && !self.provider_key.is_empty()
    }
}

/// A (type, value) claim attached to an account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// A user account.
///
/// `id` is empty until the store assigns one on create. Once assigned it
/// never changes, and a deleted account's id is never handed out again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub security_stamp: Option<String>,
    #[serde(default)]
    pub logins: Vec<Login>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Account {
    /// A new, unsaved account with the given username.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Returns `true` once the store has assigned an id.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Exact match on provider and provider key.
    pub fn has_login(&self, login: &Login) -> bool {
        self.logins.iter().any(|l| l == login)
    }

    /// Exact match on claim type and value.
    pub fn has_claim(&self, claim: &Claim) -> bool {
        self.claims.iter().any(|c| c == claim)
    }

    /// Case-insensitive role membership.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| roles_equal(r, role))
    }
}

/// Role names compare without regard to case.
pub(crate) fn roles_equal(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
