//! Pending-write records for [`WriteMode::Journaled`](crate::WriteMode::Journaled).
//!
//! A multi-key write is described by a [`PendingWrite`] and stored under
//! `<ns>pending:<id>` before any of its steps run. Replaying a pending write
//! is idempotent, so a record left behind by a crash can be applied again
//! without knowing how far the original attempt got.

use serde::{Deserialize, Serialize};

use crate::account::Account;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    Create,
    Update,
    Delete,
}

/// One multi-key write, as recorded before it starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub kind: PendingKind,
    /// The account as it should be after the write. For deletes, the
    /// account being removed.
    pub account: Account,
    /// The stored record being replaced, for updates.
    #[serde(default)]
    pub previous: Option<Account>,
}

impl PendingWrite {
    pub fn create(account: Account) -> Self {
        Self {
            kind: PendingKind::Create,
            account,
            previous: None,
        }
    }

    pub fn update(account: Account, previous: Option<Account>) -> Self {
        Self {
            kind: PendingKind::Update,
            account,
            previous,
        }
    }

    pub fn delete(account: Account) -> Self {
        Self {
            kind: PendingKind::Delete,
            account,
            previous: None,
        }
    }
}
