//! Admin eligibility.
//!
//! Identity is an opaque user id supplied by an external provider. Whether a
//! user may edit the bracket is decided by membership in an allow-list that is
//! loaded from configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// What a connected user may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sole intended writer of the bracket.
    Admin,
    /// Read-only spectator.
    Viewer,
}

impl Role {
    /// Whether this role may mutate the bracket.
    #[must_use]
    pub fn can_edit(self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Viewer => f.write_str("viewer"),
        }
    }
}

/// Allow-list of admin identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminPolicy {
    admins: HashSet<String>,
}

impl AdminPolicy {
    /// Build a policy from a list of admin user ids. Blank entries are ignored.
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins
                .into_iter()
                .map(Into::into)
                .map(|id: String| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    /// Whether `user_id` is on the allow-list.
    #[must_use]
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id.trim())
    }

    /// Role for `user_id`.
    #[must_use]
    pub fn role_for(&self, user_id: &str) -> Role {
        if self.is_admin(user_id) {
            Role::Admin
        } else {
            Role::Viewer
        }
    }

    /// Number of admins on the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.admins.len()
    }

    /// Whether the list is empty (nobody may edit).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}
