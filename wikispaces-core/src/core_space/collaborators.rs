//! Interfaces of the systems the registry talks to but does not own
//!
//! The registry only consumes user identities, asks for capability checks and
//! requests group-membership changes. Everything behind these traits (account
//! storage, the group store, page rendering) lives outside this crate.
//!
//! ```text
//! NamespaceRepository
//!       |
//!       +---> UserDirectory     (name <-> id resolution)
//!       +---> GroupMembership   (space admin groups)
//!       +---> PermissionGate    (global capabilities)
//!       +---> SpaceListener     (created / groups-changed notifications)
//!       +---> AuditLog          (see `audit`)
//! ```

use super::errors::RegistryResult;
use super::space::Space;
use super::types::{User, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Resolves user accounts
pub trait UserDirectory: Send + Sync {
    /// Look up an account id by display name
    fn resolve_by_name(&self, name: &str) -> Option<UserId>;

    /// Load an account by id; `None` when the account cannot be loaded
    fn resolve_by_id(&self, id: UserId) -> Option<User>;

    fn is_anonymous(&self, id: UserId) -> bool {
        id.is_anonymous()
    }
}

/// External group-membership store
pub trait GroupMembership: Send + Sync {
    /// Current group names of a user
    fn groups(&self, user: UserId) -> BTreeSet<String>;

    fn add_to_group(&self, user: UserId, group: &str) -> RegistryResult<()>;

    fn remove_from_group(&self, user: UserId, group: &str) -> RegistryResult<()>;
}

/// Global capabilities consulted by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Edit the settings of any space, administrator or not
    EditAllSpaces,
    /// Edit pages inside protected spaces
    EditProtectedPages,
    /// Archive and unarchive spaces
    ArchiveSpaces,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::EditAllSpaces => "wss-edit-all-spaces",
            Capability::EditProtectedPages => "wss-edit-protected-pages",
            Capability::ArchiveSpaces => "wss-archive-space",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability checks
pub trait PermissionGate: Send + Sync {
    fn user_has_capability(&self, user: &User, capability: Capability) -> bool;
}

/// A membership change applied to one user, with before/after snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChange {
    pub user: UserId,
    pub old_groups: BTreeSet<String>,
    pub new_groups: BTreeSet<String>,
    /// Human-readable reason shown in the membership log
    pub reason: String,
}

impl GroupChange {
    pub fn added(&self) -> BTreeSet<String> {
        self.new_groups.difference(&self.old_groups).cloned().collect()
    }

    pub fn removed(&self) -> BTreeSet<String> {
        self.old_groups.difference(&self.new_groups).cloned().collect()
    }
}

/// Receives lifecycle notifications
///
/// `space_created` runs after the bare row is written and before the
/// administrator set is fixed, so listeners may still react to it.
pub trait SpaceListener: Send + Sync {
    fn space_created(&self, _space: &Space) -> RegistryResult<()> {
        Ok(())
    }

    fn groups_changed(&self, _change: &GroupChange) {}
}

/// Listener that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SpaceListener for NoopListener {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_change_diff() {
        let change = GroupChange {
            user: UserId(2),
            old_groups: ["LegalSpaceAdmin", "SpaceAdmin", "editors"]
                .into_iter()
                .map(String::from)
                .collect(),
            new_groups: ["SpaceAdmin", "editors", "FinanceSpaceAdmin"]
                .into_iter()
                .map(String::from)
                .collect(),
            reason: "test".to_string(),
        };

        assert_eq!(change.removed(), BTreeSet::from(["LegalSpaceAdmin".to_string()]));
        assert_eq!(change.added(), BTreeSet::from(["FinanceSpaceAdmin".to_string()]));
    }

    #[test]
    fn test_capability_names() {
        assert_eq!(Capability::EditAllSpaces.to_string(), "wss-edit-all-spaces");
        assert_eq!(Capability::ArchiveSpaces.as_str(), "wss-archive-space");
    }

    #[test]
    fn test_default_anonymous_check() {
        struct Empty;
        impl UserDirectory for Empty {
            fn resolve_by_name(&self, _name: &str) -> Option<UserId> {
                None
            }
            fn resolve_by_id(&self, _id: UserId) -> Option<User> {
                None
            }
        }

        assert!(Empty.is_anonymous(UserId(0)));
        assert!(!Empty.is_anonymous(UserId(3)));
    }
}
