//! Registry of wiki spaces: namespace partitions with owners, administrators
//! and archive/protection flags, persisted in SQLite.
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//!
//! use wikispaces_core::config::Config;
//! use wikispaces_core::core_space::{
//!     Capability, Collaborators, GroupMembership, NamespaceRepository, NoopListener,
//!     PermissionGate, RegistryResult, RequestContext, Space, SpaceSqlStore, SqlAuditLog, User,
//!     UserDirectory, UserId,
//! };
//!
//! /// Account lookups served by the wiki's user table
//! struct WikiAccounts;
//!
//! impl UserDirectory for WikiAccounts {
//!     fn resolve_by_name(&self, name: &str) -> Option<UserId> {
//!         (name == "Alice").then_some(UserId(1))
//!     }
//!     fn resolve_by_id(&self, id: UserId) -> Option<User> {
//!         (id == UserId(1)).then(|| User::new(id, "Alice"))
//!     }
//! }
//!
//! /// Group memberships kept by the wiki's rights system
//! struct WikiGroups;
//!
//! impl GroupMembership for WikiGroups {
//!     fn groups(&self, _user: UserId) -> BTreeSet<String> {
//!         BTreeSet::new()
//!     }
//!     fn add_to_group(&self, _user: UserId, _group: &str) -> RegistryResult<()> {
//!         Ok(())
//!     }
//!     fn remove_from_group(&self, _user: UserId, _group: &str) -> RegistryResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct WikiRights;
//!
//! impl PermissionGate for WikiRights {
//!     fn user_has_capability(&self, _user: &User, capability: Capability) -> bool {
//!         capability == Capability::ArchiveSpaces
//!     }
//! }
//!
//! let config = Config::from_env()?;
//! let store = SpaceSqlStore::open(&config.store)?;
//! let collaborators = Collaborators {
//!     directory: Arc::new(WikiAccounts),
//!     groups: Arc::new(WikiGroups),
//!     permissions: Arc::new(WikiRights),
//!     audit: Arc::new(SqlAuditLog::new(store.primary().clone())),
//!     listener: Arc::new(NoopListener),
//! };
//! let repo = NamespaceRepository::new(store, config.spaces.clone(), collaborators);
//!
//! let alice = User::new(UserId(1), "Alice");
//! let space = Space::from_values("Legal", "Legal Affairs", "Contracts and policy", alice.clone())?;
//! let id = repo.create(&RequestContext::new(alice), &space)?;
//! assert_eq!(id.talk_id().as_i64(), id.as_i64() + 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod core_space;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use core_space::{NamespaceRepository, RegistryError, RegistryResult, Space, SpaceId};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        assert_eq!(core_space::MIN_SPACE_ID, 50_000);
        assert!(Config::default().validate().is_ok());
    }
}
