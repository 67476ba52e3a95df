//! In-memory collaborators for tests and local tooling

use super::audit::{AuditLog, MemoryAuditLog};
use super::collaborators::{
    Capability, GroupChange, GroupMembership, PermissionGate, SpaceListener, UserDirectory,
};
use super::errors::RegistryResult;
use super::repository::Collaborators;
use super::space::Space;
use super::types::{SpaceId, User, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

/// User directory backed by a map
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: Mutex<BTreeMap<UserId, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory with one account per name, ids starting at 1
    pub fn with_users(names: &[&str]) -> Self {
        let directory = Self::new();
        for name in names {
            directory.add_user(name);
        }
        directory
    }

    pub fn add_user(&self, name: &str) -> User {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let next = users.keys().next_back().map_or(1, |id| id.as_i64().max(0) + 1);
        let user = User::new(UserId(next), name);
        users.insert(user.id, user.clone());
        user
    }

    /// Register the anonymous identity under `name`
    pub fn add_anonymous(&self, name: &str) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.insert(UserId::ANONYMOUS, User::anonymous(name));
    }

    pub fn remove_user(&self, name: &str) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.retain(|_, user| user.name != name);
    }

    pub fn user(&self, name: &str) -> Option<User> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.values().find(|user| user.name == name).cloned()
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn resolve_by_name(&self, name: &str) -> Option<UserId> {
        self.user(name).map(|user| user.id)
    }

    fn resolve_by_id(&self, id: UserId) -> Option<User> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get(&id).cloned()
    }
}

/// A membership call made against [`MemoryGroups`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOp {
    Added(UserId, String),
    Removed(UserId, String),
}

/// Group store that records every call
#[derive(Debug, Default)]
pub struct MemoryGroups {
    memberships: Mutex<BTreeMap<UserId, BTreeSet<String>>>,
    operations: Mutex<Vec<GroupOp>>,
}

impl MemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `user` into `group` without recording an operation
    pub fn seed(&self, user: UserId, group: &str) {
        let mut memberships = self.memberships.lock().unwrap_or_else(|e| e.into_inner());
        memberships.entry(user).or_default().insert(group.to_string());
    }

    pub fn operations(&self) -> Vec<GroupOp> {
        self.operations.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl GroupMembership for MemoryGroups {
    fn groups(&self, user: UserId) -> BTreeSet<String> {
        let memberships = self.memberships.lock().unwrap_or_else(|e| e.into_inner());
        memberships.get(&user).cloned().unwrap_or_default()
    }

    fn add_to_group(&self, user: UserId, group: &str) -> RegistryResult<()> {
        self.seed(user, group);
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(GroupOp::Added(user, group.to_string()));
        Ok(())
    }

    fn remove_from_group(&self, user: UserId, group: &str) -> RegistryResult<()> {
        if let Some(groups) = self.memberships.lock().unwrap_or_else(|e| e.into_inner()).get_mut(&user) {
            groups.remove(group);
        }
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(GroupOp::Removed(user, group.to_string()));
        Ok(())
    }
}

/// Permission gate with explicit per-user grants
#[derive(Debug, Default)]
pub struct StaticPermissionGate {
    grants: Mutex<BTreeSet<(UserId, Capability)>>,
}

impl StaticPermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user: &User, capability: Capability) {
        self.grants.lock().unwrap_or_else(|e| e.into_inner()).insert((user.id, capability));
    }

    pub fn revoke(&self, user: &User, capability: Capability) {
        self.grants.lock().unwrap_or_else(|e| e.into_inner()).remove(&(user.id, capability));
    }
}

impl PermissionGate for StaticPermissionGate {
    fn user_has_capability(&self, user: &User, capability: Capability) -> bool {
        self.grants.lock().unwrap_or_else(|e| e.into_inner()).contains(&(user.id, capability))
    }
}

/// Listener that remembers what it was told
#[derive(Debug, Default)]
pub struct RecordingListener {
    created: Mutex<Vec<(SpaceId, usize)>>,
    changes: Mutex<Vec<GroupChange>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Created space ids, each with the number of administrators the space
    /// carried when the notification fired
    pub fn created(&self) -> Vec<(SpaceId, usize)> {
        self.created.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn group_changes(&self) -> Vec<GroupChange> {
        self.changes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SpaceListener for RecordingListener {
    fn space_created(&self, space: &Space) -> RegistryResult<()> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((space.id(), space.administrators().len()));
        Ok(())
    }

    fn groups_changed(&self, change: &GroupChange) {
        self.changes.lock().unwrap_or_else(|e| e.into_inner()).push(change.clone());
    }
}

/// One in-memory instance of every collaborator
pub struct Harness {
    pub directory: Arc<MemoryUserDirectory>,
    pub groups: Arc<MemoryGroups>,
    pub permissions: Arc<StaticPermissionGate>,
    pub audit: Arc<MemoryAuditLog>,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    pub fn new(users: &[&str]) -> Self {
        Self {
            directory: Arc::new(MemoryUserDirectory::with_users(users)),
            groups: Arc::new(MemoryGroups::new()),
            permissions: Arc::new(StaticPermissionGate::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            listener: Arc::new(RecordingListener::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        self.collaborators_with_audit(self.audit.clone())
    }

    /// Same collaborators, with a different audit sink
    pub fn collaborators_with_audit(&self, audit: Arc<dyn AuditLog>) -> Collaborators {
        Collaborators {
            directory: self.directory.clone(),
            groups: self.groups.clone(),
            permissions: self.permissions.clone(),
            audit,
            listener: self.listener.clone(),
        }
    }
}
