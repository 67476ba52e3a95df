//! Administrator synchronization
//!
//! Reconciles the administrator names held by a [`Space`] against the
//! association rows recorded in the store and, when enabled, against the
//! external group-membership system.
//!
//! ```text
//! desired names --resolve--> target ids
//! stored rows   ----------> previous ids
//!
//! removed = previous - target   -> strip space group (+ shared role unless
//!                                  another space-admin group is still held)
//! target                        -> grant missing space group / shared role
//! key renamed                   -> old space group treated as stale for both
//! rows                          := target   (always, sync flag or not)
//! ```

use super::collaborators::{GroupChange, GroupMembership, SpaceListener, UserDirectory};
use super::errors::RegistryResult;
use super::space::Space;
use super::storage::StoreTx;
use super::types::{SpaceId, UserId};
use std::collections::BTreeSet;

/// Group naming scheme for space administrators
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminGroupPolicy;

impl AdminGroupPolicy {
    /// Role shared by the administrators of every space
    pub const SHARED_GROUP: &'static str = "SpaceAdmin";

    /// Group granted to the administrators of one space
    pub fn space_group(key: &str) -> String {
        format!("{}{}", key, Self::SHARED_GROUP)
    }

    /// Whether `group` is the administrator group of some space.
    ///
    /// Matches exactly the names produced by [`AdminGroupPolicy::space_group`]
    /// for a valid key, never the shared role itself.
    pub fn is_space_admin_group(group: &str) -> bool {
        group
            .strip_suffix(Self::SHARED_GROUP)
            .is_some_and(|key| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric()))
    }
}

/// Outcome of one synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Administrators recorded after the run
    pub target: BTreeSet<UserId>,
    /// Administrators dropped by the run
    pub removed: BTreeSet<UserId>,
    /// Group-membership changes that were applied
    pub group_changes: Vec<GroupChange>,
}

/// Computes and applies administrator changes for one space
pub struct AdminSynchronizer<'a> {
    directory: &'a dyn UserDirectory,
    groups: &'a dyn GroupMembership,
    listener: &'a dyn SpaceListener,
    auto_group_sync: bool,
}

impl<'a> AdminSynchronizer<'a> {
    pub fn new(
        directory: &'a dyn UserDirectory,
        groups: &'a dyn GroupMembership,
        listener: &'a dyn SpaceListener,
        auto_group_sync: bool,
    ) -> Self {
        Self { directory, groups, listener, auto_group_sync }
    }

    /// Resolve display names to account ids.
    ///
    /// Unknown and anonymous names are dropped; duplicates collapse.
    pub fn resolve_targets(&self, names: &[String]) -> BTreeSet<UserId> {
        names
            .iter()
            .filter_map(|name| {
                let resolved = self.directory.resolve_by_name(name);
                if resolved.is_none() {
                    tracing::debug!(admin = %name, "Dropping unresolvable administrator name");
                }
                resolved
            })
            .filter(|id| !self.directory.is_anonymous(*id))
            .collect()
    }

    /// Bring the stored administrators of `id` in line with `space`'s list.
    ///
    /// `previous_key` is the key the space was stored under before this
    /// change. When it differs from `space.key()`, the old space group is
    /// stripped from removed administrators and moved to the new name for
    /// the remaining ones.
    pub fn synchronize(
        &self,
        tx: &StoreTx<'_>,
        id: SpaceId,
        space: &Space,
        previous_key: &str,
    ) -> RegistryResult<SyncReport> {
        let target = self.resolve_targets(space.administrators());
        let previous: BTreeSet<UserId> = tx.admin_ids(id)?.into_iter().collect();
        let removed: BTreeSet<UserId> = previous.difference(&target).copied().collect();

        let mut group_changes = Vec::new();
        if self.auto_group_sync {
            let space_group = AdminGroupPolicy::space_group(space.key());
            let retired_group =
                (previous_key != space.key()).then(|| AdminGroupPolicy::space_group(previous_key));

            let mut space_groups = vec![space_group.as_str()];
            space_groups.extend(retired_group.as_deref());

            for user in &removed {
                if let Some(change) = self.revoke_groups(*user, &space_groups, space.key())? {
                    group_changes.push(change);
                }
            }
            for user in &target {
                let granted = self.grant_groups(*user, &space_group, retired_group.as_deref(), space.key())?;
                if let Some(change) = granted {
                    group_changes.push(change);
                }
            }
        }

        let admins: Vec<UserId> = target.iter().copied().collect();
        tx.replace_admins(id, &admins)?;

        tracing::debug!(
            space_id = %id,
            admins = admins.len(),
            removed = removed.len(),
            group_changes = group_changes.len(),
            "Synchronized space administrators"
        );

        Ok(SyncReport { target, removed, group_changes })
    }

    fn revoke_groups(
        &self,
        user_id: UserId,
        space_groups: &[&str],
        key: &str,
    ) -> RegistryResult<Option<GroupChange>> {
        let Some(user) = self.directory.resolve_by_id(user_id) else {
            tracing::warn!(user_id = %user_id, "Skipping group removal for unknown account");
            return Ok(None);
        };

        let current = self.groups.groups(user.id);

        // Another space's admin group keeps the shared role in place
        let still_admin_elsewhere = current.iter().any(|group| {
            group != AdminGroupPolicy::SHARED_GROUP
                && !space_groups.contains(&group.as_str())
                && AdminGroupPolicy::is_space_admin_group(group)
        });

        let mut candidates = space_groups.to_vec();
        if !still_admin_elsewhere {
            candidates.push(AdminGroupPolicy::SHARED_GROUP);
        }

        let to_remove: Vec<&str> =
            candidates.into_iter().filter(|group| current.contains(*group)).collect();
        if to_remove.is_empty() {
            return Ok(None);
        }

        for group in &to_remove {
            self.groups.remove_from_group(user.id, group)?;
        }
        crate::metrics::record_counter(crate::metrics::ADMIN_GROUPS_REMOVED, to_remove.len() as u64);

        let new_groups = current.iter().filter(|g| !to_remove.contains(&g.as_str())).cloned().collect();
        let change = GroupChange {
            user: user.id,
            old_groups: current,
            new_groups,
            reason: format!("Removed as administrator of space {}", key),
        };
        self.listener.groups_changed(&change);

        tracing::info!(user = %user.name, space = %key, "Revoked space administrator groups");
        Ok(Some(change))
    }

    fn grant_groups(
        &self,
        user: UserId,
        space_group: &str,
        retired_group: Option<&str>,
        key: &str,
    ) -> RegistryResult<Option<GroupChange>> {
        let current = self.groups.groups(user);

        let to_add: Vec<&str> = [space_group, AdminGroupPolicy::SHARED_GROUP]
            .into_iter()
            .filter(|group| !current.contains(*group))
            .collect();
        let to_drop: Vec<&str> = retired_group.into_iter().filter(|group| current.contains(*group)).collect();
        if to_add.is_empty() && to_drop.is_empty() {
            return Ok(None);
        }

        for group in &to_drop {
            self.groups.remove_from_group(user, group)?;
        }
        for group in &to_add {
            self.groups.add_to_group(user, group)?;
        }
        if !to_drop.is_empty() {
            crate::metrics::record_counter(crate::metrics::ADMIN_GROUPS_REMOVED, to_drop.len() as u64);
        }
        if !to_add.is_empty() {
            crate::metrics::record_counter(crate::metrics::ADMIN_GROUPS_ADDED, to_add.len() as u64);
        }

        let mut new_groups: BTreeSet<String> =
            current.iter().filter(|g| !to_drop.contains(&g.as_str())).cloned().collect();
        new_groups.extend(to_add.iter().map(|g| g.to_string()));
        let reason = if to_drop.is_empty() {
            format!("Added as administrator of space {}", key)
        } else {
            format!("Administrator group moved to renamed space {}", key)
        };
        let change = GroupChange { user, old_groups: current, new_groups, reason };
        self.listener.groups_changed(&change);

        tracing::info!(user_id = %user, space = %key, "Granted space administrator groups");
        Ok(Some(change))
    }
}
