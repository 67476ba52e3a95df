//! Namespace repository: persistence and lifecycle transitions for spaces
//!
//! The repository owns no spaces. It is a facade over [`SpaceSqlStore`] plus
//! the configuration snapshot it was built with. Every mutation follows the
//! same audit discipline: the pending audit entry is written before the store
//! is touched and published only after all side effects succeeded.

use super::admin_sync::{AdminSynchronizer, SyncReport};
use super::allocator::IdAllocator;
use super::audit::{AuditEvent, AuditLog};
use super::collaborators::{GroupMembership, PermissionGate, SpaceListener, UserDirectory};
use super::errors::{RegistryError, RegistryResult};
use super::space::{normalize_key, Space};
use super::storage::{ReadRole, SpaceFilter, SpaceLookup, SpaceRow, SpaceSqlStore};
use super::types::{SpaceId, Timestamp, User, UserId};
use crate::config::SpacesConfig;
use crate::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The acting user of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: User,
}

impl RequestContext {
    pub fn new(actor: User) -> Self {
        Self { actor }
    }
}

/// External services the repository calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn UserDirectory>,
    pub groups: Arc<dyn GroupMembership>,
    pub permissions: Arc<dyn PermissionGate>,
    pub audit: Arc<dyn AuditLog>,
    pub listener: Arc<dyn SpaceListener>,
}

/// Registry of spaces backed by a SQL store
pub struct NamespaceRepository {
    store: SpaceSqlStore,
    config: SpacesConfig,
    collaborators: Collaborators,
    allocator: IdAllocator,
}

impl NamespaceRepository {
    pub fn new(store: SpaceSqlStore, config: SpacesConfig, collaborators: Collaborators) -> Self {
        Self { store, config, collaborators, allocator: IdAllocator::new() }
    }

    pub fn with_allocator(mut self, allocator: IdAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn store(&self) -> &SpaceSqlStore {
        &self.store
    }

    pub fn config(&self) -> &SpacesConfig {
        &self.config
    }

    /// Space keys by id, filtered by archived state.
    ///
    /// Returns an empty map while the schema has not been created yet.
    pub fn list_all(&self, filter: SpaceFilter) -> RegistryResult<BTreeMap<SpaceId, String>> {
        Ok(self.store.list_spaces(filter)?.into_iter().map(|row| (row.id, row.key)).collect())
    }

    pub fn list_active(&self) -> RegistryResult<BTreeMap<SpaceId, String>> {
        self.list_all(SpaceFilter::Active)
    }

    pub fn list_archived(&self) -> RegistryResult<BTreeMap<SpaceId, String>> {
        self.list_all(SpaceFilter::Archived)
    }

    /// Stored administrator ids of a space
    pub fn get_admins(&self, id: SpaceId) -> RegistryResult<Vec<UserId>> {
        self.store.admin_ids(ReadRole::Replica, id)
    }

    /// Spaces `user` administers, ordered by id.
    ///
    /// Spaces whose owner no longer resolves are left out of the listing;
    /// looking one up directly still fails with [`RegistryError::UnknownUser`].
    pub fn get_spaces_for_admin(&self, user: UserId) -> RegistryResult<Vec<Space>> {
        let mut spaces = Vec::new();
        for row in self.store.spaces_for_admin(user)? {
            let id = row.id;
            match self.materialize(ReadRole::Replica, row) {
                Ok(space) => spaces.push(space),
                Err(RegistryError::UnknownUser(owner)) => {
                    tracing::warn!(space_id = %id, owner = %owner, "Skipping space with unresolvable owner");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(spaces)
    }

    pub fn get_space(&self, id: SpaceId) -> RegistryResult<Option<Space>> {
        self.load(ReadRole::Replica, SpaceLookup::Id(id))
    }

    /// Look a space up by key; the key is normalized first
    pub fn get_space_by_key(&self, key: &str) -> RegistryResult<Option<Space>> {
        let Ok(key) = normalize_key(key) else {
            return Ok(None);
        };
        self.load(ReadRole::Replica, SpaceLookup::Key(&key))
    }

    pub fn get_space_by_name(&self, name: &str) -> RegistryResult<Option<Space>> {
        self.load(ReadRole::Replica, SpaceLookup::Name(name))
    }

    /// Id to name table of every namespace the registry knows an id for.
    ///
    /// Extension namespaces come from configuration; each space contributes
    /// its key and its talk namespace as `<Key>_talk`.
    pub fn namespace_names(&self) -> RegistryResult<BTreeMap<i64, String>> {
        let mut names: BTreeMap<i64, String> = self
            .config
            .extension_namespaces
            .iter()
            .map(|(name, id)| (*id, name.clone()))
            .collect();

        for row in self.store.list_spaces(SpaceFilter::All)? {
            names.insert(row.id.talk_id().as_i64(), format!("{}_talk", row.key));
            names.insert(row.id.as_i64(), row.key);
        }
        Ok(names)
    }

    /// Whether `key` can be given to a new space.
    ///
    /// Invalid keys are never available. Comparison against core, extension
    /// and existing space names ignores case.
    pub fn is_key_available(&self, key: &str) -> RegistryResult<bool> {
        let Ok(key) = normalize_key(key) else {
            return Ok(false);
        };
        let lowered = key.to_lowercase();

        let taken_by_config = self
            .config
            .core_namespaces
            .iter()
            .chain(self.config.extension_namespaces.keys())
            .any(|name| name.to_lowercase() == lowered);
        if taken_by_config {
            return Ok(false);
        }

        let spaces = self.store.list_spaces(SpaceFilter::All)?;
        Ok(!spaces.iter().any(|row| row.key.to_lowercase() == lowered))
    }

    pub fn is_name_available(&self, name: &str) -> RegistryResult<bool> {
        let spaces = self.store.list_spaces(SpaceFilter::All)?;
        Ok(!spaces.iter().any(|row| row.name == name))
    }

    /// Whether the actor may archive spaces at all
    pub fn can_archive(&self, ctx: &RequestContext) -> bool {
        Space::can_archive(self.config.archiving_enabled, &ctx.actor, &*self.collaborators.permissions)
    }

    /// Persist a transient space and return its allocated id.
    ///
    /// The listener sees the space before its administrators are fixed; the
    /// owner becomes the only administrator afterwards.
    pub fn create(&self, ctx: &RequestContext, space: &Space) -> RegistryResult<SpaceId> {
        if let Some(id) = space.try_id() {
            return Err(RegistryError::AlreadyExists(id));
        }

        let audit = &self.collaborators.audit;
        let entry = audit.insert(&AuditEvent::created(&ctx.actor, space))?;

        let timer = metrics::Timer::new(metrics::MUTATION_DURATION_MS);
        let id = self.store.transaction(|tx| {
            let id = self.allocator.next_id(tx)?;
            tx.insert_space(id, space, Timestamp::now())?;
            Ok(id)
        })?;
        timer.stop();

        let mut created = self
            .load(ReadRole::Primary, SpaceLookup::Id(id))?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        self.collaborators.listener.space_created(&created)?;

        created.set_administrators(vec![created.owner().name.clone()]);
        let report = self
            .store
            .transaction(|tx| self.synchronizer().synchronize(tx, id, &created, created.key()))?;

        audit.publish(entry, &AuditEvent::created(&ctx.actor, &created))?;
        metrics::record_counter(metrics::SPACES_CREATED, 1);

        tracing::info!(
            space_id = %id,
            key = %created.key(),
            owner = %created.owner(),
            admins = report.target.len(),
            "Created space"
        );
        Ok(id)
    }

    /// Write `new`'s attributes over the stored row of `old` and reconcile
    /// administrators.
    ///
    /// `force` skips the edit-permission check. With `log_enabled` unset no
    /// audit entry is written.
    pub fn update(
        &self,
        ctx: &RequestContext,
        old: Option<&Space>,
        new: &Space,
        force: bool,
        log_enabled: bool,
    ) -> RegistryResult<SyncReport> {
        let Some((old, id)) = old.and_then(|old| old.try_id().map(|id| (old, id))) else {
            return Err(RegistryError::NotFound(new.key().to_string()));
        };

        if !force && !new.can_edit(&ctx.actor, &*self.collaborators.permissions) {
            return Err(RegistryError::permission_denied(
                ctx.actor.name.clone(),
                format!("edit space {}", new.key()),
            ));
        }

        let pending = if log_enabled {
            let event = AuditEvent::updated(&ctx.actor, old, new);
            Some((self.collaborators.audit.insert(&event)?, event))
        } else {
            None
        };

        let timer = metrics::Timer::new(metrics::MUTATION_DURATION_MS);
        let report = self.store.transaction(|tx| {
            if tx.update_space(id, new)? == 0 {
                return Err(RegistryError::NotFound(id.to_string()));
            }
            self.synchronizer().synchronize(tx, id, new, old.key())
        })?;
        timer.stop();

        if let Some((entry, event)) = pending {
            self.collaborators.audit.publish(entry, &event)?;
        }
        metrics::record_counter(metrics::SPACES_UPDATED, 1);

        tracing::info!(
            space_id = %id,
            key = %new.key(),
            actor = %ctx.actor,
            forced = force,
            removed_admins = report.removed.len(),
            "Updated space"
        );
        Ok(report)
    }

    pub fn archive(&self, ctx: &RequestContext, space: &Space) -> RegistryResult<()> {
        self.set_archived(ctx, space, true)
    }

    pub fn unarchive(&self, ctx: &RequestContext, space: &Space) -> RegistryResult<()> {
        self.set_archived(ctx, space, false)
    }

    fn set_archived(&self, ctx: &RequestContext, space: &Space, archived: bool) -> RegistryResult<()> {
        let Some(id) = space.try_id() else {
            return Err(RegistryError::NotFound(space.key().to_string()));
        };

        let event = |s: &Space| {
            if archived {
                AuditEvent::archived(&ctx.actor, s)
            } else {
                AuditEvent::unarchived(&ctx.actor, s)
            }
        };

        let entry = self.collaborators.audit.insert(&event(space))?;

        let mut flipped = space.clone();
        flipped.set_archived(archived);
        self.update(ctx, Some(space), &flipped, false, false)?;

        self.collaborators.audit.publish(entry, &event(&flipped))?;

        if archived {
            metrics::record_counter(metrics::SPACES_ARCHIVED, 1);
            tracing::info!(space_id = %id, key = %space.key(), actor = %ctx.actor, "Archived space");
        } else {
            metrics::record_counter(metrics::SPACES_UNARCHIVED, 1);
            tracing::info!(space_id = %id, key = %space.key(), actor = %ctx.actor, "Unarchived space");
        }
        Ok(())
    }

    fn synchronizer(&self) -> AdminSynchronizer<'_> {
        AdminSynchronizer::new(
            &*self.collaborators.directory,
            &*self.collaborators.groups,
            &*self.collaborators.listener,
            self.config.auto_group_sync,
        )
    }

    fn load(&self, role: ReadRole, lookup: SpaceLookup<'_>) -> RegistryResult<Option<Space>> {
        self.store
            .find_space(role, lookup)?
            .map(|row| self.materialize(role, row))
            .transpose()
    }

    /// Build a [`Space`] from a row, resolving owner and administrator names
    fn materialize(&self, role: ReadRole, row: SpaceRow) -> RegistryResult<Space> {
        let directory = &self.collaborators.directory;
        let owner = directory
            .resolve_by_id(row.creator_id)
            .ok_or(RegistryError::UnknownUser(row.creator_id))?;

        let administrators = self
            .store
            .admin_ids(role, row.id)?
            .into_iter()
            .filter_map(|admin| directory.resolve_by_id(admin).map(|user| user.name))
            .collect();

        Ok(Space::from_stored(
            row.id,
            row.key,
            row.name,
            row.description,
            owner,
            administrators,
            row.archived,
            row.protected,
            row.created_on,
        )?)
    }
}
