//! Two-phase audit log for space lifecycle events
//!
//! An entry is inserted as *pending* before the store mutation it describes
//! and marked *published* only after every side effect succeeded. A pending
//! entry left behind by a failure reads as "recorded but not confirmed".

use super::errors::{RegistryError, RegistryResult};
use super::space::{Space, SpaceSnapshot};
use super::storage::SqlitePool;
use super::types::{SpaceId, Timestamp, User};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Create,
    Update,
    Archive,
    Unarchive,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Create => "create",
            AuditKind::Update => "update",
            AuditKind::Archive => "archive",
            AuditKind::Unarchive => "unarchive",
        }
    }
}

/// Handle of an inserted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuditEntryId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Pending,
    Published,
}

impl AuditStatus {
    fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Published => "published",
        }
    }
}

/// One lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    /// Unknown for a creation until the id has been allocated
    pub space_id: Option<SpaceId>,
    /// Display name of the acting user
    pub actor: String,
    pub before: Option<SpaceSnapshot>,
    pub after: Option<SpaceSnapshot>,
}

impl AuditEvent {
    pub fn created(actor: &User, space: &Space) -> Self {
        Self {
            kind: AuditKind::Create,
            space_id: space.try_id(),
            actor: actor.name.clone(),
            before: None,
            after: Some(space.snapshot()),
        }
    }

    pub fn updated(actor: &User, old: &Space, new: &Space) -> Self {
        Self {
            kind: AuditKind::Update,
            space_id: old.try_id(),
            actor: actor.name.clone(),
            before: Some(old.snapshot()),
            after: Some(new.snapshot()),
        }
    }

    pub fn archived(actor: &User, space: &Space) -> Self {
        Self::status_change(AuditKind::Archive, actor, space)
    }

    pub fn unarchived(actor: &User, space: &Space) -> Self {
        Self::status_change(AuditKind::Unarchive, actor, space)
    }

    fn status_change(kind: AuditKind, actor: &User, space: &Space) -> Self {
        Self {
            kind,
            space_id: space.try_id(),
            actor: actor.name.clone(),
            before: None,
            after: Some(space.snapshot()),
        }
    }

    pub fn with_space_id(mut self, id: SpaceId) -> Self {
        self.space_id = Some(id);
        self
    }
}

/// Audit log sink
pub trait AuditLog: Send + Sync {
    /// Record a pending entry, before the mutation it describes
    fn insert(&self, event: &AuditEvent) -> RegistryResult<AuditEntryId>;

    /// Confirm an entry once the mutation and its side effects succeeded
    fn publish(&self, entry: AuditEntryId, event: &AuditEvent) -> RegistryResult<()>;
}

/// An entry as kept by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub entry: AuditEntryId,
    pub event: AuditEvent,
    pub status: AuditStatus,
}

/// Audit log stored in the `namespace_audit_log` table
pub struct SqlAuditLog {
    pool: SqlitePool,
}

impl SqlAuditLog {
    /// The pool must point at a database migrated by `SpaceSqlStore`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All entries, oldest first
    pub fn records(&self) -> RegistryResult<Vec<AuditRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare("SELECT entry_id, payload, status FROM namespace_audit_log ORDER BY entry_id")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(entry, payload, status)| -> RegistryResult<AuditRecord> {
                Ok(AuditRecord {
                    entry: AuditEntryId(entry),
                    event: serde_json::from_str(&payload)?,
                    status: parse_status(&status)?,
                })
            })
            .collect()
    }

    pub fn status(&self, entry: AuditEntryId) -> RegistryResult<Option<AuditStatus>> {
        let conn = self.pool.get()?;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM namespace_audit_log WHERE entry_id = ?",
                params![entry.0],
                |row| row.get(0),
            )
            .optional()?;
        status.as_deref().map(parse_status).transpose()
    }
}

impl AuditLog for SqlAuditLog {
    fn insert(&self, event: &AuditEvent) -> RegistryResult<AuditEntryId> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO namespace_audit_log (kind, namespace_id, actor, payload, status, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                event.kind.as_str(),
                event.space_id.map(|id| id.as_i64()),
                &event.actor,
                serde_json::to_string(event)?,
                AuditStatus::Pending.as_str(),
                Timestamp::now().as_millis() as i64,
            ],
        )?;
        Ok(AuditEntryId(conn.last_insert_rowid()))
    }

    fn publish(&self, entry: AuditEntryId, event: &AuditEvent) -> RegistryResult<()> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE namespace_audit_log
             SET namespace_id = ?, payload = ?, status = ?, published_at = ?
             WHERE entry_id = ?",
            params![
                event.space_id.map(|id| id.as_i64()),
                serde_json::to_string(event)?,
                AuditStatus::Published.as_str(),
                Timestamp::now().as_millis() as i64,
                entry.0,
            ],
        )?;

        if changed == 0 {
            return Err(RegistryError::Audit(format!("unknown audit entry {}", entry.0)));
        }
        Ok(())
    }
}

fn parse_status(status: &str) -> RegistryResult<AuditStatus> {
    match status {
        "pending" => Ok(AuditStatus::Pending),
        "published" => Ok(AuditStatus::Published),
        other => Err(RegistryError::Audit(format!("unknown audit status '{}'", other))),
    }
}

/// In-memory audit log
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditLog for MemoryAuditLog {
    fn insert(&self, event: &AuditEvent) -> RegistryResult<AuditEntryId> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let entry = AuditEntryId(records.len() as i64 + 1);
        records.push(AuditRecord { entry, event: event.clone(), status: AuditStatus::Pending });
        Ok(entry)
    }

    fn publish(&self, entry: AuditEntryId, event: &AuditEvent) -> RegistryResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .iter_mut()
            .find(|r| r.entry == entry)
            .ok_or_else(|| RegistryError::Audit(format!("unknown audit entry {}", entry.0)))?;
        record.event = event.clone();
        record.status = AuditStatus::Published;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::storage::SpaceSqlStore;
    use crate::core_space::types::UserId;

    fn legal() -> Space {
        Space::from_values("Legal", "Legal Affairs", "desc", User::new(UserId(1), "Alice")).unwrap()
    }

    #[test]
    fn test_event_serializes_with_lowercase_kind() {
        let event = AuditEvent::created(&User::new(UserId(1), "Alice"), &legal());
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"kind\":\"create\""));
        assert_eq!(serde_json::from_str::<AuditEvent>(&json).unwrap(), event);
    }

    #[test]
    fn test_update_event_carries_both_snapshots() {
        let old = legal();
        let mut new = old.clone();
        new.set_protected(true);

        let event = AuditEvent::updated(&User::new(UserId(2), "Bob"), &old, &new);
        assert_eq!(event.kind, AuditKind::Update);
        assert!(!event.before.as_ref().unwrap().protected);
        assert!(event.after.as_ref().unwrap().protected);
        assert_eq!(event.actor, "Bob");
    }

    #[test]
    fn test_sql_log_two_phase() {
        let store = SpaceSqlStore::memory().unwrap();
        let log = SqlAuditLog::new(store.primary().clone());
        let event = AuditEvent::created(&User::new(UserId(1), "Alice"), &legal());

        let entry = log.insert(&event).unwrap();
        assert_eq!(log.status(entry).unwrap(), Some(AuditStatus::Pending));

        let confirmed = event.with_space_id(SpaceId(50_000));
        log.publish(entry, &confirmed).unwrap();

        let records = log.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Published);
        assert_eq!(records[0].event.space_id, Some(SpaceId(50_000)));
    }

    #[test]
    fn test_publish_unknown_entry_fails() {
        let store = SpaceSqlStore::memory().unwrap();
        let log = SqlAuditLog::new(store.primary().clone());
        let event = AuditEvent::archived(&User::new(UserId(1), "Alice"), &legal());

        assert!(matches!(log.publish(AuditEntryId(99), &event), Err(RegistryError::Audit(_))));
        assert_eq!(log.status(AuditEntryId(99)).unwrap(), None);
    }

    #[test]
    fn test_memory_log_two_phase() {
        let log = MemoryAuditLog::new();
        let event = AuditEvent::unarchived(&User::new(UserId(1), "Alice"), &legal());

        let entry = log.insert(&event).unwrap();
        assert_eq!(log.records()[0].status, AuditStatus::Pending);

        log.publish(entry, &event).unwrap();
        assert_eq!(log.records()[0].status, AuditStatus::Published);
        assert_eq!(log.records()[0].event.kind, AuditKind::Unarchive);
    }
}
