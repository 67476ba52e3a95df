//! SQL-based storage for namespaces and their administrator associations

use super::super::errors::{is_missing_table, RegistryResult};
use super::super::space::Space;
use super::super::types::{SpaceId, Timestamp, UserId};
use super::migrations::{self, StoreBackend};
use crate::config::StoreConfig;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::time::Duration;

pub type SqlitePool = Pool<SqliteConnectionManager>;

const SPACE_COLUMNS: &str = "namespace_id, namespace_key, namespace_name, description, \
                             creator_id, created_on, archived, protected";

/// A `namespaces` row as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRow {
    pub id: SpaceId,
    pub key: String,
    pub name: String,
    pub description: String,
    pub creator_id: UserId,
    pub created_on: Timestamp,
    pub archived: bool,
    pub protected: bool,
}

impl SpaceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SpaceRow {
            id: SpaceId(row.get(0)?),
            key: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            creator_id: UserId(row.get(4)?),
            created_on: Timestamp::from_millis(row.get::<_, i64>(5)?.max(0) as u64),
            archived: row.get(6)?,
            protected: row.get(7)?,
        })
    }
}

/// Which archived states a listing includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceFilter {
    All,
    Active,
    Archived,
}

impl SpaceFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            SpaceFilter::All => "",
            SpaceFilter::Active => "WHERE archived = 0",
            SpaceFilter::Archived => "WHERE archived = 1",
        }
    }
}

/// How a single space is looked up
#[derive(Debug, Clone, Copy)]
pub enum SpaceLookup<'a> {
    Id(SpaceId),
    Key(&'a str),
    Name(&'a str),
}

/// Which pool serves a read.
///
/// Reads that must observe a write just made (reloads after create) go to the
/// primary; listings may be served by a lagging replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRole {
    Primary,
    Replica,
}

/// SQL-based storage for namespaces
pub struct SpaceSqlStore {
    primary: SqlitePool,
    replica: SqlitePool,
}

impl SpaceSqlStore {
    /// Create a store over `pool`, running the SQLite migrations
    pub fn new(pool: SqlitePool) -> RegistryResult<Self> {
        Self::with_backend(pool, StoreBackend::Sqlite)
    }

    /// Create a store, bootstrapping the schema for `backend`
    pub fn with_backend(pool: SqlitePool, backend: StoreBackend) -> RegistryResult<Self> {
        migrations::migrate(&pool, backend)?;

        Ok(Self { replica: pool.clone(), primary: pool })
    }

    /// Serve listings and lookups from a separate read replica
    pub fn with_replica(mut self, replica: SqlitePool) -> Self {
        self.replica = replica;
        self
    }

    /// Open the database described by the store configuration
    pub fn open(config: &StoreConfig) -> RegistryResult<Self> {
        let backend: StoreBackend = config.backend.parse()?;
        let primary = build_pool(
            SqliteConnectionManager::file(&config.database_path),
            config.pool_size,
            config.connection_timeout,
        )?;
        let store = Self::with_backend(primary, backend)?;

        match &config.replica_path {
            Some(path) => {
                let replica = build_pool(
                    SqliteConnectionManager::file(path),
                    config.pool_size,
                    config.connection_timeout,
                )?;
                Ok(store.with_replica(replica))
            }
            None => Ok(store),
        }
    }

    /// In-memory store backed by a single shared connection
    pub fn memory() -> RegistryResult<Self> {
        let pool = build_pool(SqliteConnectionManager::memory(), 1, Duration::from_secs(5))?;
        Self::new(pool)
    }

    /// Pool used for writes; shared with the SQL audit log
    pub fn primary(&self) -> &SqlitePool {
        &self.primary
    }

    fn pool(&self, role: ReadRole) -> &SqlitePool {
        match role {
            ReadRole::Primary => &self.primary,
            ReadRole::Replica => &self.replica,
        }
    }

    // ===== Reads =====

    /// List spaces ordered by id.
    ///
    /// Returns an empty list while the schema has not been created yet.
    pub fn list_spaces(&self, filter: SpaceFilter) -> RegistryResult<Vec<SpaceRow>> {
        let conn = self.replica.get()?;
        let sql = format!(
            "SELECT {} FROM namespaces {} ORDER BY namespace_id",
            SPACE_COLUMNS,
            filter.where_clause()
        );

        let mut stmt = match conn.prepare(&sql) {
            Ok(stmt) => stmt,
            Err(e) if is_missing_table(&e) => {
                tracing::warn!("Namespace table missing, listing no spaces");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let rows = stmt
            .query_map([], SpaceRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Look up a single space
    pub fn find_space(
        &self,
        role: ReadRole,
        lookup: SpaceLookup<'_>,
    ) -> RegistryResult<Option<SpaceRow>> {
        let conn = self.pool(role).get()?;
        query_space(&conn, lookup)
    }

    /// Administrator ids recorded for a space.
    ///
    /// Returns an empty list while the schema has not been created yet.
    pub fn admin_ids(&self, role: ReadRole, id: SpaceId) -> RegistryResult<Vec<UserId>> {
        let conn = self.pool(role).get()?;
        match query_admin_ids(&conn, id) {
            Err(e) if is_missing_table(&e) => {
                tracing::warn!(space_id = %id, "Namespace admin table missing, no admins");
                Ok(Vec::new())
            }
            other => Ok(other?),
        }
    }

    /// Spaces administered by `user`, ordered by id
    pub fn spaces_for_admin(&self, user: UserId) -> RegistryResult<Vec<SpaceRow>> {
        let conn = self.replica.get()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT n.namespace_id, n.namespace_key, n.namespace_name, n.description,
                    n.creator_id, n.created_on, n.archived, n.protected
             FROM namespace_admins a
             JOIN namespaces n ON n.namespace_id = a.namespace_id
             WHERE a.admin_user_id = ?
             ORDER BY n.namespace_id",
        )?;

        let rows = stmt
            .query_map(params![user.as_i64()], SpaceRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ===== Writes =====

    /// Run `f` inside one immediate transaction on the primary.
    ///
    /// The write lock is taken up front, so concurrent writers are serialized
    /// and a read-then-write inside `f` cannot interleave with another one.
    /// The transaction rolls back when `f` returns an error.
    pub fn transaction<T, F>(&self, f: F) -> RegistryResult<T>
    where
        F: FnOnce(&StoreTx<'_>) -> RegistryResult<T>,
    {
        let mut conn = self.primary.get()?;
        let tx = StoreTx { tx: conn.transaction_with_behavior(TransactionBehavior::Immediate)? };

        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Write access inside a store transaction
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTx<'_> {
    /// Largest stored namespace id, if any
    pub fn max_space_id(&self) -> RegistryResult<Option<SpaceId>> {
        let max: Option<i64> =
            self.tx.query_row("SELECT MAX(namespace_id) FROM namespaces", [], |row| row.get(0))?;
        Ok(max.map(SpaceId))
    }

    /// Insert a namespace row under an allocated id
    pub fn insert_space(&self, id: SpaceId, space: &Space, created_on: Timestamp) -> RegistryResult<()> {
        self.tx.execute(
            "INSERT INTO namespaces (namespace_id, namespace_key, namespace_name, description,
                                     creator_id, created_on, archived, protected)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id.as_i64(),
                space.key(),
                space.name(),
                space.description(),
                space.owner().id.as_i64(),
                created_on.as_millis() as i64,
                space.is_archived(),
                space.is_protected(),
            ],
        )?;
        Ok(())
    }

    /// Overwrite the mutable columns of row `id`; returns the number of rows changed
    pub fn update_space(&self, id: SpaceId, space: &Space) -> RegistryResult<usize> {
        let changed = self.tx.execute(
            "UPDATE namespaces
             SET namespace_key = ?, namespace_name = ?, description = ?, creator_id = ?,
                 archived = ?, protected = ?
             WHERE namespace_id = ?",
            params![
                space.key(),
                space.name(),
                space.description(),
                space.owner().id.as_i64(),
                space.is_archived(),
                space.is_protected(),
                id.as_i64(),
            ],
        )?;
        Ok(changed)
    }

    pub fn admin_ids(&self, id: SpaceId) -> RegistryResult<Vec<UserId>> {
        Ok(query_admin_ids(&self.tx, id)?)
    }

    /// Replace every association row of `id` with one row per admin
    pub fn replace_admins(&self, id: SpaceId, admins: &[UserId]) -> RegistryResult<()> {
        self.tx.execute("DELETE FROM namespace_admins WHERE namespace_id = ?", params![id.as_i64()])?;

        let mut stmt = self
            .tx
            .prepare("INSERT INTO namespace_admins (namespace_id, admin_user_id) VALUES (?, ?)")?;
        for admin in admins {
            stmt.execute(params![id.as_i64(), admin.as_i64()])?;
        }
        Ok(())
    }

    fn commit(self) -> RegistryResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn build_pool(
    manager: SqliteConnectionManager,
    size: u32,
    timeout: Duration,
) -> RegistryResult<SqlitePool> {
    let manager = manager.with_init(move |conn| {
        conn.busy_timeout(timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });

    Ok(Pool::builder().max_size(size.max(1)).connection_timeout(timeout).build(manager)?)
}

fn query_space(conn: &Connection, lookup: SpaceLookup<'_>) -> RegistryResult<Option<SpaceRow>> {
    let row = match lookup {
        SpaceLookup::Id(id) => conn
            .query_row(
                &format!("SELECT {} FROM namespaces WHERE namespace_id = ?", SPACE_COLUMNS),
                params![id.as_i64()],
                SpaceRow::from_row,
            )
            .optional()?,
        SpaceLookup::Key(key) => conn
            .query_row(
                &format!("SELECT {} FROM namespaces WHERE namespace_key = ?", SPACE_COLUMNS),
                params![key],
                SpaceRow::from_row,
            )
            .optional()?,
        SpaceLookup::Name(name) => conn
            .query_row(
                &format!("SELECT {} FROM namespaces WHERE namespace_name = ?", SPACE_COLUMNS),
                params![name],
                SpaceRow::from_row,
            )
            .optional()?,
    };
    Ok(row)
}

fn query_admin_ids(conn: &Connection, id: SpaceId) -> rusqlite::Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT admin_user_id FROM namespace_admins WHERE namespace_id = ? ORDER BY admin_user_id",
    )?;
    let ids = stmt
        .query_map(params![id.as_i64()], |row| Ok(UserId(row.get(0)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::types::User;

    fn space(key: &str) -> Space {
        Space::from_values(key, format!("{} space", key), "desc", User::new(UserId(1), "Alice"))
            .unwrap()
    }

    fn insert(store: &SpaceSqlStore, id: i64, key: &str) {
        store
            .transaction(|tx| tx.insert_space(SpaceId(id), &space(key), Timestamp::from_millis(10)))
            .unwrap();
    }

    #[test]
    fn test_insert_and_find_space() {
        let store = SpaceSqlStore::memory().unwrap();
        insert(&store, 50_000, "Legal");

        let row = store.find_space(ReadRole::Primary, SpaceLookup::Id(SpaceId(50_000))).unwrap().unwrap();
        assert_eq!(row.key, "Legal");
        assert_eq!(row.name, "Legal space");
        assert_eq!(row.creator_id, UserId(1));
        assert_eq!(row.created_on, Timestamp::from_millis(10));
        assert!(!row.archived);
        assert!(!row.protected);

        let by_key = store.find_space(ReadRole::Replica, SpaceLookup::Key("Legal")).unwrap();
        let by_name = store.find_space(ReadRole::Replica, SpaceLookup::Name("Legal space")).unwrap();
        assert_eq!(by_key, Some(row.clone()));
        assert_eq!(by_name, Some(row));
        assert!(store.find_space(ReadRole::Replica, SpaceLookup::Key("Nope")).unwrap().is_none());
    }

    #[test]
    fn test_list_spaces_filters_and_orders() {
        let store = SpaceSqlStore::memory().unwrap();
        insert(&store, 50_004, "Gamma");
        insert(&store, 50_000, "Alpha");
        insert(&store, 50_002, "Beta");

        let mut archived = space("Beta");
        archived.set_archived(true);
        store.transaction(|tx| tx.update_space(SpaceId(50_002), &archived)).unwrap();

        let all: Vec<_> = store.list_spaces(SpaceFilter::All).unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(all, vec!["Alpha", "Beta", "Gamma"]);

        let active: Vec<_> =
            store.list_spaces(SpaceFilter::Active).unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(active, vec!["Alpha", "Gamma"]);

        let archived: Vec<_> =
            store.list_spaces(SpaceFilter::Archived).unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(archived, vec!["Beta"]);
    }

    #[test]
    fn test_duplicate_key_is_a_conflict() {
        let store = SpaceSqlStore::memory().unwrap();
        insert(&store, 50_000, "Legal");

        let err = store
            .transaction(|tx| tx.insert_space(SpaceId(50_002), &space("Legal"), Timestamp::now()))
            .unwrap_err();
        assert!(matches!(err, crate::core_space::errors::RegistryError::Conflict(_)));
        assert_eq!(store.list_spaces(SpaceFilter::All).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_admins_overwrites_rows() {
        let store = SpaceSqlStore::memory().unwrap();
        insert(&store, 50_000, "Legal");

        store
            .transaction(|tx| tx.replace_admins(SpaceId(50_000), &[UserId(1), UserId(2)]))
            .unwrap();
        store.transaction(|tx| tx.replace_admins(SpaceId(50_000), &[UserId(3)])).unwrap();

        assert_eq!(store.admin_ids(ReadRole::Replica, SpaceId(50_000)).unwrap(), vec![UserId(3)]);
        let administered = store.spaces_for_admin(UserId(3)).unwrap();
        assert_eq!(administered.len(), 1);
        assert!(store.spaces_for_admin(UserId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = SpaceSqlStore::memory().unwrap();

        let result: RegistryResult<()> = store.transaction(|tx| {
            tx.insert_space(SpaceId(50_000), &space("Legal"), Timestamp::now())?;
            Err(crate::core_space::errors::RegistryError::Store("boom".to_string()))
        });

        assert!(result.is_err());
        assert!(store.list_spaces(SpaceFilter::All).unwrap().is_empty());
    }

    #[test]
    fn test_max_space_id() {
        let store = SpaceSqlStore::memory().unwrap();
        assert_eq!(store.transaction(|tx| tx.max_space_id()).unwrap(), None);

        insert(&store, 50_000, "Legal");
        insert(&store, 50_006, "Finance");
        assert_eq!(store.transaction(|tx| tx.max_space_id()).unwrap(), Some(SpaceId(50_006)));
    }

    #[test]
    fn test_reads_tolerate_missing_tables() {
        // A pool that never ran migrations, as during a bootstrap window
        let pool = build_pool(SqliteConnectionManager::memory(), 1, Duration::from_secs(1)).unwrap();
        let store = SpaceSqlStore { primary: pool.clone(), replica: pool };

        assert!(store.list_spaces(SpaceFilter::All).unwrap().is_empty());
        assert!(store.admin_ids(ReadRole::Replica, SpaceId(50_000)).unwrap().is_empty());
    }
}
