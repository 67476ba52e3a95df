//! Database migrations for the namespace registry
//!
//! Provides versioned migrations per store engine. Each migration is applied
//! atomically and tracked in the `namespace_schema_version` table.

use super::super::errors::{RegistryError, RegistryResult};
use super::super::types::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::fmt;
use std::str::FromStr;

/// Current schema version for the SQLite engine
pub const CURRENT_NAMESPACE_SCHEMA_VERSION: i32 = 2;

/// Relational engines the registry knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Postgres,
    Mysql,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Postgres => "postgres",
            StoreBackend::Mysql => "mysql",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(StoreBackend::Sqlite),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "mysql" | "mariadb" => Ok(StoreBackend::Mysql),
            other => Err(RegistryError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All migrations shipped for `backend`, in order
///
/// Only SQLite has a schema; any other engine cannot be bootstrapped.
pub fn get_migrations(backend: StoreBackend) -> RegistryResult<Vec<Migration>> {
    match backend {
        StoreBackend::Sqlite => Ok(sqlite_migrations()),
        other => Err(RegistryError::UnsupportedBackend(format!(
            "no schema file for store engine '{}'",
            other
        ))),
    }
}

fn sqlite_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Namespaces and namespace administrators",
            up_sql: r#"
                -- Spaces; ids are even, the odd successor is the talk namespace
                CREATE TABLE IF NOT EXISTS namespaces (
                    namespace_id INTEGER PRIMARY KEY CHECK (namespace_id % 2 = 0),
                    namespace_key TEXT NOT NULL UNIQUE,
                    namespace_name TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL,
                    creator_id INTEGER NOT NULL,
                    created_on INTEGER NOT NULL,
                    archived INTEGER NOT NULL DEFAULT 0,
                    protected INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_namespaces_archived ON namespaces(archived);

                -- Administrator associations, rewritten as a whole on every sync
                CREATE TABLE IF NOT EXISTS namespace_admins (
                    namespace_id INTEGER NOT NULL,
                    admin_user_id INTEGER NOT NULL,
                    FOREIGN KEY (namespace_id) REFERENCES namespaces(namespace_id)
                );

                CREATE INDEX IF NOT EXISTS idx_namespace_admins_namespace
                    ON namespace_admins(namespace_id);
                CREATE INDEX IF NOT EXISTS idx_namespace_admins_user
                    ON namespace_admins(admin_user_id);
            "#,
        },
        Migration {
            version: 2,
            description: "Two-phase audit log",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS namespace_audit_log (
                    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL CHECK(kind IN ('create', 'update', 'archive', 'unarchive')),
                    namespace_id INTEGER,
                    actor TEXT NOT NULL,
                    payload TEXT NOT NULL,              -- JSON encoded AuditEvent
                    status TEXT NOT NULL CHECK(status IN ('pending', 'published')),
                    recorded_at INTEGER NOT NULL,
                    published_at INTEGER
                );

                CREATE INDEX IF NOT EXISTS idx_audit_pending
                    ON namespace_audit_log(status) WHERE status = 'pending';
            "#,
        },
    ]
}

/// Get current schema version from database
fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> RegistryResult<i32> {
    let conn = pool.get()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS namespace_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM namespace_schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations for `backend`
pub fn migrate(pool: &Pool<SqliteConnectionManager>, backend: StoreBackend) -> RegistryResult<()> {
    let migrations = get_migrations(backend)?;
    let current_version = get_current_version(pool)?;

    let pending: Vec<_> = migrations.into_iter().filter(|m| m.version > current_version).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let mut conn = pool.get()?;

    for migration in pending {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO namespace_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis() as i64],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied namespace schema migration"
        );
    }

    Ok(())
}

/// Get the latest migration version available for `backend`
pub fn get_latest_version(backend: StoreBackend) -> RegistryResult<i32> {
    Ok(get_migrations(backend)?.iter().map(|m| m.version).max().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_pool() -> Pool<SqliteConnectionManager> {
        Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .expect("Failed to create pool")
    }

    #[test]
    fn test_initial_migration() {
        let pool = setup_test_pool();
        migrate(&pool, StoreBackend::Sqlite).expect("Migration failed");

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"namespaces".to_string()));
        assert!(tables.contains(&"namespace_admins".to_string()));
        assert!(tables.contains(&"namespace_audit_log".to_string()));
    }

    #[test]
    fn test_migration_version_tracking() {
        let pool = setup_test_pool();
        migrate(&pool, StoreBackend::Sqlite).expect("Migration failed");

        assert_eq!(get_current_version(&pool).unwrap(), CURRENT_NAMESPACE_SCHEMA_VERSION);
        assert_eq!(
            get_latest_version(StoreBackend::Sqlite).unwrap(),
            CURRENT_NAMESPACE_SCHEMA_VERSION
        );
    }

    #[test]
    fn test_idempotent_migrations() {
        let pool = setup_test_pool();

        migrate(&pool, StoreBackend::Sqlite).expect("First migration failed");
        migrate(&pool, StoreBackend::Sqlite).expect("Second migration failed");

        assert_eq!(get_current_version(&pool).unwrap(), CURRENT_NAMESPACE_SCHEMA_VERSION);
    }

    #[test]
    fn test_unsupported_backend_is_fatal() {
        let pool = setup_test_pool();

        let err = migrate(&pool, StoreBackend::Postgres).unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedBackend(_)));
        assert!(get_latest_version(StoreBackend::Mysql).is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!("postgresql".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert!(matches!(
            "oracle".parse::<StoreBackend>(),
            Err(RegistryError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_odd_identifiers_are_rejected_by_schema() {
        let pool = setup_test_pool();
        migrate(&pool, StoreBackend::Sqlite).unwrap();
        let conn = pool.get().unwrap();

        let result = conn.execute(
            "INSERT INTO namespaces (namespace_id, namespace_key, namespace_name, description, creator_id, created_on)
             VALUES (50001, 'Odd', 'Odd', 'd', 1, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
