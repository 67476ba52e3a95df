//! Persistent storage for the namespace registry

pub mod migrations;
pub mod sql_store;

pub use migrations::{StoreBackend, CURRENT_NAMESPACE_SCHEMA_VERSION};
pub use sql_store::{ReadRole, SpaceFilter, SpaceLookup, SpaceRow, SpaceSqlStore, SqlitePool, StoreTx};
