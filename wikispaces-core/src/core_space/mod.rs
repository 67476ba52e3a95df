//! Space registry
//!
//! Lifecycle of spaces: named namespace partitions with an owner, a set of
//! administrators and two status flags (archived, protected).
//!
//! ## Architecture
//!
//! - **Space**: validated entity, transient until the repository persists it
//! - **NamespaceRepository**: create / update / archive / lookup / listing
//! - **AdminSynchronizer**: reconciles administrators with stored rows and
//!   external group memberships
//! - **AuditLog**: two-phase (pending, published) lifecycle records
//!
//! ## Key Design Principles
//!
//! 1. Identifiers are even; `id + 1` is the implicit talk namespace
//! 2. Each mutation runs in one immediate store transaction
//! 3. Audit entries are inserted before and published after the mutation
//! 4. Collaborators (users, groups, permissions) are injected traits

pub mod admin_sync;
pub mod allocator;
pub mod audit;
pub mod collaborators;
pub mod errors;
pub mod repository;
pub mod space;
pub mod storage;
pub mod testing;
pub mod types;

pub use admin_sync::{AdminGroupPolicy, AdminSynchronizer, SyncReport};
pub use allocator::IdAllocator;
pub use audit::{
    AuditEntryId, AuditEvent, AuditKind, AuditLog, AuditRecord, AuditStatus, MemoryAuditLog,
    SqlAuditLog,
};
pub use collaborators::{
    Capability, GroupChange, GroupMembership, NoopListener, PermissionGate, SpaceListener,
    UserDirectory,
};
pub use errors::{RegistryError, RegistryResult};
pub use repository::{Collaborators, NamespaceRepository, RequestContext};
pub use space::{normalize_key, Space, SpaceSnapshot, ValidationError};
pub use storage::{ReadRole, SpaceFilter, SpaceLookup, SpaceSqlStore, StoreBackend};
pub use types::{SpaceId, Timestamp, User, UserId, MIN_SPACE_ID};
