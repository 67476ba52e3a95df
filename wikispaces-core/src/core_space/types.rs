//! Identifier and value types shared across the namespace registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lowest identifier handed out to a newly allocated space
pub const MIN_SPACE_ID: i64 = 50_000;

/// Numeric namespace identifier.
///
/// Spaces always occupy even identifiers; the odd successor is the implicit
/// talk namespace and is never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub i64);

impl SpaceId {
    /// Wrap a raw identifier
    pub fn new(id: i64) -> Self {
        SpaceId(id)
    }

    /// Raw integer value
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Identifier of the paired talk namespace
    pub fn talk_id(&self) -> SpaceId {
        SpaceId(self.0 + 1)
    }

    pub fn is_even(&self) -> bool {
        self.0 % 2 == 0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SpaceId {
    fn from(id: i64) -> Self {
        SpaceId(id)
    }
}

/// Numeric user account identifier; `0` is the anonymous identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    pub const ANONYMOUS: UserId = UserId(0);

    pub fn new(id: i64) -> Self {
        UserId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved user account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Display name, also used as the key in administrator lists
    pub name: String,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// An anonymous visitor, identified only by a name (usually an address)
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self { id: UserId::ANONYMOUS, name: name.into() }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_anonymous()
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
