//! Metrics for space lifecycle events
//!
//! Names are recorded through the `metrics` facade; without an installed
//! recorder every call is a no-op.

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const SPACES_CREATED: &str = "spaces.created";
pub const SPACES_UPDATED: &str = "spaces.updated";
pub const SPACES_ARCHIVED: &str = "spaces.archived";
pub const SPACES_UNARCHIVED: &str = "spaces.unarchived";
pub const ADMIN_GROUPS_ADDED: &str = "spaces.admin_groups.added";
pub const ADMIN_GROUPS_REMOVED: &str = "spaces.admin_groups.removed";
pub const MUTATION_DURATION_MS: &str = "spaces.mutation.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(SPACES_CREATED, "Number of spaces created");
    describe_counter!(SPACES_UPDATED, "Number of space updates, including archive transitions");
    describe_counter!(SPACES_ARCHIVED, "Number of spaces archived");
    describe_counter!(SPACES_UNARCHIVED, "Number of spaces unarchived");
    describe_counter!(ADMIN_GROUPS_ADDED, "Group memberships granted to space administrators");
    describe_counter!(ADMIN_GROUPS_REMOVED, "Group memberships revoked from former administrators");
    describe_histogram!(MUTATION_DURATION_MS, "Store transaction duration of a space mutation in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        init_metrics();
        record_counter(SPACES_CREATED, 1);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new(MUTATION_DURATION_MS);
        std::thread::sleep(std::time::Duration::from_millis(1));
        timer.stop();
    }

    #[test]
    fn test_counter_names_are_distinct() {
        let names = [
            SPACES_CREATED,
            SPACES_UPDATED,
            SPACES_ARCHIVED,
            SPACES_UNARCHIVED,
            ADMIN_GROUPS_ADDED,
            ADMIN_GROUPS_REMOVED,
        ];
        let unique: std::collections::BTreeSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
