//! Identifier allocation for new spaces

use super::errors::RegistryResult;
use super::storage::StoreTx;
use super::types::{SpaceId, MIN_SPACE_ID};

/// Hands out the next unused even identifier.
///
/// Allocation reads the stored maximum, so it must run inside the same
/// [`StoreTx`] as the insert that consumes the id. The immediate transaction
/// serializes concurrent allocations.
#[derive(Debug, Clone, Copy)]
pub struct IdAllocator {
    floor: i64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { floor: MIN_SPACE_ID }
    }

    /// Allocator with a custom lowest id; odd floors are rounded up
    pub fn with_floor(floor: i64) -> Self {
        Self { floor: floor + floor.rem_euclid(2) }
    }

    /// Next id given the current stored maximum
    pub fn next_after(&self, max: Option<SpaceId>) -> SpaceId {
        match max {
            None => SpaceId(self.floor),
            // +2 keeps the odd successor free for the talk namespace
            Some(max) => SpaceId((max.as_i64() + 2).max(self.floor)),
        }
    }

    pub fn next_id(&self, tx: &StoreTx<'_>) -> RegistryResult<SpaceId> {
        Ok(self.next_after(tx.max_space_id()?))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::space::Space;
    use crate::core_space::storage::SpaceSqlStore;
    use crate::core_space::types::{Timestamp, User, UserId};

    #[test]
    fn test_empty_store_starts_at_floor() {
        assert_eq!(IdAllocator::new().next_after(None), SpaceId(MIN_SPACE_ID));
    }

    #[test]
    fn test_next_after_skips_talk_id() {
        let allocator = IdAllocator::new();
        assert_eq!(allocator.next_after(Some(SpaceId(50_000))), SpaceId(50_002));
        assert_eq!(allocator.next_after(Some(SpaceId(50_010))), SpaceId(50_012));
    }

    #[test]
    fn test_custom_floor_is_even() {
        assert_eq!(IdAllocator::with_floor(3001).next_after(None), SpaceId(3002));
        assert_eq!(IdAllocator::with_floor(3000).next_after(None), SpaceId(3000));
    }

    #[test]
    fn test_next_id_reads_store() {
        let store = SpaceSqlStore::memory().unwrap();
        let allocator = IdAllocator::new();
        let owner = User::new(UserId(1), "Alice");

        for (expected, key) in [(50_000, "Alpha"), (50_002, "Beta"), (50_004, "Gamma")] {
            let space = Space::from_values(key, key, "desc", owner.clone()).unwrap();
            let id = store
                .transaction(|tx| {
                    let id = allocator.next_id(tx)?;
                    tx.insert_space(id, &space, Timestamp::now())?;
                    Ok(id)
                })
                .unwrap();
            assert_eq!(id, SpaceId(expected));
        }
    }
}
