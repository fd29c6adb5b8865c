//! Entity identifiers and allocation.
//!
//! An [`EntityId`] is a 64-bit handle that packs a *generation* counter in the
//! high 32 bits and an *index* in the low 32 bits. Removing an entity bumps the
//! generation of its slot, so an identifier held past removal can never alias
//! the entity that later reuses the slot.

use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct an `EntityId` from an index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`EntityId`]s with generational tracking.
///
/// Free indices are kept in a FIFO queue so that a slot is reused as late as
/// possible, which keeps stale identifiers distinguishable for longer even
/// before the generation check kicks in.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Current generation for each index slot.
    generations: Vec<u32>,
    /// Whether the slot is currently alive.
    alive: Vec<bool>,
    /// Free-list of recyclable indices (FIFO queue).
    free_indices: VecDeque<u32>,
    /// Number of live slots.
    alive_count: usize,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh [`EntityId`].
    ///
    /// A recycled index comes back with the generation that was bumped when
    /// it was freed.
    pub fn allocate(&mut self) -> EntityId {
        self.alive_count += 1;
        if let Some(index) = self.free_indices.pop_front() {
            self.alive[index as usize] = true;
            EntityId::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.alive.push(true);
            EntityId::new(index, 0)
        }
    }

    /// Free an entity's slot, bumping its generation so every outstanding
    /// handle becomes stale.
    ///
    /// A slot whose generation is exhausted is retired instead of recycled,
    /// since wrapping would revive handles from its first occupant.
    ///
    /// Returns `false` if the entity was already dead or the handle is stale.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let idx = id.index() as usize;
        self.alive[idx] = false;
        if let Some(next) = self.generations[idx].checked_add(1) {
            self.generations[idx] = next;
            self.free_indices.push_back(id.index());
        }
        self.alive_count -= 1;
        true
    }

    /// Returns `true` if `id` refers to a currently alive entity whose
    /// generation matches the allocator's current generation for that index.
    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index() as usize;
        idx < self.generations.len() && self.alive[idx] && self.generations[idx] == id.generation()
    }

    /// Total number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Iterate all live entities in index order.
    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, &alive)| alive)
            .map(|(idx, _)| EntityId::new(idx as u32, self.generations[idx]))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<EntityId> = (0..100).map(|_| alloc.allocate()).collect();
        let mut indices: Vec<u32> = ids.iter().map(|id| id.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 100);
    }

    #[test]
    fn generation_increments_on_recycle() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert_eq!(e0.generation(), 0);
        assert!(alloc.deallocate(e0));
        let e1 = alloc.allocate();
        assert_eq!(e1.index(), e0.index());
        assert_eq!(e1.generation(), 1);
        assert_ne!(e0, e1);
    }

    #[test]
    fn stale_id_stays_dead_after_recycle() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert!(alloc.deallocate(e0));
        let e1 = alloc.allocate();
        assert!(!alloc.is_alive(e0));
        assert!(alloc.is_alive(e1));
        assert!(!alloc.deallocate(e0), "stale handle must not free the new occupant");
        assert!(alloc.is_alive(e1));
    }

    #[test]
    fn free_list_is_fifo() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        alloc.deallocate(a);
        alloc.deallocate(b);
        assert_eq!(alloc.allocate().index(), a.index());
        assert_eq!(alloc.allocate().index(), b.index());
    }

    #[test]
    fn double_deallocate_returns_false() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.deallocate(e));
        assert!(!alloc.deallocate(e));
    }

    #[test]
    fn alive_count_and_iteration_track_correctly() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        assert_eq!(alloc.alive_count(), 3);
        alloc.deallocate(e1);
        assert_eq!(alloc.alive_count(), 2);
        assert_eq!(alloc.iter_alive().collect::<Vec<_>>(), vec![e0, e2]);
    }

    #[test]
    fn entity_id_roundtrip() {
        let id = EntityId::new(42, 7);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 7);
        assert_eq!(format!("{id}"), "42v7");
    }

    #[test]
    fn exhausted_generation_retires_the_slot() {
        let mut alloc = EntityAllocator::new();
        alloc.allocate();
        alloc.generations[0] = u32::MAX;
        let last = EntityId::new(0, u32::MAX);
        assert!(alloc.is_alive(last));

        assert!(alloc.deallocate(last));
        assert!(!alloc.is_alive(last));
        assert!(!alloc.is_alive(EntityId::new(0, 0)));
        assert_eq!(alloc.alive_count(), 0);

        let next = alloc.allocate();
        assert_eq!(next.index(), 1);
        assert_eq!(next.generation(), 0);
        assert!(!alloc.is_alive(last));
        assert_eq!(alloc.iter_alive().collect::<Vec<_>>(), vec![next]);
    }
}
