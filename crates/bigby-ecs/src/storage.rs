//! Sparse-set storage shared by the component index and query caches.
//!
//! An [`EntitySet`] keeps its members in a dense vector (stable, cache-friendly
//! iteration) plus a hash map from entity to dense position (O(1) membership
//! and removal). Removal swaps the last member into the hole, so positions are
//! not stable across removals but insertion order is otherwise preserved.

use std::any::Any;
use std::collections::HashMap;

use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// EntitySet
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct EntitySet {
    dense: Vec<EntityId>,
    sparse: HashMap<EntityId, usize>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entity`. Returns `false` if it was already present.
    pub fn insert(&mut self, entity: EntityId) -> bool {
        if self.sparse.contains_key(&entity) {
            return false;
        }
        self.sparse.insert(entity, self.dense.len());
        self.dense.push(entity);
        true
    }

    /// Remove `entity`, returning the dense position it occupied.
    ///
    /// The previous last member now lives at that position.
    pub fn remove(&mut self, entity: EntityId) -> Option<usize> {
        let pos = self.sparse.remove(&entity)?;
        self.dense.swap_remove(pos);
        if let Some(&moved) = self.dense.get(pos) {
            self.sparse.insert(moved, pos);
        }
        Some(pos)
    }

    #[inline]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.sparse.contains_key(&entity)
    }

    #[inline]
    pub fn position(&self, entity: EntityId) -> Option<usize> {
        self.sparse.get(&entity).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[EntityId] {
        &self.dense
    }
}

// ---------------------------------------------------------------------------
// Column<T>
// ---------------------------------------------------------------------------

/// All values of one component type, keyed by entity.
///
/// `values[i]` belongs to `entities.as_slice()[i]`; both are swap-removed
/// together.
#[derive(Debug)]
pub struct Column<T> {
    entities: EntitySet,
    values: Vec<T>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self {
            entities: EntitySet::new(),
            values: Vec::new(),
        }
    }
}

impl<T: 'static> Column<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value for `entity`. Hands the value back if one is present.
    pub fn insert(&mut self, entity: EntityId, value: T) -> Result<(), T> {
        if !self.entities.insert(entity) {
            return Err(value);
        }
        self.values.push(value);
        Ok(())
    }

    /// Remove and return the value for `entity`.
    pub fn remove(&mut self, entity: EntityId) -> Option<T> {
        let pos = self.entities.remove(entity)?;
        Some(self.values.swap_remove(pos))
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.entities.position(entity).map(|pos| &self.values[pos])
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.entities
            .position(entity)
            .map(move |pos| &mut self.values[pos])
    }
}

// ---------------------------------------------------------------------------
// ErasedColumn
// ---------------------------------------------------------------------------

/// Object-safe view of a [`Column<T>`] used by the component index, which
/// stores columns of every type side by side.
pub trait ErasedColumn: Any {
    fn contains(&self, entity: EntityId) -> bool;
    fn len(&self) -> usize;
    fn entities(&self) -> &[EntityId];
    /// Insert a boxed value. Returns `false` (dropping the value) if the entity
    /// already has one or the box holds the wrong type.
    fn insert_boxed(&mut self, entity: EntityId, value: Box<dyn Any>) -> bool;
    /// Drop the value held for `entity`. Returns `false` if there was none.
    fn remove_entity(&mut self, entity: EntityId) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedColumn for Column<T> {
    fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn entities(&self) -> &[EntityId] {
        self.entities.as_slice()
    }

    fn insert_boxed(&mut self, entity: EntityId, value: Box<dyn Any>) -> bool {
        match value.downcast::<T>() {
            Ok(value) => self.insert(entity, *value).is_ok(),
            Err(_) => false,
        }
    }

    fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.remove(entity).is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Constructor for an empty column of `T`, stored next to type-erased values.
pub fn new_column<T: 'static>() -> Box<dyn ErasedColumn> {
    Box::new(Column::<T>::new())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn e(i: u32) -> EntityId {
        EntityId::new(i, 0)
    }

    #[test]
    fn entity_set_swap_remove_keeps_positions_consistent() {
        let mut set = EntitySet::new();
        for i in 0..4 {
            assert!(set.insert(e(i)));
        }
        assert!(!set.insert(e(2)));

        assert_eq!(set.remove(e(1)), Some(1));
        assert_eq!(set.as_slice(), &[e(0), e(3), e(2)]);
        assert_eq!(set.position(e(3)), Some(1));
        assert_eq!(set.remove(e(1)), None);

        // Removing the last element must not re-insert it.
        assert_eq!(set.remove(e(2)), Some(2));
        assert!(!set.contains(e(2)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn column_values_follow_their_entities() {
        let mut col = Column::new();
        col.insert(e(0), "a").unwrap();
        col.insert(e(1), "b").unwrap();
        col.insert(e(2), "c").unwrap();
        assert_eq!(col.insert(e(1), "dup"), Err("dup"));

        assert_eq!(col.remove(e(0)), Some("a"));
        assert_eq!(col.get(e(1)), Some(&"b"));
        assert_eq!(col.get(e(2)), Some(&"c"));
        assert_eq!(col.get(e(0)), None);

        *col.get_mut(e(2)).unwrap() = "z";
        assert_eq!(col.get(e(2)), Some(&"z"));
    }

    #[test]
    fn erased_insert_rejects_wrong_type() {
        let mut col = new_column::<u32>();
        assert!(!col.insert_boxed(e(0), Box::new("not a u32")));
        assert!(col.insert_boxed(e(0), Box::new(7u32)));
        assert!(!col.insert_boxed(e(0), Box::new(8u32)));
        assert_eq!(col.len(), 1);
        assert_eq!(
            col.as_any().downcast_ref::<Column<u32>>().unwrap().get(e(0)),
            Some(&7)
        );
        assert!(col.remove_entity(e(0)));
        assert!(!col.contains(e(0)));
    }
}
