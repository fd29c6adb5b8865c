//! The component index: for every component type, which entities hold it.
//!
//! Each registered type owns one [`Column`], which stores the component values
//! *and* serves as that type's membership set. Attaching or detaching a
//! component is a single column insert/remove, so "entity is in `index[T]`"
//! and "entity has a `T`" can never disagree.

use std::any::TypeId;

use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::EntityId;
use crate::storage::{new_column, Column, ErasedColumn};

#[derive(Default)]
pub struct ComponentIndex {
    registry: ComponentRegistry,
    /// Indexed by `ComponentTypeId.0`; one column per registered type.
    columns: Vec<Box<dyn ErasedColumn>>,
}

impl std::fmt::Debug for ComponentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentIndex")
            .field("types", &self.columns.len())
            .finish()
    }
}

impl ComponentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register `T` under `name` (no-op if already registered).
    ///
    /// # Panics
    ///
    /// Panics if `name` was explicitly registered for a different type.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        if let Some(id) = self.registry.lookup::<T>() {
            return id;
        }
        let id = self.registry.register::<T>(name);
        self.push_column(id, new_column::<T>);
        id
    }

    /// The id of `T`, registering it under its Rust type name on first use.
    pub fn id_of<T: Component>(&mut self) -> ComponentTypeId {
        self.register_erased(TypeId::of::<T>(), std::any::type_name::<T>(), new_column::<T>)
    }

    /// Register on first use, keyed by `type_id`. Never panics.
    pub fn register_erased(
        &mut self,
        type_id: TypeId,
        name: &str,
        make_column: fn() -> Box<dyn ErasedColumn>,
    ) -> ComponentTypeId {
        if let Some(id) = self.registry.lookup_type(type_id) {
            return id;
        }
        let id = self.registry.register_type_auto(type_id, name);
        self.push_column(id, make_column);
        id
    }

    fn push_column(&mut self, id: ComponentTypeId, make_column: fn() -> Box<dyn ErasedColumn>) {
        debug_assert_eq!(id.index(), self.columns.len());
        self.columns.push(make_column());
    }

    /// Whether `entity` currently holds a component of type `id`.
    #[inline]
    pub fn contains(&self, id: ComponentTypeId, entity: EntityId) -> bool {
        self.columns
            .get(id.index())
            .is_some_and(|col| col.contains(entity))
    }

    /// Number of entities holding type `id`.
    pub fn len(&self, id: ComponentTypeId) -> usize {
        self.columns.get(id.index()).map_or(0, |col| col.len())
    }

    /// Entities holding type `id`, in column order.
    pub fn entities(&self, id: ComponentTypeId) -> &[EntityId] {
        self.columns
            .get(id.index())
            .map_or(&[][..], |col| col.entities())
    }

    pub fn insert<T: Component>(
        &mut self,
        id: ComponentTypeId,
        entity: EntityId,
        value: T,
    ) -> Result<(), T> {
        match self.column_mut::<T>(id) {
            Some(col) => col.insert(entity, value),
            None => Err(value),
        }
    }

    pub fn insert_boxed(
        &mut self,
        id: ComponentTypeId,
        entity: EntityId,
        value: Box<dyn std::any::Any>,
    ) -> bool {
        self.columns
            .get_mut(id.index())
            .is_some_and(|col| col.insert_boxed(entity, value))
    }

    /// Drop `entity`'s component of type `id`. Returns `false` if absent.
    pub fn remove(&mut self, id: ComponentTypeId, entity: EntityId) -> bool {
        self.columns
            .get_mut(id.index())
            .is_some_and(|col| col.remove_entity(entity))
    }

    pub fn column<T: Component>(&self, id: ComponentTypeId) -> Option<&Column<T>> {
        self.columns
            .get(id.index())
            .and_then(|col| col.as_any().downcast_ref::<Column<T>>())
    }

    pub fn column_mut<T: Component>(&mut self, id: ComponentTypeId) -> Option<&mut Column<T>> {
        self.columns
            .get_mut(id.index())
            .and_then(|col| col.as_any_mut().downcast_mut::<Column<T>>())
    }

    /// Mutable access to several distinct columns at once.
    ///
    /// Returns `None` if any id is unregistered or two ids are equal.
    pub fn columns_mut<const N: usize>(
        &mut self,
        ids: [ComponentTypeId; N],
    ) -> Option<[&mut Box<dyn ErasedColumn>; N]> {
        self.columns.get_disjoint_mut(ids.map(|id| id.index())).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
