//! The [`World`] is the entity store: it owns entity identities, every
//! component value (through the component index), and the registry of live
//! queries that it keeps current on each mutation.
//!
//! # Cascade
//!
//! Every structural mutation runs the same three steps before returning:
//!
//! 1. update the component index;
//! 2. re-test the mutated entity against each query subscribed to the changed
//!    component type(s), and nothing else;
//! 3. for each query whose membership flipped, invoke its listeners.
//!
//! Listeners receive `&mut World` and may mutate it; the nested cascade runs
//! to completion inside the listener call. Step 2 compares the query cache to
//! the index *as it is now*, so an outer cascade resuming after a nested one
//! never applies a stale decision.

use tracing::{debug, trace};

use crate::bundle::Bundle;
use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::{EntityAllocator, EntityId};
use crate::event::QueryEventKind;
use crate::index::ComponentIndex;
use crate::query::{ComponentSet, Query, QueryRegistry};
use crate::storage::EntitySet;
use crate::EcsError;

/// The entity/component store and its reactive query engine.
///
/// `World` is single-threaded: listeners are reference counted and run on the
/// caller's stack.
#[derive(Default)]
pub struct World {
    pub(crate) allocator: EntityAllocator,
    pub(crate) index: ComponentIndex,
    /// Component types held by each entity slot, indexed by `EntityId::index`.
    signatures: Vec<Vec<ComponentTypeId>>,
    pub(crate) queries: QueryRegistry,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.allocator.alive_count())
            .field("component_types", &self.index.registry().len())
            .field("query_count", &self.queries.len())
            .finish()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::default()
    }

    // -- components ---------------------------------------------------------

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        self.index.registry()
    }

    /// Register `T` under a readable name used in errors and logs.
    ///
    /// Optional: unregistered types are registered under their Rust type name
    /// on first use. Has no effect if `T` is already registered.
    pub fn register_component<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        self.index.register::<T>(name)
    }

    /// The id of component type `T`, registering it if needed.
    pub fn component_id<T: Component>(&mut self) -> ComponentTypeId {
        self.index.id_of::<T>()
    }

    fn component_name(&self, id: ComponentTypeId) -> String {
        self.registry().name_of(id).to_owned()
    }

    fn component_name_of<T: Component>(&self) -> String {
        match self.registry().lookup::<T>() {
            Some(id) => self.component_name(id),
            None => std::any::type_name::<T>().to_owned(),
        }
    }

    // -- entities -----------------------------------------------------------

    /// Whether `entity` refers to a live entity.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// All live entities, in slot order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.allocator.iter_alive()
    }

    /// The component types `entity` currently holds.
    pub fn component_types(&self, entity: EntityId) -> Result<&[ComponentTypeId], EcsError> {
        self.ensure_alive(entity)?;
        Ok(&self.signatures[entity.index() as usize])
    }

    fn ensure_alive(&self, entity: EntityId) -> Result<(), EcsError> {
        if self.allocator.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::UnknownEntity { entity })
        }
    }

    fn signature_mut(&mut self, entity: EntityId) -> &mut Vec<ComponentTypeId> {
        let idx = entity.index() as usize;
        if idx >= self.signatures.len() {
            self.signatures.resize_with(idx + 1, Vec::new);
        }
        &mut self.signatures[idx]
    }

    /// Create an entity holding `bundle`'s components.
    ///
    /// All components are indexed before any query is re-evaluated, so each
    /// query that the new entity satisfies sees exactly one `Added`.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateComponentType`] if the bundle holds two values of
    /// one type; no entity is created in that case.
    pub fn add(&mut self, bundle: impl Bundle) -> Result<EntityId, EcsError> {
        let entries = bundle.into_bundle().into_entries();
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|prev| prev.type_id == entry.type_id) {
                let component = match self.registry().lookup_type(entry.type_id) {
                    Some(id) => self.component_name(id),
                    None => entry.type_name.to_owned(),
                };
                return Err(EcsError::DuplicateComponentType { component });
            }
        }

        let entity = self.allocator.allocate();
        let mut types = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = self
                .index
                .register_erased(entry.type_id, entry.type_name, entry.make_column);
            let inserted = self.index.insert_boxed(id, entity, entry.value);
            debug_assert!(inserted, "fresh entity already held a component");
            types.push(id);
        }
        *self.signature_mut(entity) = types.clone();

        trace!(entity = %entity, components = types.len(), "add");
        self.reevaluate(entity, &types, true);
        Ok(entity)
    }

    /// Attach `value` to `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownEntity`] for a dead or stale id;
    /// [`EcsError::ComponentAlreadyPresent`] if the entity already has a `T`.
    pub fn attach<T: Component>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let id = self.index.id_of::<T>();
        if self.index.insert(id, entity, value).is_err() {
            return Err(EcsError::ComponentAlreadyPresent {
                entity,
                component: self.component_name(id),
            });
        }
        self.signature_mut(entity).push(id);

        trace!(entity = %entity, component = self.registry().name_of(id), "attach");
        self.reevaluate(entity, &[id], false);
        Ok(())
    }

    /// Detach and drop `entity`'s `T`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownEntity`] for a dead or stale id;
    /// [`EcsError::ComponentNotPresent`] if the entity has no `T`.
    pub fn detach<T: Component>(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        match self.registry().lookup::<T>() {
            Some(id) => self.detach_id(entity, id),
            None => Err(EcsError::ComponentNotPresent {
                entity,
                component: std::any::type_name::<T>().to_owned(),
            }),
        }
    }

    /// Type-id form of [`detach`](Self::detach).
    pub fn detach_id(&mut self, entity: EntityId, id: ComponentTypeId) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        if !self.index.remove(id, entity) {
            return Err(EcsError::ComponentNotPresent {
                entity,
                component: self.component_name(id),
            });
        }
        let signature = self.signature_mut(entity);
        if let Some(pos) = signature.iter().position(|t| *t == id) {
            signature.swap_remove(pos);
        }

        trace!(entity = %entity, component = self.registry().name_of(id), "detach");
        self.reevaluate(entity, &[id], false);
        Ok(())
    }

    /// Detach every component of `entity`, then invalidate its id.
    ///
    /// Each detach cascades on its own, so every query holding the entity
    /// sees `Removed` before the id dies. If a listener removes the entity
    /// first, this call still succeeds.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownEntity`] if the entity is already gone.
    pub fn remove(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        trace!(entity = %entity, "remove");

        while self.allocator.is_alive(entity) {
            let Some(&id) = self.signatures[entity.index() as usize].last() else {
                break;
            };
            self.detach_id(entity, id)?;
        }
        if !self.allocator.is_alive(entity) {
            return Ok(());
        }

        self.allocator.deallocate(entity);
        self.reevaluate(entity, &[], true);
        Ok(())
    }

    /// Read `entity`'s `T`.
    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        self.ensure_alive(entity)?;
        self.registry()
            .lookup::<T>()
            .and_then(|id| self.index.column::<T>(id))
            .and_then(|col| col.get(entity))
            .ok_or_else(|| EcsError::ComponentNotPresent {
                entity,
                component: self.component_name_of::<T>(),
            })
    }

    /// Mutate `entity`'s `T` in place. Membership is unaffected.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T, EcsError> {
        self.ensure_alive(entity)?;
        match self.registry().lookup::<T>() {
            Some(id) if self.index.contains(id, entity) => self
                .index
                .column_mut::<T>(id)
                .and_then(|col| col.get_mut(entity))
                .ok_or_else(|| EcsError::ComponentNotPresent {
                    entity,
                    component: std::any::type_name::<T>().to_owned(),
                }),
            _ => Err(EcsError::ComponentNotPresent {
                entity,
                component: self.component_name_of::<T>(),
            }),
        }
    }

    /// Whether `entity` is alive and has a `T`.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.registry()
            .lookup::<T>()
            .is_some_and(|id| self.index.contains(id, entity))
    }

    // -- queries ------------------------------------------------------------

    /// Create a live query over every entity holding all of `required`.
    ///
    /// The initial membership walks the smallest required column; an empty
    /// required set matches every live entity.
    pub fn create_query(&mut self, required: impl IntoIterator<Item = ComponentTypeId>) -> Query {
        let mut required: Vec<ComponentTypeId> = required.into_iter().collect();
        required.sort_unstable();
        required.dedup();

        let mut members = EntitySet::new();
        match required.iter().min_by_key(|&&t| self.index.len(t)) {
            Some(&rarest) => {
                for &entity in self.index.entities(rarest) {
                    if required.iter().all(|&t| self.index.contains(t, entity)) {
                        members.insert(entity);
                    }
                }
            }
            None => {
                for entity in self.allocator.iter_alive() {
                    members.insert(entity);
                }
            }
        }

        let seeded = members.len();
        let query = self.queries.register(required, members);
        debug!(query = %query, members = seeded, "query created");
        query
    }

    /// Create a live query over the component types named by `S`.
    pub fn query<S: ComponentSet>(&mut self) -> Query {
        let required = S::type_ids(&mut self.index);
        self.create_query(required)
    }

    /// Deregister `query`. See [`Query::dispose`].
    pub fn dispose_query(&mut self, query: Query) -> Result<(), EcsError> {
        if !self.queries.dispose(query) {
            return Err(EcsError::QueryAlreadyDisposed { query });
        }
        debug!(query = %query, "query disposed");
        Ok(())
    }

    /// Number of live queries.
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    // -- cascade ------------------------------------------------------------

    /// Re-test `entity` against the queries subscribed to `changed` (plus the
    /// empty-set queries when the entity's lifetime changed) and fire events
    /// for every membership flip. Queries are visited in creation order.
    fn reevaluate(&mut self, entity: EntityId, changed: &[ComponentTypeId], lifetime: bool) {
        let mut affected: Vec<Query> = Vec::new();
        if lifetime {
            affected.extend_from_slice(self.queries.universal());
        }
        for &t in changed {
            affected.extend_from_slice(self.queries.subscribers(t));
        }
        if changed.len() > 1 || lifetime {
            affected.sort_unstable();
            affected.dedup();
        }

        for query in affected {
            if let Some(kind) = self.reconcile(query, entity) {
                self.emit(query, entity, kind);
            }
        }
    }

    /// Bring one query's cache in line with the index for one entity.
    fn reconcile(&mut self, query: Query, entity: EntityId) -> Option<QueryEventKind> {
        let state = self.queries.get_mut(query)?;
        let matches = self.allocator.is_alive(entity)
            && state
                .required
                .iter()
                .all(|&t| self.index.contains(t, entity));
        let cached = state.members.contains(entity);

        match (matches, cached) {
            (true, false) => {
                state.members.insert(entity);
                Some(QueryEventKind::Added)
            }
            (false, true) => {
                state.members.remove(entity);
                Some(QueryEventKind::Removed)
            }
            _ => None,
        }
    }

    fn emit(&mut self, query: Query, entity: EntityId, kind: QueryEventKind) {
        let listeners = self.queries.listeners(query, kind);
        trace!(query = %query, entity = %entity, kind = %kind, listeners = listeners.len(), "emit");
        for listener in listeners {
            // A previous listener may have disposed the query.
            if self.queries.get(query).is_none() {
                break;
            }
            listener(self, entity);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
