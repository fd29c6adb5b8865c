//! Live queries and the registry that keeps them current.
//!
//! A [`Query`] is a handle to a membership set owned by the [`World`]: every
//! entity that currently has all of the query's required component types.
//! The set is seeded once when the query is created and from then on patched
//! by the world on each mutation. The query registry records, per component
//! type, which queries depend on it, so a mutation of type `T` on entity `e`
//! costs one membership re-test of `e` per query subscribed to `T`.
//!
//! Handles are plain `Copy` values and never reused; once disposed, every
//! operation on a handle fails with [`EcsError::QueryAlreadyDisposed`].
//!
//! # Example
//!
//! ```
//! use bigby_ecs::prelude::*;
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! let mut world = World::new();
//! let moving = world.query::<(Position, Velocity)>();
//!
//! let e = world.add((Position(0.0), Velocity(2.0))).unwrap();
//! assert_eq!(moving.entities(&world).unwrap(), &[e]);
//!
//! moving
//!     .for_each::<(Position, Velocity)>(&mut world, |_, (pos, vel)| pos.0 += vel.0)
//!     .unwrap();
//! assert_eq!(world.get::<Position>(e).unwrap().0, 2.0);
//!
//! world.detach::<Velocity>(e).unwrap();
//! assert!(moving.is_empty(&world).unwrap());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;
use crate::event::{EventChannel, Listener, ListenerId, QueryEventKind};
use crate::index::ComponentIndex;
use crate::storage::{Column, EntitySet};
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Query handle
// ---------------------------------------------------------------------------

/// Handle to a live query registered in a [`World`].
///
/// Ordering follows creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Query(pub(crate) u64);

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({})", self.0)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query#{}", self.0)
    }
}

impl Query {
    fn state(self, world: &World) -> Result<&QueryState, EcsError> {
        world
            .queries
            .get(self)
            .ok_or(EcsError::QueryAlreadyDisposed { query: self })
    }

    /// Whether the query is still registered.
    pub fn is_active(self, world: &World) -> bool {
        world.queries.get(self).is_some()
    }

    /// The current members, read-only.
    pub fn entities(self, world: &World) -> Result<&[EntityId], EcsError> {
        Ok(self.state(world)?.members.as_slice())
    }

    pub fn len(self, world: &World) -> Result<usize, EcsError> {
        Ok(self.state(world)?.members.len())
    }

    pub fn is_empty(self, world: &World) -> Result<bool, EcsError> {
        Ok(self.state(world)?.members.is_empty())
    }

    pub fn contains(self, world: &World, entity: EntityId) -> Result<bool, EcsError> {
        Ok(self.state(world)?.members.contains(entity))
    }

    /// The first member in iteration order, if any.
    pub fn first(self, world: &World) -> Result<Option<EntityId>, EcsError> {
        Ok(self.state(world)?.members.as_slice().first().copied())
    }

    /// The required component types, sorted and deduplicated.
    pub fn required(self, world: &World) -> Result<&[ComponentTypeId], EcsError> {
        Ok(&self.state(world)?.required)
    }

    /// A new query requiring everything this one does plus `T`.
    ///
    /// The derived query is registered and disposed independently; it keeps
    /// working after this query is disposed.
    pub fn with<T: Component>(self, world: &mut World) -> Result<Query, EcsError> {
        let extra = world.component_id::<T>();
        self.with_id(world, extra)
    }

    /// Type-id form of [`with`](Self::with).
    pub fn with_id(self, world: &mut World, extra: ComponentTypeId) -> Result<Query, EcsError> {
        let mut required = self.state(world)?.required.clone();
        required.push(extra);
        Ok(world.create_query(required))
    }

    /// Visit every member with mutable access to the world.
    ///
    /// The pass walks a snapshot of the membership taken when it starts.
    /// An entity is visited only if it is still a member when its turn comes,
    /// so the visitor may attach, detach or remove freely (including on the
    /// entity it is visiting). Entities that join during the pass wait for
    /// the next one. The first error returned by the visitor ends the pass.
    ///
    /// The visitor receives ids only. Read values with [`World::get`] /
    /// [`World::get_mut`], or use [`for_each`](Self::for_each) for typed
    /// `&mut` access to several components at once.
    ///
    /// ```
    /// use bigby_ecs::prelude::*;
    ///
    /// struct Fuel(u32);
    ///
    /// let mut world = World::new();
    /// let full = world.add((Fuel(3),)).unwrap();
    /// let empty = world.add((Fuel(0),)).unwrap();
    ///
    /// let tanks = world.query::<(Fuel,)>();
    /// tanks
    ///     .iterate(&mut world, |world, e| {
    ///         if world.get::<Fuel>(e)?.0 == 0 {
    ///             world.remove(e)?;
    ///         }
    ///         Ok(())
    ///     })
    ///     .unwrap();
    ///
    /// assert!(world.is_alive(full));
    /// assert!(!world.is_alive(empty));
    /// ```
    pub fn iterate<F>(self, world: &mut World, mut visitor: F) -> Result<(), EcsError>
    where
        F: FnMut(&mut World, EntityId) -> Result<(), EcsError>,
    {
        let snapshot = self.state(world)?.members.as_slice().to_vec();
        for entity in snapshot {
            let still_member = world
                .queries
                .get(self)
                .is_some_and(|state| state.members.contains(entity));
            if still_member {
                visitor(world, entity)?;
            }
        }
        Ok(())
    }

    /// Visit every member with mutable access to the components named by `S`.
    ///
    /// Members lacking one of the requested components are skipped, so `S`
    /// normally names a subset of the required types.
    ///
    /// # Panics
    ///
    /// Panics if `S` names the same component type twice.
    pub fn for_each<S: ComponentSet>(
        self,
        world: &mut World,
        mut visitor: impl FnMut(EntityId, S::Item<'_>),
    ) -> Result<(), EcsError> {
        let ids = S::type_ids(&mut world.index);
        validate_no_duplicate_types(&ids);

        let state = world
            .queries
            .get(self)
            .ok_or(EcsError::QueryAlreadyDisposed { query: self })?;
        for &entity in state.members.as_slice() {
            if let Some(item) = S::fetch(&mut world.index, &ids, entity) {
                visitor(entity, item);
            }
        }
        Ok(())
    }

    /// Subscribe to entities entering this query.
    pub fn on_added<F>(self, world: &mut World, listener: F) -> Result<ListenerId, EcsError>
    where
        F: Fn(&mut World, EntityId) + 'static,
    {
        world
            .queries
            .subscribe(self, QueryEventKind::Added, Rc::new(listener))
            .ok_or(EcsError::QueryAlreadyDisposed { query: self })
    }

    /// Subscribe to entities leaving this query.
    pub fn on_removed<F>(self, world: &mut World, listener: F) -> Result<ListenerId, EcsError>
    where
        F: Fn(&mut World, EntityId) + 'static,
    {
        world
            .queries
            .subscribe(self, QueryEventKind::Removed, Rc::new(listener))
            .ok_or(EcsError::QueryAlreadyDisposed { query: self })
    }

    /// Returns `false` if `id` is not subscribed to this query.
    pub fn unsubscribe(self, world: &mut World, id: ListenerId) -> Result<bool, EcsError> {
        world
            .queries
            .unsubscribe(self, id)
            .ok_or(EcsError::QueryAlreadyDisposed { query: self })
    }

    /// Deregister the query. No further events fire for it.
    pub fn dispose(self, world: &mut World) -> Result<(), EcsError> {
        world.dispose_query(self)
    }
}

fn validate_no_duplicate_types(ids: &[ComponentTypeId]) {
    for (i, id) in ids.iter().enumerate() {
        assert!(
            !ids[..i].contains(id),
            "component set names the same component type more than once"
        );
    }
}

// ---------------------------------------------------------------------------
// QueryRegistry
// ---------------------------------------------------------------------------

/// Everything the world keeps for one live query.
#[derive(Debug)]
pub(crate) struct QueryState {
    pub required: Vec<ComponentTypeId>,
    pub members: EntitySet,
    added: EventChannel,
    removed: EventChannel,
}

impl QueryState {
    fn channel_mut(&mut self, kind: QueryEventKind) -> &mut EventChannel {
        match kind {
            QueryEventKind::Added => &mut self.added,
            QueryEventKind::Removed => &mut self.removed,
        }
    }
}

/// Live queries, indexed by the component types they depend on.
#[derive(Debug, Default)]
pub(crate) struct QueryRegistry {
    queries: HashMap<Query, QueryState>,
    /// Component type -> queries requiring it, in creation order.
    by_type: HashMap<ComponentTypeId, Vec<Query>>,
    /// Queries with an empty required set; they track entity lifetime.
    universal: Vec<Query>,
    next_query: u64,
    next_listener: u64,
}

impl QueryRegistry {
    pub fn register(&mut self, required: Vec<ComponentTypeId>, members: EntitySet) -> Query {
        let query = Query(self.next_query);
        self.next_query += 1;

        if required.is_empty() {
            self.universal.push(query);
        }
        for &t in &required {
            self.by_type.entry(t).or_default().push(query);
        }
        self.queries.insert(
            query,
            QueryState {
                required,
                members,
                added: EventChannel::new(),
                removed: EventChannel::new(),
            },
        );
        query
    }

    /// Returns `false` if the query was not registered.
    pub fn dispose(&mut self, query: Query) -> bool {
        let Some(state) = self.queries.remove(&query) else {
            return false;
        };
        if state.required.is_empty() {
            self.universal.retain(|q| *q != query);
        }
        for t in &state.required {
            if let Some(subscribers) = self.by_type.get_mut(t) {
                subscribers.retain(|q| *q != query);
                if subscribers.is_empty() {
                    self.by_type.remove(t);
                }
            }
        }
        true
    }

    pub fn get(&self, query: Query) -> Option<&QueryState> {
        self.queries.get(&query)
    }

    pub fn get_mut(&mut self, query: Query) -> Option<&mut QueryState> {
        self.queries.get_mut(&query)
    }

    pub fn subscribers(&self, component: ComponentTypeId) -> &[Query] {
        self.by_type.get(&component).map_or(&[][..], Vec::as_slice)
    }

    pub fn universal(&self) -> &[Query] {
        &self.universal
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn subscribe(
        &mut self,
        query: Query,
        kind: QueryEventKind,
        listener: Listener,
    ) -> Option<ListenerId> {
        let id = ListenerId(self.next_listener);
        let state = self.queries.get_mut(&query)?;
        state.channel_mut(kind).subscribe(id, listener);
        self.next_listener += 1;
        Some(id)
    }

    pub fn unsubscribe(&mut self, query: Query, id: ListenerId) -> Option<bool> {
        let state = self.queries.get_mut(&query)?;
        Some(state.added.unsubscribe(id) || state.removed.unsubscribe(id))
    }

    pub fn listeners(&self, query: Query, kind: QueryEventKind) -> Vec<Listener> {
        match (self.queries.get(&query), kind) {
            (Some(state), QueryEventKind::Added) => state.added.snapshot(),
            (Some(state), QueryEventKind::Removed) => state.removed.snapshot(),
            (None, _) => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentSet -- typed required sets and fetches
// ---------------------------------------------------------------------------

/// A tuple of component types, used to name a query's required set and to
/// borrow those components mutably during [`Query::for_each`].
pub trait ComponentSet {
    /// What a fetch yields for one entity: a tuple of `&mut` components.
    type Item<'a>;

    /// The component type ids, registering unseen types.
    #[doc(hidden)]
    fn type_ids(index: &mut ComponentIndex) -> Vec<ComponentTypeId>;

    /// Borrow the set's components of `entity`, or `None` if one is missing.
    #[doc(hidden)]
    fn fetch<'a>(
        index: &'a mut ComponentIndex,
        ids: &[ComponentTypeId],
        entity: EntityId,
    ) -> Option<Self::Item<'a>>;
}

macro_rules! impl_component_set {
    ($(($T:ident, $i:tt)),+) => {
        impl<$($T: Component),+> ComponentSet for ($($T,)+) {
            type Item<'a> = ($(&'a mut $T,)+);

            fn type_ids(index: &mut ComponentIndex) -> Vec<ComponentTypeId> {
                vec![$(index.id_of::<$T>()),+]
            }

            #[allow(non_snake_case)]
            fn fetch<'a>(
                index: &'a mut ComponentIndex,
                ids: &[ComponentTypeId],
                entity: EntityId,
            ) -> Option<Self::Item<'a>> {
                let [$($T),+] = index.columns_mut([$(ids[$i]),+])?;
                Some(($(
                    $T.as_any_mut().downcast_mut::<Column<$T>>()?.get_mut(entity)?,
                )+))
            }
        }
    };
}

impl_component_set!((A, 0));
impl_component_set!((A, 0), (B, 1));
impl_component_set!((A, 0), (B, 1), (C, 2));
impl_component_set!((A, 0), (B, 1), (C, 2), (D, 3));
impl_component_set!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_component_set!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
