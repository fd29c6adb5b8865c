//! Bigby ECS -- entity/component store with live, incrementally maintained
//! queries.
//!
//! Subsystems declare the component types they care about once, with
//! [`World::query`], and from then on read an always-current membership list.
//! Every attach, detach, add and remove patches only the queries that depend
//! on the changed component type, for the one entity that changed, and
//! notifies their add/remove listeners synchronously.
//!
//! # Quick Start
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use bigby_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! let moving = world.query::<(Position, Velocity)>();
//!
//! let started = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&started);
//! moving.on_added(&mut world, move |_, _| counter.set(counter.get() + 1)).unwrap();
//!
//! let entity = world
//!     .add((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))
//!     .unwrap();
//! assert_eq!(started.get(), 1);
//!
//! moving
//!     .for_each::<(Position, Velocity)>(&mut world, |_, (pos, vel)| {
//!         pos.x += vel.dx;
//!         pos.y += vel.dy;
//!     })
//!     .unwrap();
//! assert_eq!(world.get::<Position>(entity).unwrap(), &Position { x: 1.0, y: 0.0 });
//! ```

#![deny(unsafe_code)]

pub mod bundle;
pub mod component;
pub mod entity;
pub mod event;
pub mod index;
pub mod query;
pub mod storage;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by store and query operations.
///
/// All of them are reported at the offending call; the store is left exactly
/// as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity was removed, never existed, or the id is from an older
    /// generation of its slot.
    #[error("entity {entity:?} does not exist (removed, stale or never allocated)")]
    UnknownEntity { entity: entity::EntityId },

    /// Two initial components of a new entity share a type.
    #[error("component type '{component}' appears more than once in the initial component set")]
    DuplicateComponentType { component: String },

    /// `attach` of a type the entity already has.
    #[error("entity {entity:?} already has a '{component}' component")]
    ComponentAlreadyPresent {
        entity: entity::EntityId,
        component: String,
    },

    /// `detach`/`get` of a type the entity does not have.
    #[error("entity {entity:?} has no '{component}' component")]
    ComponentNotPresent {
        entity: entity::EntityId,
        component: String,
    },

    /// Operation on a query handle after `dispose`.
    #[error("{query} has already been disposed")]
    QueryAlreadyDisposed { query: query::Query },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::bundle::{Bundle, ComponentBundle};
    pub use crate::component::{Component, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::EntityId;
    pub use crate::event::{ListenerId, QueryEventKind};
    pub use crate::query::{ComponentSet, Query};
    pub use crate::world::World;
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
