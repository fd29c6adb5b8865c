//! Initial component sets for [`World::add`](crate::world::World::add).

use std::any::{Any, TypeId};

use crate::component::Component;
use crate::storage::{new_column, ErasedColumn};

/// One type-erased component waiting to be attached.
pub(crate) struct BundleEntry {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub value: Box<dyn Any>,
    pub make_column: fn() -> Box<dyn ErasedColumn>,
}

/// A set of components to attach to a new entity.
///
/// Duplicates are accepted here and rejected by `World::add`, which reports
/// them as [`EcsError::DuplicateComponentType`](crate::EcsError).
///
/// ```
/// use bigby_ecs::prelude::*;
///
/// struct Position(f32, f32);
/// struct Velocity(f32, f32);
///
/// let mut world = World::new();
/// let bundle = ComponentBundle::new()
///     .with(Position(0.0, 0.0))
///     .with(Velocity(1.0, 0.0));
/// let entity = world.add(bundle).unwrap();
/// assert!(world.has::<Velocity>(entity));
/// ```
#[derive(Default)]
pub struct ComponentBundle {
    entries: Vec<BundleEntry>,
}

impl ComponentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`add`](Self::add).
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.add(value);
        self
    }

    pub fn add<T: Component>(&mut self, value: T) {
        self.entries.push(BundleEntry {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
            make_column: new_column::<T>,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<BundleEntry> {
        self.entries
    }
}

impl std::fmt::Debug for ComponentBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.type_name))
            .finish()
    }
}

/// Anything that can become a [`ComponentBundle`]: the bundle itself, `()`,
/// or a tuple of up to eight components.
pub trait Bundle {
    fn into_bundle(self) -> ComponentBundle;
}

impl Bundle for ComponentBundle {
    fn into_bundle(self) -> ComponentBundle {
        self
    }
}

impl Bundle for () {
    fn into_bundle(self) -> ComponentBundle {
        ComponentBundle::new()
    }
}

macro_rules! impl_bundle_for_tuple {
    ($($T:ident),+) => {
        impl<$($T: Component),+> Bundle for ($($T,)+) {
            #[allow(non_snake_case)]
            fn into_bundle(self) -> ComponentBundle {
                let ($($T,)+) = self;
                let mut bundle = ComponentBundle::new();
                $(bundle.add($T);)+
                bundle
            }
        }
    };
}

impl_bundle_for_tuple!(A);
impl_bundle_for_tuple!(A, B);
impl_bundle_for_tuple!(A, B, C);
impl_bundle_for_tuple!(A, B, C, D);
impl_bundle_for_tuple!(A, B, C, D, E);
impl_bundle_for_tuple!(A, B, C, D, E, F);
impl_bundle_for_tuple!(A, B, C, D, E, F, G);
impl_bundle_for_tuple!(A, B, C, D, E, F, G, H);
