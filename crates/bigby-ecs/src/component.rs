//! Component type registration and metadata.
//!
//! Any `'static` Rust type can be a component. The first time a type is used
//! (or explicitly registered) the [`ComponentRegistry`] assigns it a dense
//! [`ComponentTypeId`], which keys the component index, the query registry
//! and every query's required-type set.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

/// Marker for types that can be attached to entities.
pub trait Component: 'static {}

impl<T: 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Unique ID assigned at registration time.
    pub id: ComponentTypeId,
    /// Human-readable name, used in errors and logs.
    pub name: String,
    /// Rust `TypeId` the component was registered for.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentTypeId`]s and their metadata.
///
/// A type can only be registered once; subsequent registrations of the same
/// Rust `TypeId` return the existing [`ComponentTypeId`].
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`, or return its existing id (ignoring `name`).
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a different type.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        self.register_type(TypeId::of::<T>(), name)
    }

    /// Type-erased form of [`register`](Self::register).
    pub fn register_type(&mut self, type_id: TypeId, name: &str) -> ComponentTypeId {
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }
        assert!(
            !self.by_name.contains_key(name),
            "component name '{name}' is already registered for a different type"
        );

        let id = self.push_info(type_id, name.to_owned());
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// Register a type on first use, keyed by `TypeId` alone.
    ///
    /// `name` is only a display label and is never looked up, so two types
    /// sharing a Rust type name (e.g. block-local structs) both register. A
    /// label already in use gets a `#<id>` suffix.
    pub fn register_type_auto(&mut self, type_id: TypeId, name: &str) -> ComponentTypeId {
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }
        let next = self.infos.len();
        let label = if self.infos.iter().any(|info| info.name == name) {
            format!("{name}#{next}")
        } else {
            name.to_owned()
        };
        self.push_info(type_id, label)
    }

    fn push_info(&mut self, type_id: TypeId, name: String) -> ComponentTypeId {
        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo { id, name, type_id });
        self.by_type.insert(type_id, id);
        id
    }

    /// Look up a component type by its Rust type.
    pub fn lookup<T: Component>(&self) -> Option<ComponentTypeId> {
        self.lookup_type(TypeId::of::<T>())
    }

    /// Look up a component type by its Rust `TypeId`.
    pub fn lookup_type(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.by_type.get(&type_id).copied()
    }

    /// Look up a component type by the name it was explicitly registered under.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Get the [`ComponentInfo`] for a registered component type ID.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// The registered name of `id`, or `"<unregistered>"`.
    pub fn name_of(&self, id: ComponentTypeId) -> &str {
        self.get_info(id)
            .map(|info| info.name.as_str())
            .unwrap_or("<unregistered>")
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Returns the names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.infos.iter().map(|info| info.name.as_str()).collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
