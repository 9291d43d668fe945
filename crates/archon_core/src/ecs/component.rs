//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be `Pod` so columns can be copied and reinterpreted bytewise.
//!
//! Every component type gets a [`ComponentId`] from a process-wide registry
//! the first time it is seen. IDs are dense, start at zero and never change
//! for the lifetime of the process.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::OnceLock;

use bytemuck::{Pod, Zeroable};
use parking_lot::RwLock;

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Copy`: No heap allocations, bitwise copyable
/// - `Pod`: Plain old data, safe to reinterpret as bytes or lanes
/// - `Zeroable`: Can be safely zeroed
/// - `Default`: Must have a default value
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {}
/// ```
pub trait Component: Copy + Pod + Zeroable + Default + Send + Sync + 'static {}

/// Stable identifier of a registered component type.
///
/// Totally ordered; sorted component sets are ordered by this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentId(u16);

impl ComponentId {
    /// Wraps a raw identifier value.
    ///
    /// Only IDs handed out by [`component_id`] resolve to component metadata.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the identifier as a registry index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Layout metadata for a registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    /// The component's identifier.
    pub id: ComponentId,
    /// Rust type name, for diagnostics.
    pub name: &'static str,
    /// Size of one component in bytes.
    pub size: usize,
    /// Alignment requirement in bytes.
    pub align: usize,
}

#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, ComponentId>,
    infos: Vec<ComponentInfo>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Returns the identifier of component type `C`, registering it on first use.
///
/// # Panics
///
/// Panics if more than `u16::MAX` component types are registered.
#[must_use]
pub fn component_id<C: Component>() -> ComponentId {
    let type_id = TypeId::of::<C>();
    if let Some(id) = registry().read().by_type.get(&type_id) {
        return *id;
    }

    let mut registry = registry().write();
    // Another thread may have registered it between the two locks
    if let Some(id) = registry.by_type.get(&type_id) {
        return *id;
    }

    let raw = u16::try_from(registry.infos.len());
    assert!(raw.is_ok(), "component registry exhausted");
    let id = ComponentId(raw.unwrap_or(u16::MAX));
    let info = ComponentInfo {
        id,
        name: type_name::<C>(),
        size: std::mem::size_of::<C>(),
        align: std::mem::align_of::<C>(),
    };
    registry.infos.push(info);
    registry.by_type.insert(type_id, id);
    tracing::trace!(component = info.name, id = id.0, size = info.size, "registered component");
    id
}

/// Returns layout metadata for a registered component.
#[must_use]
pub fn component_info(id: ComponentId) -> Option<ComponentInfo> {
    registry().read().infos.get(id.index()).copied()
}

/// Tombstone marker for soft-deleted entities.
///
/// Queries exclude it by default unless they classify it explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Phantom {
    /// Unused; keeps the marker addressable in its column.
    pub reserved: u8,
}

impl Component for Phantom {}

/// Position component for entities.
///
/// Represents a 3D position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z coordinate in world space.
    pub z: f32,
    /// Padding so the component fills exactly one 4-lane `f32` vector.
    pub _padding: f32,
}

impl Component for Position {}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }
}

/// Velocity component for entities.
///
/// Represents movement speed in world units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    /// X velocity component.
    pub x: f32,
    /// Y velocity component.
    pub y: f32,
    /// Z velocity component.
    pub z: f32,
    /// Padding for alignment.
    pub _padding: f32,
}

impl Component for Velocity {}

impl Velocity {
    /// Creates a new velocity.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_sizes() {
        // One 4-lane vector each
        assert_eq!(std::mem::size_of::<Position>(), 16);
        assert_eq!(std::mem::size_of::<Velocity>(), 16);
        assert_eq!(std::mem::size_of::<Phantom>(), 1);
    }

    #[test]
    fn test_registry_is_stable() {
        let first = component_id::<Position>();
        let second = component_id::<Position>();
        assert_eq!(first, second);
        assert_ne!(component_id::<Position>(), component_id::<Velocity>());

        let info = component_info(first).unwrap();
        assert_eq!(info.id, first);
        assert_eq!(info.size, 16);
        assert!(info.name.ends_with("Position"));
    }

    #[test]
    fn test_unknown_component_has_no_info() {
        assert!(component_info(ComponentId::from_raw(u16::MAX)).is_none());
    }
}
