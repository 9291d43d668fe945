//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the world's slot table
//! - A generation counter for safe reuse

use super::archetype::ArchetypeId;
use super::component::{component_id, Component, ComponentId};

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The slot index (0 to 2^32-1)
    /// * `generation` - The generation counter (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Where a live entity's components are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// Owning archetype.
    pub archetype: ArchetypeId,
    /// Chunk index within the archetype.
    pub chunk: usize,
    /// Row within the chunk.
    pub row: usize,
}

/// Component values for one entity, collected before spawning.
///
/// Adding the same component type twice keeps the last value.
#[derive(Clone, Debug, Default)]
pub struct EntityBuilder {
    ids: Vec<ComponentId>,
    data: Vec<Vec<u8>>,
}

impl EntityBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Adds a component, consuming and returning the builder.
    #[must_use]
    pub fn with<C: Component>(mut self, component: C) -> Self {
        self.add(component);
        self
    }

    /// Adds a component in place.
    pub fn add<C: Component>(&mut self, component: C) -> &mut Self {
        let id = component_id::<C>();
        let bytes = bytemuck::bytes_of(&component).to_vec();
        match self.ids.binary_search(&id) {
            Ok(at) => self.data[at] = bytes,
            Err(at) => {
                self.ids.insert(at, id);
                self.data.insert(at, bytes);
            }
        }
        self
    }

    /// Sorted identifiers of the collected components.
    #[inline]
    #[must_use]
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.ids
    }

    /// Raw bytes of the `index`-th component in sorted order.
    #[inline]
    #[must_use]
    pub fn component_bytes(&self, index: usize) -> Option<&[u8]> {
        self.data.get(index).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Position, Velocity};

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
        assert!(!id.is_null());
        assert!(EntityId::default().is_null());
    }

    #[test]
    fn test_builder_sorts_and_replaces() {
        let builder = EntityBuilder::new()
            .with(Velocity::new(1.0, 0.0, 0.0))
            .with(Position::new(1.0, 2.0, 3.0))
            .with(Position::new(4.0, 5.0, 6.0));

        assert_eq!(builder.component_ids().len(), 2);
        assert!(builder.component_ids().windows(2).all(|w| w[0] < w[1]));

        let pos_at = builder
            .component_ids()
            .iter()
            .position(|id| *id == component_id::<Position>())
            .unwrap();
        let bytes = builder.component_bytes(pos_at).unwrap();
        let pos: Position = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(pos, Position::new(4.0, 5.0, 6.0));
    }
}
