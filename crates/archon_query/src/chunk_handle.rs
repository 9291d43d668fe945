//! # Chunk Handles
//!
//! Per-chunk view handed to chunk callbacks, for callers that decide what
//! to fetch only after inspecting the archetype.

// SAFETY: Handles hand out mutable column slices from a shared archetype
// reference. They are only created while the execution holds the world
// exclusively, and every slice borrows the handle mutably.
#![allow(unsafe_code)]

use std::ptr::NonNull;

use archon_core::{component_id, Archetype, Component, ComponentId, EntityId};

use crate::tuple::{ComponentTuple, MAX_ARITY};

/// One chunk of a matching archetype.
///
/// Everything a handle returns borrows the handle, so a shared view of the
/// archetype cannot outlive a mutable column fetch:
///
/// ```compile_fail
/// use archon_core::{EntityBuilder, Position, World};
/// use archon_query::QueryBuilder;
///
/// let mut world = World::new();
/// world.spawn(EntityBuilder::new().with(Position::default())).unwrap();
/// let mut builder = QueryBuilder::new();
/// builder.include::<Position>().unwrap();
/// let query = builder.build();
///
/// query.run(&mut world).for_each_chunk_handle(|handle| {
///     let shared = handle
///         .archetype()
///         .column::<Position>(handle.chunk_index())
///         .unwrap();
///     let column = handle.column::<Position>().unwrap();
///     column[0].x = shared[0].x + 1.0;
/// });
/// ```
pub struct ChunkHandle<'w> {
    archetype: &'w Archetype,
    chunk: usize,
}

impl<'w> ChunkHandle<'w> {
    /// Caller must hold the owning world exclusively for `'w`.
    pub(crate) fn new(archetype: &'w Archetype, chunk: usize) -> Self {
        Self { archetype, chunk }
    }

    /// The archetype this chunk belongs to.
    #[inline]
    #[must_use]
    pub fn archetype(&self) -> &Archetype {
        self.archetype
    }

    /// Index of this chunk within its archetype.
    #[inline]
    #[must_use]
    pub fn chunk_index(&self) -> usize {
        self.chunk
    }

    /// Entities stored in the chunk.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        self.archetype
            .chunk(self.chunk)
            .map_or(&[][..], archon_core::Chunk::entities)
    }

    /// Number of entities in the chunk.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities().len()
    }

    /// Checks if the chunk holds no entities.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities().is_empty()
    }

    /// Checks whether the chunk stores component `C`.
    #[inline]
    #[must_use]
    pub fn has<C: Component>(&self) -> bool {
        self.archetype.has(component_id::<C>())
    }

    /// Checks whether the chunk stores a component by identifier.
    #[inline]
    #[must_use]
    pub fn has_id(&self, component: ComponentId) -> bool {
        self.archetype.has(component)
    }

    /// Checks whether the chunk stores every component of `Q`.
    ///
    /// Merges against the tuple's cached sorted identifiers.
    #[must_use]
    pub fn has_all<Q: ComponentTuple>(&self) -> bool {
        self.archetype
            .components()
            .is_superset_of(Q::sorted_component_ids().as_slice())
    }

    /// Mutable view of one column at the chunk's length.
    #[must_use]
    pub fn column<C: Component>(&mut self) -> Option<&mut [C]> {
        let column = self.archetype.column_index(component_id::<C>())?;
        let ptr = self.archetype.column_ptr(self.chunk, column)?;
        // SAFETY: the world is held exclusively and `&mut self` prevents a
        // second slice from this handle
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<C>(), self.len()) })
    }

    /// Mutable views of every column of `Q` at the chunk's length.
    ///
    /// Returns `None` if the chunk lacks one of the components.
    #[must_use]
    pub fn columns<Q: ComponentTuple>(&mut self) -> Option<Q::Slices<'_>> {
        let ids = Q::component_ids();
        let mut ptrs = [NonNull::<u8>::dangling(); MAX_ARITY];
        for (slot, id) in ptrs.iter_mut().zip(ids.iter()) {
            let column = self.archetype.column_index(*id)?;
            *slot = self.archetype.column_ptr(self.chunk, column)?;
        }
        // SAFETY: tuple components are distinct, so the columns are disjoint
        Some(unsafe { Q::slices(&ptrs[..Q::ARITY], self.len()) })
    }
}

#[cfg(test)]
mod tests {
    use archon_core::{EntityBuilder, Phantom, Position, Velocity, World};

    use super::*;

    #[test]
    fn test_handle_introspection_and_columns() {
        let mut world = World::new();
        for i in 0..3 {
            world
                .spawn(
                    EntityBuilder::new()
                        .with(Position::new(i as f32, 0.0, 0.0))
                        .with(Velocity::new(1.0, 0.0, 0.0)),
                )
                .unwrap();
        }

        let archetype = &world.archetypes()[0];
        let mut handle = ChunkHandle::new(archetype, 0);
        assert_eq!(handle.len(), 3);
        assert!(handle.has::<Position>());
        assert!(!handle.has::<Phantom>());
        assert!(handle.has_all::<(Velocity, Position)>());
        assert!(!handle.has_all::<(Position, Phantom)>());
        assert!(handle.column::<Phantom>().is_none());

        let (positions, velocities) = handle.columns::<(Position, Velocity)>().unwrap();
        for (p, v) in positions.iter_mut().zip(velocities.iter()) {
            p.x += v.x;
        }
        let positions = handle.column::<Position>().unwrap();
        assert!((positions[2].x - 3.0).abs() < f32::EPSILON);

        // Shared views are fine once the mutable slice is gone
        let chunk = handle.chunk_index();
        let shared = handle.archetype().column::<Position>(chunk).unwrap();
        assert!((shared[2].x - 3.0).abs() < f32::EPSILON);
    }
}
