//! # Archetype-based Entity Storage
//!
//! Entities with the same component set are stored together.

// SAFETY: This module copies component bytes between raw chunk columns.
// Every offset is derived from the archetype's own column layout.
#![allow(unsafe_code)]
//!
//! ## Chunked Columns
//!
//! ```text
//! Archetype {Position, Velocity}:
//!   chunk 0: [P0 P1 .. P255] [V0 V1 .. V255]   <- full
//!   chunk 1: [P0 P1 .. P41 ]  [V0 V1 .. V41 ]   <- tail
//! ```
//!
//! Iteration is linear and cache-friendly within each column. Only the
//! last chunk is ever partially filled: removal swaps the archetype's last
//! entity into the hole and releases the tail chunk when it empties.

use std::alloc::Layout;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use super::chunk::{Chunk, COLUMN_ALIGN};
use super::component::{component_id, component_info, Component, ComponentId};
use super::component_set::FrozenComponentSet;
use super::entity::{EntityBuilder, EntityId};
use crate::error::{StorageError, StorageResult};

/// Index of an archetype within its world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// Wraps a raw archetype index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index into the world's archetype list.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Placement of one component column inside a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnLayout {
    component: ComponentId,
    size: usize,
    align: usize,
    offset: usize,
}

impl ColumnLayout {
    /// Component stored in this column.
    #[inline]
    #[must_use]
    pub const fn component(&self) -> ComponentId {
        self.component
    }

    /// Size of one element in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Alignment of one element in bytes.
    #[inline]
    #[must_use]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Byte offset of the column from the chunk base.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

/// Computes column offsets and the chunk allocation layout.
fn layout_columns(
    signature: &FrozenComponentSet,
    capacity: usize,
) -> StorageResult<(Vec<ColumnLayout>, Layout)> {
    let mut columns = Vec::with_capacity(signature.len());
    let mut cursor = 0usize;

    for id in signature.iter() {
        let info = component_info(id).ok_or(StorageError::UnknownComponent(id))?;
        if info.align > COLUMN_ALIGN {
            return Err(StorageError::InvalidLayout(format!(
                "{} requires {}-byte alignment, columns are {COLUMN_ALIGN}-byte aligned",
                info.name, info.align
            )));
        }

        let offset = cursor
            .checked_next_multiple_of(COLUMN_ALIGN)
            .ok_or_else(|| StorageError::InvalidLayout("chunk size overflow".into()))?;
        let bytes = info
            .size
            .checked_mul(capacity)
            .ok_or_else(|| StorageError::InvalidLayout("column size overflow".into()))?;
        cursor = offset
            .checked_add(bytes)
            .ok_or_else(|| StorageError::InvalidLayout("chunk size overflow".into()))?;

        columns.push(ColumnLayout {
            component: id,
            size: info.size,
            align: info.align,
            offset,
        });
    }

    let layout = Layout::from_size_align(cursor, COLUMN_ALIGN)
        .map_err(|e| StorageError::InvalidLayout(e.to_string()))?;
    Ok((columns, layout))
}

fn hash_signature(signature: &FrozenComponentSet) -> u64 {
    let mut hasher = DefaultHasher::new();
    signature.as_slice().hash(&mut hasher);
    hasher.finish()
}

/// All entities sharing one exact component set.
///
/// The component set never changes after creation. Columns are ordered
/// like the sorted component set, so `column_index` is a binary search.
pub struct Archetype {
    id: ArchetypeId,
    signature: FrozenComponentSet,
    structural_hash: u64,
    columns: Vec<ColumnLayout>,
    chunk_layout: Layout,
    chunk_capacity: usize,
    chunks: Vec<Chunk>,
    len: usize,
    /// Outstanding blocks. Structural changes are rejected while non-zero.
    blocked: AtomicU32,
}

impl Archetype {
    /// Creates an empty archetype.
    ///
    /// # Errors
    ///
    /// Fails if a component is unregistered or the chunk layout overflows.
    pub(crate) fn new(
        id: ArchetypeId,
        signature: FrozenComponentSet,
        chunk_capacity: usize,
    ) -> StorageResult<Self> {
        let (columns, chunk_layout) = layout_columns(&signature, chunk_capacity)?;
        Ok(Self {
            id,
            structural_hash: hash_signature(&signature),
            signature,
            columns,
            chunk_layout,
            chunk_capacity,
            chunks: Vec::new(),
            len: 0,
            blocked: AtomicU32::new(0),
        })
    }

    /// This archetype's index in its world.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Sorted component set.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &FrozenComponentSet {
        &self.signature
    }

    /// Hash over the sorted component set. Equal sets hash equally.
    #[inline]
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        self.structural_hash
    }

    /// Number of live entities across all chunks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks if the archetype holds no entities.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entities per chunk.
    #[inline]
    #[must_use]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Number of allocated chunks.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// All chunks, in storage order.
    #[inline]
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// One chunk by index.
    #[inline]
    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// Checks whether the archetype stores a component.
    #[inline]
    #[must_use]
    pub fn has(&self, component: ComponentId) -> bool {
        self.signature.contains(component)
    }

    /// Column layouts, ordered like [`Archetype::components`].
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    /// Position of a component's column.
    #[inline]
    #[must_use]
    pub fn column_index(&self, component: ComponentId) -> Option<usize> {
        self.signature.as_slice().binary_search(&component).ok()
    }

    /// Layout of one column.
    #[inline]
    #[must_use]
    pub fn column_layout(&self, column: usize) -> Option<&ColumnLayout> {
        self.columns.get(column)
    }

    /// Raw pointer to the start of a column in a chunk.
    ///
    /// The pointer covers `chunk.capacity()` elements, of which the first
    /// `chunk.len()` are live. It is aligned to [`COLUMN_ALIGN`].
    /// Writing through it requires exclusive access to the archetype.
    #[inline]
    #[must_use]
    pub fn column_ptr(&self, chunk: usize, column: usize) -> Option<NonNull<u8>> {
        let layout = self.columns.get(column)?;
        let chunk = self.chunks.get(chunk)?;
        Some(chunk.column_ptr(layout.offset))
    }

    /// Typed view of a component column at the chunk's live length.
    #[must_use]
    pub fn column<C: Component>(&self, chunk: usize) -> Option<&[C]> {
        let column = self.column_index(component_id::<C>())?;
        let ptr = self.column_ptr(chunk, column)?;
        let len = self.chunks[chunk].len();
        // SAFETY: the column holds `capacity >= len` initialized `C` values,
        // aligned to COLUMN_ALIGN, which is at least align_of::<C>()
        Some(unsafe { std::slice::from_raw_parts(ptr.as_ptr().cast::<C>(), len) })
    }

    /// Mutable typed view of a component column at the chunk's live length.
    #[must_use]
    pub fn column_mut<C: Component>(&mut self, chunk: usize) -> Option<&mut [C]> {
        let column = self.column_index(component_id::<C>())?;
        let ptr = self.column_ptr(chunk, column)?;
        let len = self.chunks[chunk].len();
        // SAFETY: as in `column`, and `&mut self` guarantees exclusivity
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<C>(), len) })
    }

    // ========================================================================
    // STRUCTURAL BLOCKING
    // ========================================================================

    /// Rejects structural changes until a matching [`Archetype::unblock`].
    pub fn block(&self) {
        self.blocked.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one [`Archetype::block`].
    pub fn unblock(&self) {
        let previous = self.blocked.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unblock without block");
    }

    /// Checks if structural changes are currently rejected.
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire) > 0
    }

    // ========================================================================
    // STRUCTURAL CHANGES
    // ========================================================================

    /// Appends an entity, allocating a chunk if the tail is full.
    ///
    /// `builder` must carry exactly this archetype's components.
    /// Returns the `(chunk, row)` the entity landed in.
    pub(crate) fn push(&mut self, entity: EntityId, builder: &EntityBuilder) -> (usize, usize) {
        debug_assert_eq!(builder.component_ids(), self.signature.as_slice());

        if self.chunks.last().map_or(true, Chunk::is_full) {
            self.chunks
                .push(Chunk::new(self.chunk_layout, self.chunk_capacity));
        }
        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let row = chunk.push_entity(entity);

        for (column, layout) in self.columns.iter().enumerate() {
            let Some(bytes) = builder.component_bytes(column) else {
                continue;
            };
            debug_assert_eq!(bytes.len(), layout.size);
            let dst = chunk.column_ptr(layout.offset);
            // SAFETY: row < capacity, so the destination element lies inside
            // the column; the builder's bytes are a separate allocation
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    dst.as_ptr().add(row * layout.size),
                    layout.size,
                );
            }
        }

        self.len += 1;
        (chunk_index, row)
    }

    /// Removes the entity at `(chunk, row)` by moving the archetype's last
    /// entity into its place.
    ///
    /// Returns the entity that moved, if any. Its new location is
    /// `(chunk, row)`.
    pub(crate) fn swap_remove(&mut self, chunk: usize, row: usize) -> Option<EntityId> {
        let tail_chunk = self.chunks.len().checked_sub(1)?;
        let tail_row = self.chunks[tail_chunk].len().checked_sub(1)?;
        debug_assert!(row < self.chunks[chunk].len());

        let moved = if (chunk, row) == (tail_chunk, tail_row) {
            None
        } else {
            for layout in &self.columns {
                let src = self.chunks[tail_chunk].column_ptr(layout.offset);
                let dst = self.chunks[chunk].column_ptr(layout.offset);
                // SAFETY: both rows are live and distinct, so the element
                // ranges are in bounds and do not overlap
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        src.as_ptr().add(tail_row * layout.size),
                        dst.as_ptr().add(row * layout.size),
                        layout.size,
                    );
                }
            }
            let tail_entity = self.chunks[tail_chunk].entities()[tail_row];
            self.chunks[chunk].set_entity(row, tail_entity);
            Some(tail_entity)
        };

        self.chunks[tail_chunk].pop_entity();
        if self.chunks[tail_chunk].is_empty() {
            self.chunks.pop();
            tracing::trace!(archetype = self.id.0, "released empty chunk");
        }
        self.len -= 1;
        moved
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("components", &self.signature)
            .field("len", &self.len)
            .field("chunks", &self.chunks.len())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Position, Velocity};

    fn pv_archetype(capacity: usize) -> Archetype {
        let signature =
            FrozenComponentSet::from_ids(&[component_id::<Position>(), component_id::<Velocity>()]);
        Archetype::new(ArchetypeId::new(0), signature, capacity).unwrap()
    }

    fn pv(i: u32) -> EntityBuilder {
        let f = i as f32;
        EntityBuilder::new()
            .with(Position::new(f, 0.0, 0.0))
            .with(Velocity::new(0.0, f, 0.0))
    }

    #[test]
    fn test_columns_are_aligned() {
        let archetype = pv_archetype(3);
        for layout in archetype.columns() {
            assert_eq!(layout.offset() % COLUMN_ALIGN, 0);
            assert_eq!(layout.align(), 4);
            assert_eq!(layout.size(), 16);
        }
        assert_eq!(archetype.columns()[1].offset(), 64);
    }

    #[test]
    fn test_push_fills_chunks() {
        let mut archetype = pv_archetype(4);
        for i in 0..10 {
            archetype.push(EntityId::new(i, 0), &pv(i));
        }
        assert_eq!(archetype.len(), 10);
        assert_eq!(archetype.chunk_count(), 3);
        assert_eq!(archetype.chunk(2).unwrap().len(), 2);

        let positions = archetype.column::<Position>(1).unwrap();
        assert_eq!(positions.len(), 4);
        assert!((positions[0].x - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_swap_remove_moves_tail() {
        let mut archetype = pv_archetype(4);
        for i in 0..5 {
            archetype.push(EntityId::new(i, 0), &pv(i));
        }

        // Tail (entity 4) lives alone in chunk 1
        let moved = archetype.swap_remove(0, 1);
        assert_eq!(moved, Some(EntityId::new(4, 0)));
        assert_eq!(archetype.chunk_count(), 1);
        assert_eq!(archetype.chunk(0).unwrap().entities()[1], EntityId::new(4, 0));
        let velocities = archetype.column::<Velocity>(0).unwrap();
        assert!((velocities[1].y - 4.0).abs() < f32::EPSILON);

        // Removing the tail itself moves nothing
        assert_eq!(archetype.swap_remove(0, 3), None);
        assert_eq!(archetype.len(), 3);
    }

    #[test]
    fn test_column_mut_writes_through() {
        let mut archetype = pv_archetype(4);
        archetype.push(EntityId::new(0, 0), &pv(0));
        archetype.column_mut::<Position>(0).unwrap()[0].y = 9.0;
        assert!((archetype.column::<Position>(0).unwrap()[0].y - 9.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_block_nesting() {
        let archetype = pv_archetype(4);
        archetype.block();
        archetype.block();
        archetype.unblock();
        assert!(archetype.is_blocked());
        archetype.unblock();
        assert!(!archetype.is_blocked());
    }

    #[test]
    fn test_structural_hash_depends_on_set() {
        let a = pv_archetype(4);
        let b = pv_archetype(8);
        let c = Archetype::new(
            ArchetypeId::new(1),
            FrozenComponentSet::from_ids(&[component_id::<Position>()]),
            4,
        )
        .unwrap();
        assert_eq!(a.structural_hash(), b.structural_hash());
        assert_ne!(a.structural_hash(), c.structural_hash());
    }
}
