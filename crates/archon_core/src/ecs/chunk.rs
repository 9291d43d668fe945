//! # Chunks
//!
//! A chunk is one fixed-capacity block of an archetype's storage.

// SAFETY: Chunks own a raw allocation that columns are carved out of.
// Every pointer handed out stays inside that allocation.
#![allow(unsafe_code)]
//!
//! ## Layout
//!
//! ```text
//! | Column 0 (cap * size0) | pad | Column 1 (cap * size1) | pad | ... |
//! ^ 64-byte aligned              ^ 64-byte aligned
//! ```
//!
//! The entity array lives beside the allocation and is indexed in parallel
//! with every column. Rows `0..len` are live; rows past `len` are zeroed or
//! hold stale bytes from removed entities and are never exposed.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use super::entity::EntityId;

/// Alignment of every column start inside a chunk.
///
/// Any supported SIMD vector type's alignment divides this value.
pub const COLUMN_ALIGN: usize = 64;

/// Stand-in type for an aligned dangling pointer. Never constructed.
#[allow(dead_code)]
#[repr(C, align(64))]
struct ColumnAligned([u8; COLUMN_ALIGN]);

/// Fixed-capacity block of entities with one contiguous column per component.
pub struct Chunk {
    /// Column storage. Dangling but aligned when the layout is zero-sized.
    storage: NonNull<u8>,
    /// Layout of the storage allocation.
    layout: Layout,
    /// Live entities, parallel to every column.
    entities: Vec<EntityId>,
    /// Maximum number of entities.
    capacity: usize,
}

impl Chunk {
    /// Allocates a zeroed chunk.
    ///
    /// `layout` must already be aligned to [`COLUMN_ALIGN`].
    pub(crate) fn new(layout: Layout, capacity: usize) -> Self {
        let storage = if layout.size() == 0 {
            NonNull::<ColumnAligned>::dangling().cast::<u8>()
        } else {
            // SAFETY: layout has non-zero size
            let ptr = unsafe { alloc_zeroed(layout) };
            match NonNull::new(ptr) {
                Some(ptr) => ptr,
                None => handle_alloc_error(layout),
            }
        };
        tracing::trace!(bytes = layout.size(), capacity, "allocated chunk");

        Self {
            storage,
            layout,
            entities: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Checks if the chunk holds no entities.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Checks if the chunk is at capacity.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entities.len() == self.capacity
    }

    /// Maximum number of entities.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live entity IDs, parallel to every column.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Pointer to the first byte of the column starting at `offset`.
    ///
    /// `offset` must come from this chunk's archetype layout.
    #[inline]
    pub(crate) fn column_ptr(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.layout.size());
        if self.layout.size() == 0 {
            return self.storage;
        }
        // SAFETY: offset is within (or one past) the allocation
        unsafe { NonNull::new_unchecked(self.storage.as_ptr().add(offset)) }
    }

    /// Appends an entity ID, returning its row.
    pub(crate) fn push_entity(&mut self, id: EntityId) -> usize {
        debug_assert!(!self.is_full(), "chunk overflow");
        self.entities.push(id);
        self.entities.len() - 1
    }

    /// Removes the last entity ID.
    pub(crate) fn pop_entity(&mut self) -> Option<EntityId> {
        self.entities.pop()
    }

    /// Overwrites the entity ID stored at `row`.
    pub(crate) fn set_entity(&mut self, row: usize, id: EntityId) {
        self.entities[row] = id;
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if self.layout.size() > 0 {
            // SAFETY: We allocated this memory with this layout
            unsafe {
                dealloc(self.storage.as_ptr(), self.layout);
            }
        }
    }
}

// SAFETY: Chunk owns its allocation outright
unsafe impl Send for Chunk {}
// SAFETY: Shared access only reads; writes go through the owning archetype
unsafe impl Sync for Chunk {}
