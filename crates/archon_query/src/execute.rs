//! # Query Execution
//!
//! Walks the archetypes a description matches and hands their column data
//! to a callback.

// SAFETY: Execution builds references into chunk columns from raw pointers.
// It holds the world exclusively for its whole lifetime, so nothing else
// can observe or alias those columns while a callback runs.
#![allow(unsafe_code)]
//!
//! ## Walk Order
//!
//! Matching archetypes are visited in `(structural hash, archetype id)`
//! order. Within an archetype, chunks go last to first and rows go last to
//! first. Removal swaps the archetype's last entity into the hole, and
//! everything after the current position has already been visited, so
//! `retain` and `retain_chunks` can despawn as they go.
//!
//! Every form returns the number of entities visited, counted before each
//! callback runs.
//!
//! ## Borrows
//!
//! `for_each`, `for_each_chunk` and `par_for_each_chunk` hand out data
//! borrowed for as long as the execution itself is borrowed. Each row or
//! chunk is handed out once and the walk makes no structural changes, so
//! callbacks may keep what they are given. `retain` and `retain_chunks`
//! do change structure, so their callbacks get a short-lived view instead.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use archon_core::{Archetype, ArchetypeId, ComponentId, EntityId, World};
use rayon::prelude::*;

use crate::chunk_handle::ChunkHandle;
use crate::description::{MatchList, QueryDescription};
use crate::tuple::{ComponentTuple, MAX_ARITY};

/// Column positions of a tuple's components in one archetype.
///
/// Returns `false` if the archetype lacks one of them.
pub(crate) fn resolve_columns(
    archetype: &Archetype,
    ids: &[ComponentId],
    out: &mut [usize; MAX_ARITY],
) -> bool {
    for (slot, id) in out.iter_mut().zip(ids) {
        match archetype.column_index(*id) {
            Some(column) => *slot = column,
            None => return false,
        }
    }
    true
}

/// Column start pointers of one chunk.
fn chunk_pointers(
    archetype: &Archetype,
    chunk: usize,
    columns: &[usize],
    out: &mut [NonNull<u8>; MAX_ARITY],
) -> bool {
    for (slot, column) in out.iter_mut().zip(columns) {
        match archetype.column_ptr(chunk, *column) {
            Some(ptr) => *slot = ptr,
            None => return false,
        }
    }
    true
}

/// One entity visited by [`Execution::retain`].
pub struct Row<'a, Q: ComponentTuple> {
    entity: EntityId,
    columns: &'a [NonNull<u8>],
    row: usize,
    _tuple: PhantomData<fn() -> Q>,
}

impl<Q: ComponentTuple> Row<'_, Q> {
    /// The visited entity.
    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Mutable references to the entity's components of `Q`.
    #[inline]
    pub fn components(&mut self) -> Q::Refs<'_> {
        // SAFETY: built by `retain` with one live column pointer per
        // distinct component and `row < len`; `&mut self` keeps the
        // references unique
        unsafe { Q::refs(self.columns, self.row) }
    }
}

/// A query bound to a world, ready to run callbacks.
///
/// Created by [`QueryDescription::run`]. Holds the world exclusively, so
/// callbacks cannot reach it except through the data they are given.
pub struct Execution<'q, 'w> {
    description: &'q QueryDescription,
    world: &'w mut World,
}

impl<'q, 'w> Execution<'q, 'w> {
    pub(crate) fn new(description: &'q QueryDescription, world: &'w mut World) -> Self {
        Self { description, world }
    }

    /// The description being executed.
    #[must_use]
    pub fn description(&self) -> &'q QueryDescription {
        self.description
    }

    /// Current matches.
    pub(crate) fn matches(&self) -> MatchList {
        self.description.archetypes(&*self.world)
    }

    /// The world, shared.
    pub(crate) fn world(&self) -> &World {
        &*self.world
    }

    /// Calls `f` once per matching entity with mutable references to the
    /// components of `Q`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a component type twice.
    pub fn for_each<'e, Q, F>(&'e mut self, mut f: F) -> usize
    where
        Q: ComponentTuple,
        F: FnMut(EntityId, Q::Refs<'e>),
    {
        let matches = self.matches();
        if matches.is_empty() {
            return 0;
        }

        let ids = Q::component_ids();
        let mut columns = [0usize; MAX_ARITY];
        let mut ptrs = [NonNull::<u8>::dangling(); MAX_ARITY];
        let mut visited = 0;

        for m in matches.iter() {
            let Some(archetype) = self.world.archetype(m.archetype) else {
                continue;
            };
            if archetype.is_empty() || !resolve_columns(archetype, &ids, &mut columns) {
                continue;
            }

            for chunk_index in (0..archetype.chunk_count()).rev() {
                let chunk = &archetype.chunks()[chunk_index];
                if chunk.is_empty()
                    || !chunk_pointers(archetype, chunk_index, &columns[..Q::ARITY], &mut ptrs)
                {
                    continue;
                }

                let entities = chunk.entities();
                for row in (0..entities.len()).rev() {
                    visited += 1;
                    // SAFETY: row < len, one pointer per distinct component
                    let refs = unsafe { Q::refs(&ptrs[..Q::ARITY], row) };
                    f(entities[row], refs);
                }
            }
        }
        visited
    }

    /// Visits every matching entity like [`Execution::for_each`] and
    /// despawns each one for which `f` returns `false`.
    ///
    /// The despawn happens after `f` returns. A despawn the world rejects
    /// is logged and skipped.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a component type twice.
    pub fn retain<Q, F>(&mut self, mut f: F) -> usize
    where
        Q: ComponentTuple,
        F: FnMut(&mut Row<'_, Q>) -> bool,
    {
        let matches = self.matches();
        if matches.is_empty() {
            return 0;
        }

        let ids = Q::component_ids();
        let mut columns = [0usize; MAX_ARITY];
        let mut ptrs = [NonNull::<u8>::dangling(); MAX_ARITY];
        let mut visited = 0;

        for m in matches.iter() {
            let Some(archetype) = self.world.archetype(m.archetype) else {
                continue;
            };
            if archetype.is_empty() || !resolve_columns(archetype, &ids, &mut columns) {
                continue;
            }

            let mut chunk_index = archetype.chunk_count();
            while chunk_index > 0 {
                chunk_index -= 1;
                let archetype = &self.world.archetypes()[m.archetype.index()];
                let Some(chunk) = archetype.chunk(chunk_index) else {
                    continue;
                };
                let mut row = chunk.len();
                if row == 0
                    || !chunk_pointers(archetype, chunk_index, &columns[..Q::ARITY], &mut ptrs)
                {
                    continue;
                }

                // Column pointers stay valid across despawns: removal only
                // shrinks this chunk or releases chunks after it
                while row > 0 {
                    row -= 1;
                    let entity = self.world.archetypes()[m.archetype.index()].chunks()
                        [chunk_index]
                        .entities()[row];
                    visited += 1;
                    let mut view = Row {
                        entity,
                        columns: &ptrs[..Q::ARITY],
                        row,
                        _tuple: PhantomData,
                    };
                    if !f(&mut view) {
                        self.despawn_logged(entity, m.archetype);
                    }
                }
            }
        }
        visited
    }

    /// Calls `f` once per non-empty matching chunk with the chunk's
    /// entities and a mutable slice of each column of `Q`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a component type twice.
    pub fn for_each_chunk<'e, Q, F>(&'e mut self, mut f: F) -> usize
    where
        Q: ComponentTuple,
        F: FnMut(&'e [EntityId], Q::Slices<'e>),
    {
        let matches = self.matches();
        if matches.is_empty() {
            return 0;
        }
        let world: &'e World = &*self.world;

        let ids = Q::component_ids();
        let mut columns = [0usize; MAX_ARITY];
        let mut ptrs = [NonNull::<u8>::dangling(); MAX_ARITY];
        let mut visited = 0;

        for m in matches.iter() {
            let Some(archetype) = world.archetype(m.archetype) else {
                continue;
            };
            if archetype.is_empty() || !resolve_columns(archetype, &ids, &mut columns) {
                continue;
            }

            for chunk_index in (0..archetype.chunk_count()).rev() {
                let chunk = &archetype.chunks()[chunk_index];
                if chunk.is_empty()
                    || !chunk_pointers(archetype, chunk_index, &columns[..Q::ARITY], &mut ptrs)
                {
                    continue;
                }

                visited += chunk.len();
                // SAFETY: every column holds `len` elements of its component
                let slices = unsafe { Q::slices(&ptrs[..Q::ARITY], chunk.len()) };
                f(chunk.entities(), slices);
            }
        }
        visited
    }

    /// Calls `f` once per non-empty matching chunk with a handle for
    /// inspecting the archetype and fetching columns.
    pub fn for_each_chunk_handle<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&mut ChunkHandle<'_>),
    {
        let matches = self.matches();
        let mut visited = 0;

        for m in matches.iter() {
            let Some(archetype) = self.world.archetype(m.archetype) else {
                continue;
            };
            for chunk_index in (0..archetype.chunk_count()).rev() {
                let mut handle = ChunkHandle::new(archetype, chunk_index);
                if handle.is_empty() {
                    continue;
                }
                visited += handle.len();
                f(&mut handle);
            }
        }
        visited
    }

    /// Like [`Execution::for_each_chunk_handle`], but despawns every
    /// entity of each chunk for which `f` returns `false`.
    pub fn retain_chunks<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&mut ChunkHandle<'_>) -> bool,
    {
        let matches = self.matches();
        let mut visited = 0;
        let mut doomed = Vec::new();

        for m in matches.iter() {
            let chunk_count = self
                .world
                .archetype(m.archetype)
                .map_or(0, Archetype::chunk_count);

            for chunk_index in (0..chunk_count).rev() {
                let archetype = &self.world.archetypes()[m.archetype.index()];
                let mut handle = ChunkHandle::new(archetype, chunk_index);
                if handle.is_empty() {
                    continue;
                }
                visited += handle.len();
                if f(&mut handle) {
                    continue;
                }

                // Snapshot first: each despawn moves an already visited
                // entity into this chunk
                doomed.clear();
                doomed.extend_from_slice(handle.entities());
                for entity in doomed.iter().rev() {
                    self.despawn_logged(*entity, m.archetype);
                }
            }
        }
        visited
    }

    /// Calls `f` for every non-empty matching chunk, spreading the chunks
    /// of each archetype across the rayon thread pool.
    ///
    /// Archetypes are processed one after another. No order holds between
    /// chunks.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a component type twice.
    pub fn par_for_each_chunk<'e, Q, F>(&'e mut self, f: F) -> usize
    where
        Q: ComponentTuple,
        F: Fn(&'e [EntityId], Q::Slices<'e>) + Send + Sync,
    {
        let matches = self.matches();
        if matches.is_empty() {
            return 0;
        }
        let world: &'e World = &*self.world;

        let ids = Q::component_ids();
        let mut columns = [0usize; MAX_ARITY];
        let visited = AtomicUsize::new(0);

        for m in matches.iter() {
            let Some(archetype) = world.archetype(m.archetype) else {
                continue;
            };
            if archetype.is_empty() || !resolve_columns(archetype, &ids, &mut columns) {
                continue;
            }

            let columns = &columns[..Q::ARITY];
            (0..archetype.chunk_count())
                .into_par_iter()
                .for_each(|chunk_index| {
                    let chunk = &archetype.chunks()[chunk_index];
                    let mut ptrs = [NonNull::<u8>::dangling(); MAX_ARITY];
                    if chunk.is_empty() || !chunk_pointers(archetype, chunk_index, columns, &mut ptrs)
                    {
                        return;
                    }

                    visited.fetch_add(chunk.len(), Ordering::Relaxed);
                    // SAFETY: each task owns a distinct chunk, and every
                    // column holds `len` elements of its component
                    let slices = unsafe { Q::slices(&ptrs[..Q::ARITY], chunk.len()) };
                    f(chunk.entities(), slices);
                });
        }
        visited.into_inner()
    }

    fn despawn_logged(&mut self, entity: EntityId, archetype: ArchetypeId) {
        if let Err(error) = self.world.despawn(entity) {
            tracing::warn!(
                ?entity,
                archetype = archetype.index(),
                %error,
                "query could not despawn entity"
            );
        }
    }
}
