//! # Vectorized Execution
//!
//! Runs a callback over component columns reinterpreted as SIMD vectors.

// SAFETY: Columns are viewed as raw bytes before being split into vectors.
// Each archetype is blocked for the whole walk, and the execution holds the
// world exclusively.
#![allow(unsafe_code)]
//!
//! ## Passes
//!
//! Each chunk gets up to two callbacks:
//!
//! 1. **Full pass** - every whole vector of every column, `LaneInfo::default()`.
//! 2. **Tail pass** - when the scalars don't divide evenly into vectors, the
//!    trailing scalars of each column are copied into a zeroed scratch
//!    vector. The callback sees one vector per column, and afterwards only
//!    the first `leftover` lanes are copied back. Padding lanes never reach
//!    storage.
//!
//! Every column of the tuple has to split the same way, otherwise the call
//! fails with [`QueryError::LaneCoverageMismatch`].

use std::marker::PhantomData;
use std::ptr::NonNull;

use archon_core::{Archetype, ColumnLayout, ComponentId};

use crate::error::{LaneCoverage, QueryError, QueryResult};
use crate::execute::{resolve_columns, Execution};
use crate::lanes::{load_tail, split_column, store_tail, ColumnLanes, LaneInfo, SimdVector};
use crate::tuple::{ComponentTuple, MAX_ARITY};

/// Keeps an archetype blocked for structural changes until dropped.
struct BlockGuard<'a>(&'a Archetype);

impl<'a> BlockGuard<'a> {
    fn new(archetype: &'a Archetype) -> Self {
        archetype.block();
        Self(archetype)
    }
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.0.unblock();
    }
}

/// Vectors of one pass over one chunk, handed to
/// [`Execution::for_each_lanes`] callbacks.
pub struct LaneBatch<'a, Q: ComponentTuple, V: SimdVector> {
    columns: &'a [NonNull<V>],
    len: usize,
    info: LaneInfo,
    _tuple: PhantomData<fn() -> Q>,
}

impl<Q: ComponentTuple, V: SimdVector> LaneBatch<'_, Q, V> {
    /// Which pass this is and where its lanes sit.
    #[inline]
    #[must_use]
    pub fn info(&self) -> LaneInfo {
        self.info
    }

    /// Vectors per component in this pass.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks if the pass carries no vectors.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One mutable vector slice per component of `Q`.
    #[inline]
    pub fn vectors(&mut self) -> Q::Vectors<'_, V> {
        // SAFETY: each pointer covers `len` vectors of a distinct column or
        // scratch slot; `&mut self` keeps the slices unique
        unsafe { Q::vectors(self.columns, self.len) }
    }
}

impl Execution<'_, '_> {
    /// Calls `f` with every matching chunk's columns of `Q` viewed as
    /// vectors of `V`.
    ///
    /// Returns the number of entities covered.
    ///
    /// # Errors
    ///
    /// - [`QueryError::ScalarMismatch`] if a component's size is not a
    ///   whole number of `V::Scalar`s.
    /// - [`QueryError::Reinterpret`] if bytemuck rejects a column cast.
    /// - [`QueryError::LaneCoverageMismatch`] if two columns of one chunk
    ///   split into different vector counts.
    ///
    /// Chunks visited before an error keep the changes made to them.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a component type twice.
    pub fn for_each_lanes<Q, V, F>(&mut self, mut f: F) -> QueryResult<usize>
    where
        Q: ComponentTuple,
        V: SimdVector,
        F: FnMut(&mut LaneBatch<'_, Q, V>),
    {
        let matches = self.matches();
        if matches.is_empty() {
            return Ok(0);
        }
        let world = self.world();

        let ids = Q::component_ids();
        let scalar_size = std::mem::size_of::<V::Scalar>();
        let mut columns = [0usize; MAX_ARITY];
        let mut scratch = vec![V::zeroed(); Q::ARITY];
        let mut visited = 0;

        for m in matches.iter() {
            let Some(archetype) = world.archetype(m.archetype) else {
                continue;
            };
            if archetype.is_empty() || !resolve_columns(archetype, &ids, &mut columns) {
                continue;
            }
            let columns = &columns[..Q::ARITY];

            for (component, column) in ids.iter().zip(columns) {
                let size = archetype.column_layout(*column).map_or(0, ColumnLayout::size);
                if size == 0 || size % scalar_size != 0 {
                    return Err(QueryError::ScalarMismatch {
                        component: *component,
                        size,
                        scalar_size,
                    });
                }
            }

            let _block = BlockGuard::new(archetype);
            for chunk_index in (0..archetype.chunk_count()).rev() {
                visited +=
                    lanes_for_chunk::<Q, V, F>(archetype, chunk_index, &ids, columns, &mut scratch, &mut f)?;
            }
        }
        Ok(visited)
    }
}

/// Runs the full and tail passes over one chunk. Returns its entity count.
fn lanes_for_chunk<Q, V, F>(
    archetype: &Archetype,
    chunk_index: usize,
    ids: &[ComponentId],
    columns: &[usize],
    scratch: &mut [V],
    f: &mut F,
) -> QueryResult<usize>
where
    Q: ComponentTuple,
    V: SimdVector,
    F: FnMut(&mut LaneBatch<'_, Q, V>),
{
    let len = archetype.chunk(chunk_index).map_or(0, archon_core::Chunk::len);
    if len == 0 {
        return Ok(0);
    }

    let mut vector_ptrs = [NonNull::<V>::dangling(); MAX_ARITY];
    let mut tails: [&mut [V::Scalar]; MAX_ARITY] = Default::default();
    let mut coverage: Option<(LaneCoverage, usize)> = None;

    for (i, (component, column)) in ids.iter().zip(columns).enumerate() {
        let (Some(ptr), Some(layout)) = (
            archetype.column_ptr(chunk_index, *column),
            archetype.column_layout(*column),
        ) else {
            return Ok(0);
        };

        // SAFETY: the column holds `len` initialized elements of
        // `layout.size()` bytes; the archetype is blocked and the world is
        // held exclusively
        let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len * layout.size()) };
        let ColumnLanes {
            vectors,
            tail,
            total,
        } = split_column::<V>(bytes).map_err(|reason| QueryError::Reinterpret {
            component: *component,
            reason,
        })?;

        let found = LaneCoverage {
            vectors: vectors.len(),
            leftover: tail.len(),
        };
        match coverage {
            None => coverage = Some((found, total)),
            Some((expected, _)) if expected != found => {
                tracing::error!(
                    archetype = archetype.id().index(),
                    component = ?component,
                    %expected,
                    %found,
                    "lane coverage mismatch"
                );
                return Err(QueryError::LaneCoverageMismatch {
                    archetype: archetype.id(),
                    component: *component,
                    expected,
                    found,
                });
            }
            Some(_) => {}
        }

        vector_ptrs[i] = NonNull::from(vectors).cast::<V>();
        tails[i] = tail;
    }

    let Some((coverage, total)) = coverage else {
        return Ok(0);
    };
    let arity = Q::ARITY;

    if coverage.vectors > 0 {
        let mut batch = LaneBatch::<Q, V> {
            columns: &vector_ptrs[..arity],
            len: coverage.vectors,
            info: LaneInfo::default(),
            _tuple: PhantomData,
        };
        f(&mut batch);
    }

    if coverage.leftover > 0 {
        let items_per_component = total / len;
        let offset = (coverage.vectors * V::LANES) % items_per_component;

        for (slot, tail) in scratch.iter_mut().zip(&tails[..arity]) {
            *slot = load_tail::<V>(tail);
        }
        let base = scratch.as_mut_ptr();
        let mut scratch_ptrs = [NonNull::<V>::dangling(); MAX_ARITY];
        for (i, slot) in scratch_ptrs[..arity].iter_mut().enumerate() {
            // SAFETY: scratch holds one vector per component
            *slot = unsafe { NonNull::new_unchecked(base.add(i)) };
        }

        let mut batch = LaneBatch::<Q, V> {
            columns: &scratch_ptrs[..arity],
            len: 1,
            info: LaneInfo {
                offset,
                leftover: coverage.leftover,
            },
            _tuple: PhantomData,
        };
        f(&mut batch);

        for (vector, tail) in scratch.iter().zip(tails[..arity].iter_mut()) {
            store_tail(vector, tail);
        }
    }

    Ok(len)
}
