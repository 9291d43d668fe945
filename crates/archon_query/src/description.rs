//! # Query Descriptions
//!
//! A compiled query: four frozen classification sets plus a cache of the
//! archetypes they match.
//!
//! ## Match Cache
//!
//! Archetypes are only ever appended to a world, so the cache remembers how
//! many it has looked at (the watermark) and only scans the ones created
//! since. The cache grows and is never reset:
//!
//! ```text
//! Empty ──scan 0..N──▶ Populated(N) ──scan N..M──▶ Populated(M) ──▶ ...
//! ```
//!
//! Readers share the lock; only a stale cache takes it exclusively.

use std::sync::Arc;

use archon_core::{
    Archetype, ArchetypeId, ComponentId, ComponentSet, FrozenComponentSet, World, WorldId,
};
use parking_lot::RwLock;

use crate::execute::Execution;

/// One archetype a query matched, with the data matching produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeMatch {
    /// Matched archetype.
    pub archetype: ArchetypeId,
    /// The archetype's structural hash, the primary sort key.
    pub structural_hash: u64,
    /// Components of the at-least-one set the archetype has.
    /// `None` when that set is empty.
    pub at_least_one: Option<FrozenComponentSet>,
    /// The single component of the exactly-one set the archetype has.
    /// `None` when that set is empty.
    pub exactly_one: Option<ComponentId>,
}

impl ArchetypeMatch {
    /// Iteration order key: `(structural hash, archetype id)`.
    #[inline]
    #[must_use]
    pub fn sort_key(&self) -> (u64, ArchetypeId) {
        (self.structural_hash, self.archetype)
    }
}

/// Shared, sorted list of matches. Cloning it never allocates.
pub type MatchList = Arc<Vec<ArchetypeMatch>>;

/// Cache state. Only reachable through the description's lock.
#[derive(Debug, Default)]
struct MatchCache {
    /// World the cache was first filled from.
    world: Option<WorldId>,
    /// Number of archetypes already examined.
    watermark: usize,
    matches: Option<MatchList>,
    /// Intersection scratch space, reused across match attempts.
    scratch: ComponentSet,
}

/// Immutable compiled query with an incrementally maintained match cache.
///
/// A description binds to the first world it is evaluated against.
#[derive(Debug)]
pub struct QueryDescription {
    include: FrozenComponentSet,
    exclude: FrozenComponentSet,
    at_least_one: FrozenComponentSet,
    exactly_one: FrozenComponentSet,
    /// Whether `Phantom` was added to `exclude` by the builder.
    implicit_phantom: bool,
    cache: RwLock<MatchCache>,
}

impl QueryDescription {
    pub(crate) fn new(
        include: FrozenComponentSet,
        exclude: FrozenComponentSet,
        at_least_one: FrozenComponentSet,
        exactly_one: FrozenComponentSet,
        implicit_phantom: bool,
    ) -> Self {
        Self {
            include,
            exclude,
            at_least_one,
            exactly_one,
            implicit_phantom,
            cache: RwLock::new(MatchCache::default()),
        }
    }

    /// Components every match must have.
    #[inline]
    #[must_use]
    pub fn include_set(&self) -> &FrozenComponentSet {
        &self.include
    }

    /// Components no match may have.
    #[inline]
    #[must_use]
    pub fn exclude_set(&self) -> &FrozenComponentSet {
        &self.exclude
    }

    /// Components of which every match has at least one.
    #[inline]
    #[must_use]
    pub fn at_least_one_set(&self) -> &FrozenComponentSet {
        &self.at_least_one
    }

    /// Components of which every match has exactly one.
    #[inline]
    #[must_use]
    pub fn exactly_one_set(&self) -> &FrozenComponentSet {
        &self.exactly_one
    }

    pub(crate) fn has_implicit_phantom(&self) -> bool {
        self.implicit_phantom
    }

    /// Tests one archetype, using `scratch` for intersections.
    pub fn try_match(
        &self,
        archetype: &Archetype,
        scratch: &mut ComponentSet,
    ) -> Option<ArchetypeMatch> {
        let components = archetype.components();
        if !components.is_superset_of(self.include.as_slice()) {
            return None;
        }
        if components.overlaps(self.exclude.as_slice()) {
            return None;
        }

        let exactly_one = if self.exactly_one.is_empty() {
            None
        } else {
            components.intersect_into(self.exactly_one.as_slice(), scratch);
            Some(scratch.single()?)
        };

        let at_least_one = if self.at_least_one.is_empty() {
            None
        } else {
            components.intersect_into(self.at_least_one.as_slice(), scratch);
            if scratch.is_empty() {
                return None;
            }
            Some(scratch.freeze())
        };

        Some(ArchetypeMatch {
            archetype: archetype.id(),
            structural_hash: archetype.structural_hash(),
            at_least_one,
            exactly_one,
        })
    }

    /// Checks whether the query matches an archetype.
    #[must_use]
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.try_match(archetype, &mut ComponentSet::new()).is_some()
    }

    /// Returns every archetype of `world` the query matches, in
    /// `(structural hash, archetype id)` order.
    ///
    /// Only archetypes created since the previous call are examined.
    ///
    /// # Panics
    ///
    /// Panics if the description was already evaluated against another world.
    pub fn archetypes(&self, world: &World) -> MatchList {
        let count = world.archetype_count();
        {
            let cache = self.cache.read();
            if cache.world == Some(world.id()) && cache.watermark >= count {
                if let Some(matches) = &cache.matches {
                    return Arc::clone(matches);
                }
            }
        }

        let mut guard = self.cache.write();
        let cache = &mut *guard;
        match cache.world {
            None => cache.world = Some(world.id()),
            Some(bound) => assert!(
                bound == world.id(),
                "query description reused across worlds ({bound:?} then {:?})",
                world.id()
            ),
        }

        // Another writer may have caught up while we waited
        if let Some(matches) = &cache.matches {
            if cache.watermark >= count {
                return Arc::clone(matches);
            }
        }

        let start = if cache.matches.is_some() {
            cache.watermark
        } else {
            0
        };
        let mut found: Vec<ArchetypeMatch> = world.archetypes()[start..count]
            .iter()
            .filter_map(|archetype| self.try_match(archetype, &mut cache.scratch))
            .collect();
        cache.watermark = count;

        let list = match cache.matches.take() {
            None => {
                found.sort_by_key(ArchetypeMatch::sort_key);
                tracing::debug!(
                    scanned = count,
                    matched = found.len(),
                    "populated query match cache"
                );
                Arc::new(found)
            }
            Some(previous) if found.is_empty() => {
                tracing::trace!(watermark = count, "bumped query watermark");
                previous
            }
            Some(previous) => {
                let mut grown = Vec::with_capacity(previous.len() + found.len());
                grown.extend_from_slice(&previous);
                for m in found {
                    let at = grown
                        .binary_search_by_key(&m.sort_key(), ArchetypeMatch::sort_key)
                        .unwrap_or_else(|at| at);
                    grown.insert(at, m);
                }
                tracing::debug!(
                    from = start,
                    to = count,
                    matched = grown.len(),
                    "grew query match cache"
                );
                Arc::new(grown)
            }
        };
        cache.matches = Some(Arc::clone(&list));
        list
    }

    /// Number of live entities across all matching archetypes.
    #[must_use]
    pub fn count(&self, world: &World) -> usize {
        self.archetypes(world)
            .iter()
            .filter_map(|m| world.archetype(m.archetype))
            .map(Archetype::len)
            .sum()
    }

    /// Number of archetypes the cache has examined so far.
    #[must_use]
    pub fn watermark(&self) -> usize {
        self.cache.read().watermark
    }

    /// Starts executing the query against `world`.
    pub fn run<'q, 'w>(&'q self, world: &'w mut World) -> Execution<'q, 'w> {
        Execution::new(self, world)
    }
}
