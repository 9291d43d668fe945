//! # Component Sets
//!
//! Sorted, duplicate-free collections of [`ComponentId`]s.
//!
//! Every set operation is a linear merge over two sorted slices, so no
//! operation here hashes or re-sorts. [`ComponentSet`] is the growable
//! builder form; [`FrozenComponentSet`] is the immutable, cheaply cloned
//! form used as archetype signatures and cached match data.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::Arc;

use super::component::ComponentId;

// ============================================================================
// SORTED MERGE PRIMITIVES
// ============================================================================

fn is_superset(haystack: &[ComponentId], needles: &[ComponentId]) -> bool {
    if needles.len() > haystack.len() {
        return false;
    }
    let mut h = 0;
    for needle in needles {
        loop {
            match haystack.get(h).map(|id| id.cmp(needle)) {
                Some(Ordering::Less) => h += 1,
                Some(Ordering::Equal) => {
                    h += 1;
                    break;
                }
                Some(Ordering::Greater) | None => return false,
            }
        }
    }
    true
}

fn overlaps(a: &[ComponentId], b: &[ComponentId]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => return true,
        }
    }
    false
}

fn intersect(a: &[ComponentId], b: &[ComponentId], out: &mut Vec<ComponentId>) {
    out.clear();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
}

fn single(ids: &[ComponentId]) -> Option<ComponentId> {
    match ids {
        [only] => Some(*only),
        _ => None,
    }
}

// ============================================================================
// MUTABLE SET
// ============================================================================

/// Growable sorted set of component identifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ComponentSet {
    ids: Vec<ComponentId>,
}

impl ComponentSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Creates an empty set with room for `capacity` identifiers.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
        }
    }

    /// Builds a set from identifiers in any order. Duplicates collapse.
    #[must_use]
    pub fn from_ids(ids: &[ComponentId]) -> Self {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    /// Inserts an identifier, keeping the set sorted.
    ///
    /// Returns `false` if it was already present.
    pub fn insert(&mut self, id: ComponentId) -> bool {
        match self.ids.binary_search(&id) {
            Ok(_) => false,
            Err(at) => {
                self.ids.insert(at, id);
                true
            }
        }
    }

    /// Checks membership.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Number of identifiers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Checks if the set is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates identifiers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids.iter().copied()
    }

    /// The sorted identifiers.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[ComponentId] {
        &self.ids
    }

    /// Removes every identifier, keeping the allocation.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Checks whether every identifier in `other` is in this set.
    #[inline]
    #[must_use]
    pub fn is_superset_of(&self, other: &[ComponentId]) -> bool {
        is_superset(&self.ids, other)
    }

    /// Checks whether the sets share at least one identifier.
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &[ComponentId]) -> bool {
        overlaps(&self.ids, other)
    }

    /// Writes `self ∩ other` into `out`, replacing its contents.
    pub fn intersect_into(&self, other: &[ComponentId], out: &mut ComponentSet) {
        intersect(&self.ids, other, &mut out.ids);
    }

    /// Adds every identifier of `other`.
    pub fn union_with(&mut self, other: &[ComponentId]) {
        if other.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(self.ids.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.len() {
            match self.ids[i].cmp(&other[j]) {
                Ordering::Less => {
                    merged.push(self.ids[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    merged.push(other[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    merged.push(self.ids[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.ids[i..]);
        merged.extend_from_slice(&other[j..]);
        self.ids = merged;
    }

    /// Returns the only identifier if the set has exactly one.
    #[inline]
    #[must_use]
    pub fn single(&self) -> Option<ComponentId> {
        single(&self.ids)
    }

    /// Copies the set into an immutable shared form.
    #[must_use]
    pub fn freeze(&self) -> FrozenComponentSet {
        FrozenComponentSet(Arc::from(self.ids.as_slice()))
    }
}

impl FromIterator<ComponentId> for ComponentSet {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        let ids: Vec<ComponentId> = iter.into_iter().collect();
        Self::from_ids(&ids)
    }
}

// ============================================================================
// FROZEN SET
// ============================================================================

/// Immutable sorted set of component identifiers.
///
/// Cloning shares the backing storage. Hashes and compares like the
/// underlying slice, so maps keyed by it can be probed with `&[ComponentId]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrozenComponentSet(Arc<[ComponentId]>);

impl Default for FrozenComponentSet {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl FrozenComponentSet {
    /// Freezes identifiers given in any order. Duplicates collapse.
    #[must_use]
    pub fn from_ids(ids: &[ComponentId]) -> Self {
        ComponentSet::from_ids(ids).freeze()
    }

    /// Checks membership.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// Number of identifiers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks if the set is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates identifiers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.0.iter().copied()
    }

    /// The sorted identifiers.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[ComponentId] {
        &self.0
    }

    /// Checks whether every identifier in `other` is in this set.
    #[inline]
    #[must_use]
    pub fn is_superset_of(&self, other: &[ComponentId]) -> bool {
        is_superset(&self.0, other)
    }

    /// Checks whether the sets share at least one identifier.
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &[ComponentId]) -> bool {
        overlaps(&self.0, other)
    }

    /// Writes `self ∩ other` into `out`, replacing its contents.
    pub fn intersect_into(&self, other: &[ComponentId], out: &mut ComponentSet) {
        intersect(&self.0, other, &mut out.ids);
    }

    /// Returns the only identifier if the set has exactly one.
    #[inline]
    #[must_use]
    pub fn single(&self) -> Option<ComponentId> {
        single(&self.0)
    }

    /// Copies the set back into a growable form.
    #[must_use]
    pub fn thaw(&self) -> ComponentSet {
        ComponentSet {
            ids: self.0.to_vec(),
        }
    }
}

impl Borrow<[ComponentId]> for FrozenComponentSet {
    fn borrow(&self) -> &[ComponentId] {
        &self.0
    }
}

impl AsRef<[ComponentId]> for FrozenComponentSet {
    fn as_ref(&self) -> &[ComponentId] {
        &self.0
    }
}
