//! # Component Tuples
//!
//! Execution is generic over a tuple of distinct component types, e.g.
//! `(Position, Velocity)`. One implementation per arity (1 to 16) is
//! generated from a single macro body.

// SAFETY: Tuple implementations turn raw column pointers into references.
// Callers uphold the bounds and aliasing contracts documented per method.
#![allow(unsafe_code)]

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use archon_core::{component_id, Component, ComponentId, FrozenComponentSet};
use parking_lot::RwLock;

/// Largest supported tuple arity.
pub const MAX_ARITY: usize = 16;

/// Component identifiers of one tuple type, computed once per process.
#[derive(Clone)]
struct TupleIds {
    declared: Arc<[ComponentId]>,
    sorted: FrozenComponentSet,
}

fn tuple_ids<Q: 'static>(compute: impl FnOnce() -> Vec<ComponentId>) -> TupleIds {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, TupleIds>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    let key = TypeId::of::<Q>();
    if let Some(ids) = cache.read().get(&key) {
        return ids.clone();
    }

    let declared = compute();
    let sorted = FrozenComponentSet::from_ids(&declared);
    assert!(
        sorted.len() == declared.len(),
        "duplicate component type in query tuple {}",
        type_name::<Q>()
    );

    let ids = TupleIds {
        declared: Arc::from(declared),
        sorted,
    };
    cache.write().entry(key).or_insert(ids).clone()
}

/// A tuple of distinct component types that execution can fetch together.
///
/// Every method that touches raw pointers takes one pointer per tuple
/// element, in declared order, each pointing at the start of that
/// component's column.
pub trait ComponentTuple: Sized + 'static {
    /// Number of components in the tuple.
    const ARITY: usize;

    /// One mutable reference per component.
    type Refs<'a>;

    /// One mutable column slice per component.
    type Slices<'a>;

    /// One mutable slice of vectors per component.
    type Vectors<'a, V: 'a>;

    /// Component identifiers in declared order.
    ///
    /// # Panics
    ///
    /// Panics if the tuple names the same component type twice.
    fn component_ids() -> Arc<[ComponentId]>;

    /// Component identifiers sorted ascending.
    ///
    /// # Panics
    ///
    /// Panics if the tuple names the same component type twice.
    fn sorted_component_ids() -> FrozenComponentSet;

    /// Builds references to row `row` of every column.
    ///
    /// # Safety
    ///
    /// `columns` holds `ARITY` pointers to live columns of the matching
    /// types with more than `row` elements, and nothing else aliases those
    /// elements for `'a`.
    unsafe fn refs<'a>(columns: &[NonNull<u8>], row: usize) -> Self::Refs<'a>;

    /// Builds slices over the first `len` elements of every column.
    ///
    /// # Safety
    ///
    /// As for [`ComponentTuple::refs`], with at least `len` elements per
    /// column and no aliasing of any of them for `'a`.
    unsafe fn slices<'a>(columns: &[NonNull<u8>], len: usize) -> Self::Slices<'a>;

    /// Builds slices of `len` vectors per column.
    ///
    /// # Safety
    ///
    /// `columns` holds `ARITY` pointers aligned for `V`, each covering at
    /// least `len` initialized vectors that nothing else aliases for `'a`.
    unsafe fn vectors<'a, V: 'a>(columns: &[NonNull<V>], len: usize) -> Self::Vectors<'a, V>;
}

macro_rules! substitute {
    ($_ignored:ident, $ty:ty) => {
        $ty
    };
}

macro_rules! impl_component_tuple {
    ($($name:ident $index:tt),+) => {
        impl<$($name: Component),+> ComponentTuple for ($($name,)+) {
            const ARITY: usize = [$($index),+].len();

            type Refs<'a> = ($(&'a mut $name,)+);
            type Slices<'a> = ($(&'a mut [$name],)+);
            type Vectors<'a, V: 'a> = ($(substitute!($name, &'a mut [V]),)+);

            fn component_ids() -> Arc<[ComponentId]> {
                tuple_ids::<Self>(|| vec![$(component_id::<$name>()),+]).declared
            }

            fn sorted_component_ids() -> FrozenComponentSet {
                tuple_ids::<Self>(|| vec![$(component_id::<$name>()),+]).sorted
            }

            #[inline]
            unsafe fn refs<'a>(columns: &[NonNull<u8>], row: usize) -> Self::Refs<'a> {
                debug_assert!(columns.len() >= Self::ARITY);
                ($(&mut *columns[$index].as_ptr().cast::<$name>().add(row),)+)
            }

            #[inline]
            unsafe fn slices<'a>(columns: &[NonNull<u8>], len: usize) -> Self::Slices<'a> {
                debug_assert!(columns.len() >= Self::ARITY);
                ($(std::slice::from_raw_parts_mut(columns[$index].as_ptr().cast::<$name>(), len),)+)
            }

            #[inline]
            unsafe fn vectors<'a, V: 'a>(
                columns: &[NonNull<V>],
                len: usize,
            ) -> Self::Vectors<'a, V> {
                debug_assert!(columns.len() >= Self::ARITY);
                ($(std::slice::from_raw_parts_mut(columns[$index].as_ptr(), len),)+)
            }
        }
    };
}

impl_component_tuple!(A 0);
impl_component_tuple!(A 0, B 1);
impl_component_tuple!(A 0, B 1, C 2);
impl_component_tuple!(A 0, B 1, C 2, D 3);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11, M 12);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11, M 12, N 13);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11, M 12, N 13, O 14);
impl_component_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11, M 12, N 13, O 14, P 15);
