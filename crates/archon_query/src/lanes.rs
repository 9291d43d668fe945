//! # SIMD Lanes
//!
//! Fixed-width vector types and the checked reinterpretation of component
//! columns as runs of those vectors.

// SAFETY: The vector types implement `Pod` by hand. Each is `repr(C)`
// around a scalar array whose size is a multiple of its alignment.
#![allow(unsafe_code)]
//!
//! ## Column Split
//!
//! ```text
//! column bytes:  [ e0 | e1 | e2 | e3 | e4 ]            (5 entities x 12 bytes)
//! as f32:        [ s0 s1 s2 .. s14 ]                    (15 scalars)
//! as F32x4:      [ v0 | v1 | v2 ] [ s12 s13 s14 ]       (3 vectors + 3 leftover)
//! ```
//!
//! Every cast goes through bytemuck, which checks length and alignment.
//! Column starts are 64-byte aligned, which satisfies every vector type here.
//!
//! ## Register Layout
//!
//! `F32x4` has the size and alignment of `__m128`, and `F32x8` those of
//! `__m256`. On x86_64 their arithmetic goes through `std::arch` (SSE always,
//! AVX when the target enables it). Every other vector and target uses a
//! lane loop.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign};

use bytemuck::{Pod, PodCastError, Zeroable};

/// A fixed-width vector of `LANES` scalars.
pub trait SimdVector: Pod + Send + Sync + fmt::Debug + PartialEq {
    /// Element type of each lane.
    type Scalar: Pod + Send + Sync + fmt::Debug + PartialEq;

    /// Number of scalars per vector.
    const LANES: usize;

    /// Vector with every lane set to `value`.
    fn splat(value: Self::Scalar) -> Self;

    /// The lanes as a slice.
    fn lanes(&self) -> &[Self::Scalar];

    /// The lanes as a mutable slice.
    fn lanes_mut(&mut self) -> &mut [Self::Scalar];
}

macro_rules! simd_vector {
    ($(#[$meta:meta])* $name:ident, $scalar:ty, $lanes:literal, $align:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq)]
        #[repr(C, align($align))]
        pub struct $name(pub [$scalar; $lanes]);

        // SAFETY: all-zero bytes are a valid scalar array
        unsafe impl Zeroable for $name {}
        // SAFETY: repr(C) over a Pod array with size == align * k, so no padding
        unsafe impl Pod for $name {}

        impl Default for $name {
            fn default() -> Self {
                Self::zeroed()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }

        impl From<[$scalar; $lanes]> for $name {
            fn from(lanes: [$scalar; $lanes]) -> Self {
                Self(lanes)
            }
        }

        impl SimdVector for $name {
            type Scalar = $scalar;
            const LANES: usize = $lanes;

            #[inline]
            fn splat(value: $scalar) -> Self {
                Self([value; $lanes])
            }

            #[inline]
            fn lanes(&self) -> &[$scalar] {
                &self.0
            }

            #[inline]
            fn lanes_mut(&mut self) -> &mut [$scalar] {
                &mut self.0
            }
        }
    };
}

macro_rules! lane_ops {
    (@impl $(#[$attr:meta])* $name:ident, $op:ident $method:ident $assign:ident $assign_method:ident |$a:ident, $b:ident| $body:expr) => {
        $(#[$attr])*
        impl $op for $name {
            type Output = Self;

            #[inline]
            fn $method(self, rhs: Self) -> Self {
                Self(std::array::from_fn(|i| {
                    let ($a, $b) = (self.0[i], rhs.0[i]);
                    $body
                }))
            }
        }

        $(#[$attr])*
        impl $assign for $name {
            #[inline]
            fn $assign_method(&mut self, rhs: Self) {
                *self = $op::$method(*self, rhs);
            }
        }
    };
    (@arch $(#[$attr:meta])* $name:ident, $op:ident $method:ident $assign:ident $assign_method:ident $load:ident $store:ident $intrinsic:ident) => {
        $(#[$attr])*
        impl $op for $name {
            type Output = Self;

            #[inline]
            fn $method(self, rhs: Self) -> Self {
                use std::arch::x86_64::{$intrinsic, $load, $store};

                let mut out = Self::default();
                // SAFETY: each array is exactly one register wide, the loads
                // and stores are unaligned, and the cfg guarantees the feature
                unsafe {
                    let v = $intrinsic($load(self.0.as_ptr()), $load(rhs.0.as_ptr()));
                    $store(out.0.as_mut_ptr(), v);
                }
                out
            }
        }

        $(#[$attr])*
        impl $assign for $name {
            #[inline]
            fn $assign_method(&mut self, rhs: Self) {
                *self = $op::$method(*self, rhs);
            }
        }
    };
    // f32 vectors with a register path: intrinsics under `cfg`, lane loop otherwise
    ($name:ident, f32, [$($cfg:tt)*], $load:ident $store:ident $add:ident $sub:ident $mul:ident) => {
        lane_ops!(@arch #[cfg($($cfg)*)] $name, Add add AddAssign add_assign $load $store $add);
        lane_ops!(@arch #[cfg($($cfg)*)] $name, Sub sub SubAssign sub_assign $load $store $sub);
        lane_ops!(@arch #[cfg($($cfg)*)] $name, Mul mul MulAssign mul_assign $load $store $mul);
        lane_ops!(@impl #[cfg(not($($cfg)*))] $name, Add add AddAssign add_assign |a, b| a + b);
        lane_ops!(@impl #[cfg(not($($cfg)*))] $name, Sub sub SubAssign sub_assign |a, b| a - b);
        lane_ops!(@impl #[cfg(not($($cfg)*))] $name, Mul mul MulAssign mul_assign |a, b| a * b);
    };
    ($name:ident, float) => {
        lane_ops!(@impl $name, Add add AddAssign add_assign |a, b| a + b);
        lane_ops!(@impl $name, Sub sub SubAssign sub_assign |a, b| a - b);
        lane_ops!(@impl $name, Mul mul MulAssign mul_assign |a, b| a * b);
    };
    ($name:ident, int) => {
        lane_ops!(@impl $name, Add add AddAssign add_assign |a, b| a.wrapping_add(b));
        lane_ops!(@impl $name, Sub sub SubAssign sub_assign |a, b| a.wrapping_sub(b));
        lane_ops!(@impl $name, Mul mul MulAssign mul_assign |a, b| a.wrapping_mul(b));
    };
}

simd_vector!(
    /// Four `f32` lanes (SSE width).
    F32x4, f32, 4, 16
);
simd_vector!(
    /// Eight `f32` lanes (AVX width).
    F32x8, f32, 8, 32
);
simd_vector!(
    /// Four `i32` lanes.
    I32x4, i32, 4, 16
);
simd_vector!(
    /// Eight `i32` lanes.
    I32x8, i32, 8, 32
);
simd_vector!(
    /// Four `u32` lanes.
    U32x4, u32, 4, 16
);
simd_vector!(
    /// Eight `u32` lanes.
    U32x8, u32, 8, 32
);
simd_vector!(
    /// Two `f64` lanes.
    F64x2, f64, 2, 16
);
simd_vector!(
    /// Four `f64` lanes.
    F64x4, f64, 4, 32
);

lane_ops!(
    F32x4, f32, [target_arch = "x86_64"],
    _mm_loadu_ps _mm_storeu_ps _mm_add_ps _mm_sub_ps _mm_mul_ps
);
lane_ops!(
    F32x8, f32, [all(target_arch = "x86_64", target_feature = "avx")],
    _mm256_loadu_ps _mm256_storeu_ps _mm256_add_ps _mm256_sub_ps _mm256_mul_ps
);
lane_ops!(F64x2, float);
lane_ops!(F64x4, float);
lane_ops!(I32x4, int);
lane_ops!(I32x8, int);
lane_ops!(U32x4, int);
lane_ops!(U32x8, int);

/// Widest `f32` vector the compile target supports.
#[cfg(target_feature = "avx")]
pub type NativeF32 = F32x8;

/// Widest `f32` vector the compile target supports.
#[cfg(not(target_feature = "avx"))]
pub type NativeF32 = F32x4;

/// Where a callback's vectors sit within a chunk's columns.
///
/// The full pass reports `offset == 0` and `leftover == 0`. The tail pass
/// hands the callback one scratch vector per component whose first
/// `leftover` lanes are the column's trailing scalars; the remaining lanes
/// are zero and are discarded afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneInfo {
    /// Scalar offset of the tail's first lane within one entity's component.
    pub offset: usize,
    /// Live lanes in the tail vector. Zero on the full pass.
    pub leftover: usize,
}

impl LaneInfo {
    /// Checks whether this is the tail pass.
    #[inline]
    #[must_use]
    pub fn is_tail(&self) -> bool {
        self.leftover > 0
    }

    /// Zero-filled lanes past `leftover` in a tail vector of type `V`.
    #[inline]
    #[must_use]
    pub fn padding_lanes<V: SimdVector>(&self) -> usize {
        if self.leftover == 0 {
            0
        } else {
            V::LANES - self.leftover
        }
    }
}

/// One column split into whole vectors and a scalar tail.
pub(crate) struct ColumnLanes<'a, V: SimdVector> {
    pub(crate) vectors: &'a mut [V],
    pub(crate) tail: &'a mut [V::Scalar],
    /// Total scalars in the column.
    pub(crate) total: usize,
}

/// Reinterprets a column's live bytes as vectors plus leftover scalars.
pub(crate) fn split_column<V: SimdVector>(
    bytes: &mut [u8],
) -> Result<ColumnLanes<'_, V>, PodCastError> {
    let scalars: &mut [V::Scalar] = bytemuck::try_cast_slice_mut(bytes)?;
    let total = scalars.len();
    let vectored = total - total % V::LANES;
    let (head, tail) = scalars.split_at_mut(vectored);
    let vectors: &mut [V] = bytemuck::try_cast_slice_mut(head)?;
    Ok(ColumnLanes {
        vectors,
        tail,
        total,
    })
}

/// Copies tail scalars into a zeroed vector.
pub(crate) fn load_tail<V: SimdVector>(tail: &[V::Scalar]) -> V {
    let mut vector = V::zeroed();
    vector.lanes_mut()[..tail.len()].copy_from_slice(tail);
    vector
}

/// Copies the first `tail.len()` lanes back over the tail scalars.
pub(crate) fn store_tail<V: SimdVector>(vector: &V, tail: &mut [V::Scalar]) {
    let len = tail.len();
    tail.copy_from_slice(&vector.lanes()[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_layouts() {
        assert_eq!(std::mem::size_of::<F32x4>(), 16);
        assert_eq!(std::mem::align_of::<F32x8>(), 32);
        assert_eq!(std::mem::size_of::<F64x4>(), 32);
        assert!(archon_core::COLUMN_ALIGN % std::mem::align_of::<NativeF32>() == 0);
    }

    #[test]
    fn test_lane_arithmetic() {
        let a = F32x4::from([1.0, 2.0, 3.0, 4.0]);
        let mut b = a + F32x4::splat(1.0);
        b *= F32x4::splat(2.0);
        assert_eq!(b, F32x4::from([4.0, 6.0, 8.0, 10.0]));

        let wrapped = U32x4::splat(u32::MAX) + U32x4::splat(2);
        assert_eq!(wrapped.lanes(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_f32_ops_match_lane_by_lane() {
        let a4 = F32x4::from([1.5, -2.25, 1e-3, 3.0e7]);
        let b4 = F32x4::from([0.5, 4.0, -7.0, 0.125]);
        for (i, (&x, &y)) in a4.0.iter().zip(b4.0.iter()).enumerate() {
            assert_eq!((a4 + b4).0[i].to_bits(), (x + y).to_bits());
            assert_eq!((a4 - b4).0[i].to_bits(), (x - y).to_bits());
            assert_eq!((a4 * b4).0[i].to_bits(), (x * y).to_bits());
        }

        let a8 = F32x8::from([1.0, 2.0, 3.0, 4.0, -5.0, 6.5, 0.0, 1e10]);
        let b8 = F32x8::from([8.0, 0.25, -1.0, 3.5, 2.0, -0.5, 9.0, 1e-10]);
        let mut acc = a8;
        acc *= b8;
        acc += b8;
        acc -= a8;
        for i in 0..F32x8::LANES {
            let (x, y) = (a8.0[i], b8.0[i]);
            assert_eq!(acc.0[i].to_bits(), (x * y + y - x).to_bits());
        }
    }

    #[test]
    fn test_split_column_with_leftover() {
        let mut storage = [F32x4::zeroed(); 4];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut storage);
        // 15 scalars: 3 whole vectors and 3 leftover
        let split = split_column::<F32x4>(&mut bytes[..60]).unwrap();
        assert_eq!(split.vectors.len(), 3);
        assert_eq!(split.tail.len(), 3);
        assert_eq!(split.total, 15);
    }

    #[test]
    fn test_split_rejects_ragged_bytes() {
        let mut storage = [F32x4::zeroed(); 1];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut storage);
        assert!(split_column::<F32x4>(&mut bytes[..6]).is_err());
    }

    #[test]
    fn test_tail_round_trip() {
        let mut tail = [1.0f32, 2.0];
        let mut vector = load_tail::<F32x4>(&tail);
        assert_eq!(vector.lanes(), &[1.0, 2.0, 0.0, 0.0]);
        vector.lanes_mut()[0] = 9.0;
        vector.lanes_mut()[3] = 7.0;
        store_tail(&vector, &mut tail);
        assert_eq!(tail, [9.0, 2.0]);
    }

    #[test]
    fn test_lane_info_padding() {
        let info = LaneInfo {
            offset: 0,
            leftover: 3,
        };
        assert!(info.is_tail());
        assert_eq!(info.padding_lanes::<F32x8>(), 5);
        assert_eq!(LaneInfo::default().padding_lanes::<F32x8>(), 0);
    }
}
