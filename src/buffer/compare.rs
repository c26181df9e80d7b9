//! Element-wise comparison of buffer chunks for verifying round trips.

use std::fmt::Debug;

use itertools::Itertools;
use num_traits::Float;

use crate::buffer::BufferChunk;
use crate::types::{Complex, DType, NativeType};

/// The first difference found between an expected and an actual chunk.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Mismatch {
    #[error("data type mismatch: expected {expected}, got {actual}")]
    DType { expected: DType, actual: DType },
    #[error("element count mismatch: expected {expected}, got {actual}")]
    Elements { expected: usize, actual: usize },
    #[error("element {index} differs: expected {expected}, got {actual}")]
    Value {
        index: usize,
        expected: String,
        actual: String,
    },
}

/// Element types that can be compared within a tolerance.
pub trait Tolerance: NativeType {
    type Epsilon: Copy + Debug;

    fn is_close(&self, other: &Self, epsilon: Self::Epsilon) -> bool;
}

macro_rules! impl_tolerance_int {
    ($($t:ty => $eps:ty),*) => {
        $(impl Tolerance for $t {
            type Epsilon = $eps;

            fn is_close(&self, other: &Self, epsilon: $eps) -> bool {
                self.abs_diff(*other) <= epsilon
            }
        })*
    }
}

impl_tolerance_int!(
    i8 => u8, i16 => u16, i32 => u32, i64 => u64,
    u8 => u8, u16 => u16, u32 => u32, u64 => u64
);

fn float_close<F: Float>(a: F, b: F, epsilon: F) -> bool {
    // equal infinities have a NaN difference
    a == b || (a - b).abs() <= epsilon
}

impl Tolerance for f32 {
    type Epsilon = f32;

    fn is_close(&self, other: &Self, epsilon: f32) -> bool {
        float_close(*self, *other, epsilon)
    }
}

impl Tolerance for f64 {
    type Epsilon = f64;

    fn is_close(&self, other: &Self, epsilon: f64) -> bool {
        float_close(*self, *other, epsilon)
    }
}

impl<F> Tolerance for Complex<F>
where
    F: Float + Debug,
    Complex<F>: NativeType,
{
    type Epsilon = F;

    /// Compares the modulus of the difference.
    fn is_close(&self, other: &Self, epsilon: F) -> bool {
        self == other || (self.re - other.re).hypot(self.im - other.im) <= epsilon
    }
}

fn check_shape(expected: &BufferChunk, actual: &BufferChunk) -> Result<(), Mismatch> {
    if expected.dtype() != actual.dtype() {
        return Err(Mismatch::DType {
            expected: expected.dtype(),
            actual: actual.dtype(),
        });
    }
    if expected.elements() != actual.elements() {
        return Err(Mismatch::Elements {
            expected: expected.elements(),
            actual: actual.elements(),
        });
    }
    Ok(())
}

fn first_difference<T, F>(
    expected: &BufferChunk,
    actual: &BufferChunk,
    same: F,
) -> Result<(), Mismatch>
where
    T: NativeType,
    F: Fn(&T, &T) -> bool,
{
    check_shape(expected, actual)?;
    match expected
        .as_slice::<T>()
        .iter()
        .zip_eq(actual.as_slice::<T>())
        .find_position(|&(e, a)| !same(e, a))
    {
        Some((index, (e, a))) => Err(Mismatch::Value {
            index,
            expected: format!("{e:?}"),
            actual: format!("{a:?}"),
        }),
        None => Ok(()),
    }
}

/// Exact comparison, for integral and fixed-point types.
pub fn compare_equal<T: NativeType>(
    expected: &BufferChunk,
    actual: &BufferChunk,
) -> Result<(), Mismatch> {
    first_difference::<T, _>(expected, actual, |e, a| e == a)
}

/// Comparison within `epsilon`, for floating-point types.
pub fn compare_close<T: Tolerance>(
    expected: &BufferChunk,
    actual: &BufferChunk,
    epsilon: T::Epsilon,
) -> Result<(), Mismatch> {
    first_difference::<T, _>(expected, actual, |e, a| e.is_close(a, epsilon))
}

#[track_caller]
pub fn assert_chunks_equal<T: NativeType>(expected: &BufferChunk, actual: &BufferChunk) {
    if let Err(mismatch) = compare_equal::<T>(expected, actual) {
        panic!("buffer chunks differ: {mismatch}");
    }
}

#[track_caller]
pub fn assert_chunks_close<T: Tolerance>(
    expected: &BufferChunk,
    actual: &BufferChunk,
    epsilon: T::Epsilon,
) {
    if let Err(mismatch) = compare_close::<T>(expected, actual, epsilon) {
        panic!("buffer chunks differ: {mismatch}");
    }
}
