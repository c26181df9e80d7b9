use std::fmt::Debug;

use bytemuck::{Pod, Zeroable};

use crate::types::DType;

/// A Rust type whose in-memory layout is exactly the native byte layout of
/// one element of [`NativeType::DTYPE`].
pub trait NativeType: Pod + PartialEq + Debug + Send + Sync + 'static {
    const DTYPE: DType;
}

/// Interleaved complex element, real part first.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub const fn new(re: T, im: T) -> Self {
        Complex { re, im }
    }
}

// SAFETY: `repr(C)` with two fields of the same type has no padding.
unsafe impl<T: Zeroable> Zeroable for Complex<T> {}
unsafe impl<T: Pod> Pod for Complex<T> {}

macro_rules! impl_native {
    ($($t:ty => $dtype:ident),*) => {
        $(impl NativeType for $t {
            const DTYPE: DType = DType::$dtype;
        })*
    }
}

#[rustfmt::skip]
impl_native!(
    i8 => INT8, i16 => INT16, i32 => INT32, i64 => INT64,
    u8 => UINT8, u16 => UINT16, u32 => UINT32, u64 => UINT64,
    f32 => FLOAT32, f64 => FLOAT64,
    Complex<i8> => COMPLEX_INT8, Complex<i16> => COMPLEX_INT16,
    Complex<i32> => COMPLEX_INT32, Complex<i64> => COMPLEX_INT64,
    Complex<f32> => COMPLEX_FLOAT32, Complex<f64> => COMPLEX_FLOAT64
);
