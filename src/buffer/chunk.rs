use std::fmt;
use std::fmt::Formatter;

use crate::error::BlockError;
use crate::types::{DType, NativeType};

/// A typed, contiguous memory region.
///
/// The byte length is always a multiple of the element size; the element
/// count is derived from it. The backing storage is made of `u64` words so
/// every supported element type can be viewed in place.
#[derive(Clone)]
pub struct BufferChunk {
    dtype: DType,
    words: Vec<u64>,
    len: usize,
}

const WORD: usize = std::mem::size_of::<u64>();

impl BufferChunk {
    /// Allocates a zeroed chunk of `elements` elements of `dtype`.
    pub fn new(dtype: DType, elements: usize) -> Result<Self, BlockError> {
        let alloc_error = || BlockError::Allocation { dtype, elements };
        let len = elements.checked_mul(dtype.size()).ok_or_else(alloc_error)?;
        let word_count = len.div_ceil(WORD);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| alloc_error())?;
        words.resize(word_count, 0);
        Ok(BufferChunk { dtype, words, len })
    }

    pub fn from_slice<T: NativeType>(values: &[T]) -> Result<Self, BlockError> {
        let mut chunk = Self::new(T::DTYPE, values.len())?;
        chunk
            .as_bytes_mut()
            .copy_from_slice(bytemuck::cast_slice(values));
        Ok(chunk)
    }

    /// Concatenates chunks of the same data type into one.
    pub fn concat<'a>(
        dtype: DType,
        chunks: impl IntoIterator<Item = &'a BufferChunk>,
    ) -> Result<Self, BlockError> {
        let chunks: Vec<_> = chunks.into_iter().collect();
        if let Some(chunk) = chunks.iter().find(|c| c.dtype != dtype) {
            return Err(BlockError::TypeMismatch {
                expected: dtype,
                actual: chunk.dtype,
            });
        }
        let elements = chunks.iter().map(|c| c.elements()).sum();
        let mut result = Self::new(dtype, elements)?;
        let mut offset = 0;
        for chunk in chunks {
            let bytes = chunk.as_bytes();
            result.as_bytes_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
            offset += bytes.len();
        }
        Ok(result)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Byte length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elements(&self) -> usize {
        self.len / self.dtype.size()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..len]
    }

    /// Views the chunk as a slice of `T`.
    ///
    /// The caller vouches that `T` is the declared element type. Only the
    /// element size is checked.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not have the element size of the chunk.
    pub fn as_slice<T: NativeType>(&self) -> &[T] {
        self.assert_element_size::<T>();
        bytemuck::cast_slice(self.as_bytes())
    }

    /// Mutable counterpart of [`BufferChunk::as_slice`].
    pub fn as_mut_slice<T: NativeType>(&mut self) -> &mut [T] {
        self.assert_element_size::<T>();
        bytemuck::cast_slice_mut(self.as_bytes_mut())
    }

    /// Checked view: fails unless `T` is exactly the declared data type.
    pub fn try_as_slice<T: NativeType>(&self) -> Result<&[T], BlockError> {
        if T::DTYPE != self.dtype {
            return Err(BlockError::TypeMismatch {
                expected: self.dtype,
                actual: T::DTYPE,
            });
        }
        Ok(bytemuck::cast_slice(self.as_bytes()))
    }

    /// Copies the first `elements` elements into a new chunk.
    pub fn prefix(&self, elements: usize) -> Result<Self, BlockError> {
        let elements = elements.min(self.elements());
        let mut chunk = Self::new(self.dtype, elements)?;
        let len = chunk.len;
        chunk.as_bytes_mut().copy_from_slice(&self.as_bytes()[..len]);
        Ok(chunk)
    }

    /// Shortens the chunk to at most `elements` elements.
    pub fn truncate(&mut self, elements: usize) {
        self.len = self.len.min(elements * self.dtype.size());
    }

    fn assert_element_size<T: NativeType>(&self) {
        assert_eq!(
            std::mem::size_of::<T>(),
            self.dtype.size(),
            "cannot view a {} chunk as {}",
            self.dtype,
            T::DTYPE
        );
    }
}

impl PartialEq for BufferChunk {
    fn eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype && self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for BufferChunk {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferChunk")
            .field("dtype", &self.dtype)
            .field("elements", &self.elements())
            .finish()
    }
}
