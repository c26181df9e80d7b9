use crate::buffer::BufferChunk;
use crate::error::BlockError;
use crate::stream::OutputBuffer;
use crate::types::DType;

/// Index of a chunk lent out by a [`BufferPool`].
///
/// Not `Clone`: a handle is given back exactly once through
/// [`BufferPool::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct BufferHandle(usize);

/// Engine-side pool of fixed-size output chunks.
///
/// Blocks never own pool memory. They receive an [`OutputBuffer`] that
/// borrows one chunk for the duration of one work turn.
pub struct BufferPool {
    dtype: DType,
    chunk_elements: usize,
    chunks: Vec<BufferChunk>,
    free: Vec<usize>,
}

impl BufferPool {
    pub fn new(dtype: DType, chunk_elements: usize) -> Self {
        BufferPool {
            dtype,
            chunk_elements,
            chunks: vec![],
            free: vec![],
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn chunk_elements(&self) -> usize {
        self.chunk_elements
    }

    /// Number of chunks allocated so far, lent out or not.
    pub fn allocated(&self) -> usize {
        self.chunks.len()
    }

    pub fn acquire(&mut self) -> Result<BufferHandle, BlockError> {
        if let Some(idx) = self.free.pop() {
            return Ok(BufferHandle(idx));
        }
        self.chunks
            .push(BufferChunk::new(self.dtype, self.chunk_elements)?);
        Ok(BufferHandle(self.chunks.len() - 1))
    }

    pub fn chunk(&self, handle: &BufferHandle) -> &BufferChunk {
        &self.chunks[handle.0]
    }

    /// Lends the chunk behind `handle` to a block for one work turn.
    pub fn output(&mut self, handle: &BufferHandle) -> OutputBuffer<'_> {
        OutputBuffer::new(&mut self.chunks[handle.0])
    }

    pub fn release(&mut self, handle: BufferHandle) {
        debug_assert!(!self.free.contains(&handle.0), "chunk released twice");
        self.free.push(handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recycles_released_chunks() {
        let mut pool = BufferPool::new(DType::INT32, 16);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.chunk(&a).elements(), 16);

        pool.release(a);
        let c = pool.acquire().unwrap();
        assert_eq!(c, BufferHandle(0));
        assert_eq!(pool.allocated(), 2);
        pool.release(b);
        pool.release(c);
    }

    #[test]
    fn test_output_borrows_chunk() {
        let mut pool = BufferPool::new(DType::UINT8, 4);
        let handle = pool.acquire().unwrap();
        {
            let mut output = pool.output(&handle);
            output.bytes_mut().copy_from_slice(&[1, 2, 3, 4]);
            output.produce(4);
        }
        assert_eq!(pool.chunk(&handle).as_slice::<u8>(), &[1, 2, 3, 4]);
        pool.release(handle);
    }
}
