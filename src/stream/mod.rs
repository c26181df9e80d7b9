mod job;

use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::buffer::BufferChunk;
use crate::error::BlockError;
use crate::types::DType;

pub use crate::stream::job::*;

/// The maximum chunk length produced by a source at a time.
pub const DEFAULT_CHUNK_ELEMENTS: usize = 1024;

/// Default wait budget of one work turn.
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_millis(100);

/// What the scheduler grants a block for one work turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkInfo {
    /// Longest time the turn may wait for its file to become ready.
    pub max_timeout: Duration,
}

impl WorkInfo {
    pub fn new(max_timeout: Duration) -> Self {
        WorkInfo { max_timeout }
    }

    pub fn from_nanos(max_timeout_ns: u64) -> Self {
        Self::new(Duration::from_nanos(max_timeout_ns))
    }
}

impl Default for WorkInfo {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TIMEOUT)
    }
}

/// Outcome of one work turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Elements produced (source) or consumed (sink).
    Progress(usize),
    /// Control returned without progress: budget exhausted, no input,
    /// no handle, or an absorbed I/O error.
    Yield,
    /// End of file reached and the source seeked back to the start.
    Rewound,
    /// End of file reached without auto-rewind.
    EndOfStream,
}

impl WorkStatus {
    pub fn elements(&self) -> usize {
        match self {
            WorkStatus::Progress(n) => *n,
            _ => 0,
        }
    }
}

/// A pool chunk lent to a source for one turn.
pub struct OutputBuffer<'a> {
    chunk: &'a mut BufferChunk,
    produced: usize,
}

impl<'a> OutputBuffer<'a> {
    pub fn new(chunk: &'a mut BufferChunk) -> Self {
        OutputBuffer { chunk, produced: 0 }
    }

    pub fn dtype(&self) -> DType {
        self.chunk.dtype()
    }

    /// Capacity in elements.
    pub fn capacity(&self) -> usize {
        self.chunk.elements()
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.chunk.as_bytes_mut()
    }

    /// Declares the first `elements` elements of the buffer as produced.
    pub fn produce(&mut self, elements: usize) {
        assert!(
            elements <= self.capacity(),
            "produced {elements} elements into a buffer of {}",
            self.capacity()
        );
        self.produced = elements;
    }

    pub fn produced(&self) -> usize {
        self.produced
    }
}

/// Elements delivered from upstream and not yet consumed by a sink.
pub struct InputQueue {
    dtype: DType,
    bytes: BytesMut,
}

impl InputQueue {
    pub fn new(dtype: DType) -> Self {
        InputQueue {
            dtype,
            bytes: BytesMut::new(),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn push(&mut self, chunk: &BufferChunk) -> Result<(), BlockError> {
        if chunk.dtype() != self.dtype {
            return Err(BlockError::TypeMismatch {
                expected: self.dtype,
                actual: chunk.dtype(),
            });
        }
        self.bytes.extend_from_slice(chunk.as_bytes());
        Ok(())
    }

    pub fn elements(&self) -> usize {
        self.bytes.len() / self.dtype.size()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw bytes of the queued elements, oldest first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Removes `elements` elements from the front of the queue.
    pub fn consume(&mut self, elements: usize) {
        assert!(
            elements <= self.elements(),
            "consumed {elements} of {} queued elements",
            self.elements()
        );
        self.bytes.advance(elements * self.dtype.size());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_push_consume() {
        let mut queue = InputQueue::new(DType::INT16);
        queue
            .push(&BufferChunk::from_slice(&[1i16, 2, 3]).unwrap())
            .unwrap();
        assert_eq!(queue.elements(), 3);
        queue.consume(2);
        assert_eq!(queue.as_bytes(), &3i16.to_ne_bytes());
        assert!(matches!(
            queue.push(&BufferChunk::from_slice(&[1u8]).unwrap()),
            Err(BlockError::TypeMismatch { .. })
        ));
        queue.consume(1);
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_queue_over_consume_panics() {
        let mut queue = InputQueue::new(DType::UINT8);
        queue.consume(1);
    }

    #[test]
    fn test_output_produce() {
        let mut chunk = BufferChunk::new(DType::FLOAT32, 8).unwrap();
        let mut output = OutputBuffer::new(&mut chunk);
        assert_eq!(output.capacity(), 8);
        assert_eq!(output.bytes_mut().len(), 32);
        output.produce(3);
        assert_eq!(output.produced(), 3);
        assert_eq!(WorkStatus::Progress(3).elements(), 3);
        assert_eq!(WorkStatus::Rewound.elements(), 0);
    }
}
