//! Chunks served straight out of a memory-mapped file.
//!
//! A [`MappedBuffer`] maps a whole file and hands out its contents in
//! element-sized pieces, front to back. A circular buffer wraps around at
//! the end of the file and never runs dry.

use std::fs::OpenOptions;

use memmap2::{Mmap, MmapMut};
use serde::{Deserialize, Serialize};

use crate::buffer::BufferChunk;
use crate::error::BlockError;
use crate::types::DType;

const BLOCK: &str = "MappedBuffer";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MappedArgs {
    pub path: String,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default)]
    pub writeable: bool,
    #[serde(default)]
    pub circular: bool,
}

fn default_true() -> bool {
    true
}

enum Mapping {
    /// Zero-length files cannot be mapped.
    Empty,
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn bytes(&self) -> &[u8] {
        match self {
            Mapping::Empty => &[],
            Mapping::ReadOnly(map) => &map[..],
            Mapping::ReadWrite(map) => &map[..],
        }
    }
}

pub struct MappedBuffer {
    dtype: DType,
    path: String,
    map: Mapping,
    /// Mapped bytes in use, rounded down to whole elements.
    len: usize,
    circular: bool,
    /// Bytes popped so far, modulo `len` when circular.
    offset: usize,
}

impl MappedBuffer {
    pub fn open(dtype: DType, args: &MappedArgs) -> Result<Self, BlockError> {
        if !args.readable && !args.writeable {
            return Err(BlockError::Configuration {
                block: BLOCK,
                reason: "mapping must be readable, writeable or both",
            });
        }
        let io_error = |op| {
            let path = args.path.clone();
            move |source| BlockError::Io { op, path, source }
        };
        let file = OpenOptions::new()
            .read(true)
            .write(args.writeable)
            .open(&args.path)
            .map_err(|source| BlockError::Open {
                path: args.path.clone(),
                source,
            })?;
        let file_len = file.metadata().map_err(io_error("fstat"))?.len() as usize;

        // SAFETY: the mapping is only valid while no other process truncates
        // the file; callers own the files they map.
        let map = if file_len == 0 {
            Mapping::Empty
        } else if args.writeable {
            Mapping::ReadWrite(unsafe { MmapMut::map_mut(&file) }.map_err(io_error("mmap"))?)
        } else {
            Mapping::ReadOnly(unsafe { Mmap::map(&file) }.map_err(io_error("mmap"))?)
        };
        Ok(MappedBuffer {
            dtype,
            path: args.path.clone(),
            map,
            len: file_len - file_len % dtype.size(),
            circular: args.circular,
            offset: 0,
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Mapped size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_circular(&self) -> bool {
        self.circular
    }

    /// Whether every element has been popped. Never true when circular.
    pub fn is_drained(&self) -> bool {
        !self.circular && self.offset == self.len
    }

    /// Byte offset of the next element to pop.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Moves the read position. The offset must fall on an element
    /// boundary inside the file.
    pub fn set_offset(&mut self, offset: usize) -> Result<(), BlockError> {
        if self.len > 0 && offset >= self.len {
            return Err(BlockError::Configuration {
                block: BLOCK,
                reason: "offset beyond the end of the mapped file",
            });
        }
        if offset % self.dtype.size() != 0 {
            return Err(BlockError::Configuration {
                block: BLOCK,
                reason: "offset is not on an element boundary",
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Copies out the next `elements` elements.
    ///
    /// Near the end of a non-circular file only the remaining elements are
    /// returned, and `None` once it is drained. A circular buffer wraps to
    /// the start of the file as often as needed.
    pub fn pop(&mut self, elements: usize) -> Result<Option<BufferChunk>, BlockError> {
        if self.len == 0 || self.is_drained() {
            return Ok(None);
        }
        let wanted = elements * self.dtype.size();
        let total = if self.circular {
            wanted
        } else {
            wanted.min(self.len - self.offset)
        };
        let mut chunk = BufferChunk::new(self.dtype, total / self.dtype.size())?;
        let bytes = self.map.bytes();
        let mut filled = 0;
        while filled < total {
            let n = (total - filled).min(self.len - self.offset);
            chunk.as_bytes_mut()[filled..filled + n]
                .copy_from_slice(&bytes[self.offset..self.offset + n]);
            filled += n;
            self.offset += n;
            if self.circular && self.offset == self.len {
                self.offset = 0;
            }
        }
        Ok(Some(chunk))
    }

    /// Stores `chunk` at the current offset and advances past it. A
    /// non-circular buffer stores only what fits before the end of the file.
    /// Returns the number of elements stored.
    pub fn write(&mut self, chunk: &BufferChunk) -> Result<usize, BlockError> {
        if chunk.dtype().size() != self.dtype.size() {
            return Err(BlockError::TypeMismatch {
                expected: self.dtype,
                actual: chunk.dtype(),
            });
        }
        let map = match &mut self.map {
            Mapping::ReadWrite(map) => map,
            Mapping::Empty => return Ok(0),
            Mapping::ReadOnly(_) => {
                return Err(BlockError::Configuration {
                    block: BLOCK,
                    reason: "mapping is not writeable",
                })
            }
        };
        let data = chunk.as_bytes();
        let total = if self.circular {
            data.len()
        } else {
            data.len().min(self.len - self.offset)
        };
        let mut stored = 0;
        while stored < total {
            let n = (total - stored).min(self.len - self.offset);
            map[self.offset..self.offset + n].copy_from_slice(&data[stored..stored + n]);
            stored += n;
            self.offset += n;
            if self.circular && self.offset == self.len {
                self.offset = 0;
            }
        }
        Ok(total / self.dtype.size())
    }

    /// Writes modified pages back to the file.
    pub fn flush(&self) -> Result<(), BlockError> {
        match &self.map {
            Mapping::ReadWrite(map) => map.flush().map_err(|source| BlockError::Io {
                op: "msync",
                path: self.path.clone(),
                source,
            }),
            _ => Ok(()),
        }
    }
}
