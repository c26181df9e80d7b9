use log::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::connector::fd::{self, Handle};
use crate::connector::{EndpointState, StreamBlock};
use crate::error::BlockError;
use crate::stream::{OutputBuffer, WorkInfo, WorkStatus};
use crate::types::DType;

/// Reads raw elements of one data type from a file into its output stream.
///
/// With auto-rewind enabled the source seeks back to the start of the file
/// whenever it reaches the end, so a finite file becomes an endless stream.
pub struct BinaryFileSource {
    dtype: DType,
    path: String,
    file: Option<Handle>,
    activated: bool,
    rewind: bool,
    /// Bytes read but not yet produced, at most one incomplete element
    /// unless a late read delivered more than the last output could hold.
    carry: Vec<u8>,
}

impl BinaryFileSource {
    pub fn new(dtype: DType) -> Self {
        BinaryFileSource {
            dtype,
            path: String::new(),
            file: None,
            activated: false,
            rewind: false,
            carry: Vec::with_capacity(dtype.size()),
        }
    }

    /// A source reading from an already open file, socket or pipe. It
    /// starts out active and has no path to reopen once deactivated.
    /// Must be called within a tokio runtime.
    pub fn from_std(dtype: DType, file: std::fs::File) -> Result<Self, BlockError> {
        let handle = Handle::new(file).map_err(|source| BlockError::Io {
            op: "adopt",
            path: String::new(),
            source,
        })?;
        let mut source = Self::new(dtype);
        source.file = Some(handle);
        source.activated = true;
        Ok(source)
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        let mut source = Self::new(config.dtype);
        source.path = config.path.clone();
        source.rewind = config.rewind;
        source
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn auto_rewind(&self) -> bool {
        self.rewind
    }

    /// Takes effect at the next end of file.
    pub fn set_auto_rewind(&mut self, rewind: bool) {
        self.rewind = rewind;
    }

    /// One work turn: waits at most `info.max_timeout` for data and fills
    /// `output` with whole elements.
    pub async fn work(&mut self, info: &WorkInfo, output: &mut OutputBuffer<'_>) -> WorkStatus {
        let elem_size = self.dtype.size();
        if output.dtype().size() != elem_size {
            error!(
                "{}: cannot produce {} elements into a {} buffer",
                self.path,
                self.dtype,
                output.dtype()
            );
            return WorkStatus::Yield;
        }
        let Some(file) = self.file.as_mut() else {
            // nothing will ever become readable without a handle
            tokio::time::sleep(info.max_timeout).await;
            return WorkStatus::Yield;
        };
        let capacity = output.capacity() * elem_size;
        if capacity == 0 {
            return WorkStatus::Yield;
        }

        if self.carry.len() < elem_size {
            let wanted = capacity - self.carry.len();
            match file.read(&mut self.carry, wanted, info.max_timeout).await {
                Ok(None) => return WorkStatus::Yield,
                Ok(Some(0)) => return self.end_of_file(),
                Ok(Some(_)) => {}
                Err(source) => {
                    let err = BlockError::Io {
                        op: "read",
                        path: self.path.clone(),
                        source,
                    };
                    error!("{err}");
                    return WorkStatus::Yield;
                }
            }
        }

        let elements = self.carry.len().min(capacity) / elem_size;
        if elements == 0 {
            return WorkStatus::Yield;
        }
        let bytes = elements * elem_size;
        output.bytes_mut()[..bytes].copy_from_slice(&self.carry[..bytes]);
        self.carry.drain(..bytes);
        output.produce(elements);
        WorkStatus::Progress(elements)
    }

    fn end_of_file(&mut self) -> WorkStatus {
        if !self.carry.is_empty() {
            warn!(
                "{}: discarding {} trailing bytes of an incomplete {} element",
                self.path,
                self.carry.len(),
                self.dtype
            );
            self.carry.clear();
        }
        if !self.rewind {
            return WorkStatus::EndOfStream;
        }
        let Some(file) = self.file.as_mut() else {
            return WorkStatus::Yield;
        };
        if let Err(source) = file.rewind() {
            let err = BlockError::Io {
                op: "lseek",
                path: self.path.clone(),
                source,
            };
            error!("{err}");
            return WorkStatus::Yield;
        }
        debug!("{}: rewound to start of file", self.path);
        WorkStatus::Rewound
    }
}

impl StreamBlock for BinaryFileSource {
    fn state(&self) -> EndpointState {
        EndpointState::of(&self.path, self.file.is_some(), self.activated)
    }

    fn file_path(&self) -> &str {
        &self.path
    }

    async fn activate(&mut self) -> Result<(), BlockError> {
        if self.file.is_some() {
            return Ok(());
        }
        if self.path.is_empty() {
            return Err(BlockError::Configuration {
                block: "BinaryFileSource",
                reason: "empty file path",
            });
        }
        self.activated = true;
        self.carry.clear();
        match fd::open_for_read(&self.path).await {
            Ok(file) => {
                info!("opened {} for reading", self.path);
                self.file = Some(file);
            }
            Err(err) => error!("{err}"),
        }
        Ok(())
    }

    /// Closes the descriptor, waiting for a read still in flight.
    async fn deactivate(&mut self) {
        if fd::close(&mut self.file).await {
            debug!("closed {}", self.path);
        }
        self.activated = false;
        self.carry.clear();
    }

    async fn set_file_path(&mut self, path: impl Into<String>) -> Result<(), BlockError> {
        self.path = path.into();
        if self.activated {
            self.reconfigure().await
        } else {
            Ok(())
        }
    }
}
