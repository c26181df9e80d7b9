use log::{debug, error, info, warn};

use crate::config::SinkConfig;
use crate::connector::fd::{self, Handle};
use crate::connector::{EndpointState, StreamBlock, WriteMode};
use crate::error::BlockError;
use crate::stream::{InputQueue, WorkInfo, WorkStatus};

/// Writes the raw bytes of its input stream to a file.
pub struct BinaryFileSink {
    path: String,
    file: Option<Handle>,
    activated: bool,
    enabled: bool,
    mode: WriteMode,
    /// Bytes of the head element already written by a short write.
    head_written: usize,
}

impl Default for BinaryFileSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryFileSink {
    pub fn new() -> Self {
        BinaryFileSink {
            path: String::new(),
            file: None,
            activated: false,
            enabled: true,
            mode: WriteMode::default(),
            head_written: 0,
        }
    }

    /// A sink writing to an already open file, socket or pipe. It starts
    /// out active and has no path to reopen once deactivated.
    /// Must be called within a tokio runtime.
    pub fn from_std(file: std::fs::File) -> Result<Self, BlockError> {
        let handle = Handle::new(file).map_err(|source| BlockError::Io {
            op: "adopt",
            path: String::new(),
            source,
        })?;
        let mut sink = Self::new();
        sink.file = Some(handle);
        sink.activated = true;
        Ok(sink)
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        let mut sink = Self::new();
        sink.path = config.path.clone();
        sink.enabled = config.enabled;
        sink.mode = if config.append {
            WriteMode::Append
        } else {
            WriteMode::Truncate
        };
        sink
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A disabled sink consumes its input without writing it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn write_mode(&self) -> WriteMode {
        self.mode
    }

    /// Applies at the next activation.
    pub fn set_write_mode(&mut self, mode: WriteMode) {
        self.mode = mode;
    }

    /// One work turn: writes the queued elements, waiting at most
    /// `info.max_timeout`, and consumes the whole elements the OS accepted.
    pub async fn work(&mut self, info: &WorkInfo, input: &mut InputQueue) -> WorkStatus {
        let available = input.elements();
        if available == 0 {
            return WorkStatus::Yield;
        }
        if !self.enabled {
            input.consume(available);
            self.head_written = 0;
            return WorkStatus::Progress(available);
        }
        let Some(file) = self.file.as_mut() else {
            tokio::time::sleep(info.max_timeout).await;
            return WorkStatus::Yield;
        };

        let elem_size = input.dtype().size();
        let pending = &input.as_bytes()[self.head_written..];
        let written = match file.write(pending, info.max_timeout).await {
            Ok(Some(n)) => n,
            Ok(None) => return WorkStatus::Yield,
            Err(source) => {
                let err = BlockError::Io {
                    op: "write",
                    path: self.path.clone(),
                    source,
                };
                error!("{err}");
                return WorkStatus::Yield;
            }
        };

        let total = self.head_written + written;
        let consumed = total / elem_size;
        self.head_written = total % elem_size;
        if consumed == 0 {
            return WorkStatus::Yield;
        }
        input.consume(consumed);
        WorkStatus::Progress(consumed)
    }
}

impl StreamBlock for BinaryFileSink {
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
                block: "BinaryFileSink",
                reason: "empty file path",
            });
        }
        self.activated = true;
        self.head_written = 0;
        match fd::open_for_write(&self.path, self.mode).await {
            Ok(file) => {
                info!("opened {} for writing ({:?})", self.path, self.mode);
                self.file = Some(file);
            }
            Err(err) => error!("{err}"),
        }
        Ok(())
    }

    /// Closes the descriptor once a write still in flight has finished.
    async fn deactivate(&mut self) {
        if fd::close(&mut self.file).await {
            debug!("closed {}", self.path);
        }
        if self.head_written > 0 {
            warn!(
                "{}: closed after writing {} bytes of an element",
                self.path, self.head_written
            );
            self.head_written = 0;
        }
        self.activated = false;
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
