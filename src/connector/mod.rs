pub mod fd;
mod file_sink;
mod file_source;

pub use file_sink::BinaryFileSink;
pub use file_source::BinaryFileSource;
pub use fd::WriteMode;

use crate::error::BlockError;

/// Lifecycle state shared by the file blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// No path and no handle.
    Unconfigured,
    /// A path is set but the block is not activated.
    Configured,
    /// Activated with an open handle.
    Active,
    /// Activated, but opening the path failed. Turns yield until the
    /// block is reconfigured.
    Degraded,
}

impl EndpointState {
    fn of(path: &str, has_handle: bool, activated: bool) -> Self {
        match (has_handle, activated) {
            (true, _) => EndpointState::Active,
            (false, true) => EndpointState::Degraded,
            (false, false) if path.is_empty() => EndpointState::Unconfigured,
            (false, false) => EndpointState::Configured,
        }
    }
}

/// Configuration and lifecycle operations the hosting engine invokes on a
/// file block. Work turns are block specific.
#[allow(async_fn_in_trait)]
pub trait StreamBlock {
    fn state(&self) -> EndpointState;

    fn file_path(&self) -> &str;

    /// Opens the configured path.
    ///
    /// Fails only when the path is empty. An open failure is logged and
    /// leaves the block [`EndpointState::Degraded`]. Activating an active
    /// block does nothing.
    async fn activate(&mut self) -> Result<(), BlockError>;

    /// Releases the handle. Safe to call in any state.
    async fn deactivate(&mut self);

    /// Sets the path. An activated block is reopened on the new path
    /// before this returns.
    async fn set_file_path(&mut self, path: impl Into<String>) -> Result<(), BlockError>;

    /// Closes the current handle and opens the configured path again.
    async fn reconfigure(&mut self) -> Result<(), BlockError> {
        self.deactivate().await;
        self.activate().await
    }
}
