use std::io;

use crate::types::DType;

/// Errors raised by buffers and streaming blocks.
///
/// `Configuration`, `Allocation` and `TypeMismatch` are returned to callers
/// as hard failures. The blocks log `Open` and `Io` and carry on: a failed
/// open leaves the block degraded, a failed call makes a turn without
/// progress.
#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    #[error("{block}: {reason}")]
    Configuration {
        block: &'static str,
        reason: &'static str,
    },
    #[error("open({path}) failed -- {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{op}({path}) failed -- {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to allocate {elements} elements of {dtype}")]
    Allocation { dtype: DType, elements: usize },
    #[error("data type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: DType, actual: DType },
}

/// The error type of a spawned streaming job.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("block error: {0}")]
    Block(#[from] BlockError),
    #[error("job task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
