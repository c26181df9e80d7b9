pub mod buffer;
pub mod config;
pub mod connector;
mod error;
pub mod stream;
pub mod testing;
pub mod types;

pub use self::error::{BlockError, JobError};
