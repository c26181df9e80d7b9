//! Serde configuration for the file blocks and the pipeline binary.
//!
//! A pipeline is described in JSON, for example:
//!
//! ```json
//! {
//!   "source": { "dtype": "complex_float32", "path": "in.bin", "rewind": false },
//!   "sink": { "path": "out.bin", "append": true },
//!   "max_timeout_ms": 50,
//!   "chunk_elements": 4096
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stream::{WorkInfo, DEFAULT_MAX_TIMEOUT};
use crate::types::DType;

fn default_true() -> bool {
    true
}

fn default_max_timeout_ms() -> u64 {
    DEFAULT_MAX_TIMEOUT.as_millis() as u64
}

fn default_chunk_elements() -> usize {
    crate::stream::DEFAULT_CHUNK_ELEMENTS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub dtype: DType,
    #[serde(default)]
    pub path: String,
    /// Auto rewind at end of file.
    #[serde(default)]
    pub rewind: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    #[serde(default)]
    pub path: String,
    /// Saving does not occur if disabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Append to an existing file instead of truncating it.
    #[serde(default)]
    pub append: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    #[serde(default = "default_chunk_elements")]
    pub chunk_elements: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("chunk_elements must be positive")]
    EmptyChunks,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        if config.chunk_elements == 0 {
            return Err(ConfigError::EmptyChunks);
        }
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn work_info(&self) -> WorkInfo {
        WorkInfo::new(Duration::from_millis(self.max_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_json(
            r#"{ "source": { "dtype": "int" }, "sink": { "path": "out.bin" } }"#,
        )
        .unwrap();
        assert_eq!(config.source.dtype, DType::INT32);
        assert_eq!(config.source.path, "");
        assert!(!config.source.rewind);
        assert!(config.sink.enabled);
        assert!(!config.sink.append);
        assert_eq!(config.work_info(), WorkInfo::default());
        assert_eq!(config.chunk_elements, crate::stream::DEFAULT_CHUNK_ELEMENTS);
    }

    #[test]
    fn test_full_config() {
        let config = PipelineConfig::from_json(
            r#"{
                "source": { "dtype": "complex_float32", "path": "in.bin", "rewind": true },
                "sink": { "path": "out.bin", "enabled": false, "append": true },
                "max_timeout_ms": 5,
                "chunk_elements": 64
            }"#,
        )
        .unwrap();
        assert_eq!(config.source.dtype, DType::COMPLEX_FLOAT32);
        assert!(config.source.rewind);
        assert!(!config.sink.enabled);
        assert!(config.sink.append);
        assert_eq!(config.work_info().max_timeout, Duration::from_millis(5));
        assert_eq!(config.chunk_elements, 64);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::from_json(
                r#"{ "source": { "dtype": "string" }, "sink": {} }"#
            ),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            PipelineConfig::from_json(
                r#"{ "source": { "dtype": "int8" }, "sink": {}, "chunk_elements": 0 }"#
            ),
            Err(ConfigError::EmptyChunks)
        ));
        assert!(matches!(
            PipelineConfig::from_path("/definitely/not/here.json"),
            Err(ConfigError::Read { .. })
        ));
    }
}
