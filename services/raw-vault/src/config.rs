//! Engine configuration
//!
//! Plain structs with defaults, optionally loaded from a JSON file. Missing
//! keys fall back to the defaults below.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Snapshot retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Number of vault snapshots kept after each run.
    pub keep_last: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { keep_last: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fetch attempts per entity before the entity is reported failed.
    pub max_fetch_attempts: u32,
    /// Pause between fetch attempts.
    pub retry_backoff_ms: u64,
    /// Run independent entity types of one stage on separate threads.
    pub parallel_stages: bool,
    pub snapshot: SnapshotConfig,
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` overrides it.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fetch_attempts: 3,
            retry_backoff_ms: 0,
            parallel_stages: true,
            snapshot: SnapshotConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fetch_attempts == 0 {
            return Err(ConfigError::Invalid("max_fetch_attempts must be at least 1".into()));
        }
        if self.snapshot.keep_last == 0 {
            return Err(ConfigError::Invalid("snapshot.keep_last must be at least 1".into()));
        }
        Ok(())
    }
}
