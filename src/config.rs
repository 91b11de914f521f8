// Engine configuration with TOML file support

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::file_storage;

const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Namespace directory for durable state. Falls back to a `brd-engine`
    /// directory under the platform-local data dir when unset.
    pub data_dir: Option<PathBuf>,
    /// Bounded wait for one backend generation call, in seconds
    pub generation_timeout_secs: u64,
    /// De-duplicate appended citations by `(source_id, locator)`
    pub dedupe_citations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_dir: None,
            generation_timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            dedupe_citations: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing keys fall back to
    /// defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config {:?}: {}", path, e)))?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.generation_timeout_secs == 0 {
            return Err(EngineError::Config(
                "generation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The namespace root this configuration points at
    pub fn data_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(file_storage::default_data_root)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}
