//! Notebook configuration for marginalia
//!
//! Configuration lives in `config.toml` at the notebook root. A missing file
//! means defaults.

pub mod types;

use std::fs;
use std::path::Path;

use crate::bail_invalid;
use crate::error::{MarginaliaError, Result};

pub use types::{
    CompactionConfig, IndexConfig, NotebookConfig, QueryConfig, StorageConfig, SyncMode,
    NOTEBOOK_FORMAT_VERSION,
};

/// File name of the notebook configuration
pub const CONFIG_FILE: &str = "config.toml";

impl NotebookConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: NotebookConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from a notebook root, falling back to defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MarginaliaError::Other(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.version > NOTEBOOK_FORMAT_VERSION {
            bail_invalid!("config version", self.version);
        }
        let ratio = self.compaction.tombstone_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            bail_invalid!("compaction.tombstone_ratio", ratio);
        }
        if self.query.default_limit == Some(0) {
            bail_invalid!("query.default_limit", 0);
        }
        if self.compaction.vacuum_step_pages == 0 {
            bail_invalid!("compaction.vacuum_step_pages", 0);
        }
        Ok(())
    }
}
