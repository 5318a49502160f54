//! Kernel configuration, loadable from TOML.
//!
//! ```toml
//! [atomspace]
//! max_atoms = 100000
//!
//! [attention]
//! funded = true
//! decay_rate = 0.99
//!
//! [attention.bounds]
//! sti_max = 1000.0
//!
//! [scheduler]
//! memory_regions = 32
//! ```
//!
//! Every table and field is optional; missing values take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atomspace::AtomSpaceConfig;
use crate::attention::AttentionConfig;
use crate::error::ConfigError;
use crate::scheduler::SchedulerConfig;

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration for a [`Kernel`](crate::kernel::Kernel).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub atomspace: AtomSpaceConfig,
    pub attention: AttentionConfig,
    pub scheduler: SchedulerConfig,
}

impl KernelConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Self::parse(content, "<inline>")
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<serialize>".into(),
            message: e.to_string(),
        })
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.atomspace.max_atoms == Some(0) {
            return Err(ConfigError::Invalid {
                message: "atomspace.max_atoms must be > 0 (omit it for an unbounded store)".into(),
            });
        }
        self.attention
            .validate()
            .map_err(|message| ConfigError::Invalid { message })?;
        if !(1..=256).contains(&self.scheduler.memory_regions) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "scheduler.memory_regions = {} must be within 1..=256",
                    self.scheduler.memory_regions
                ),
            });
        }
        Ok(())
    }
}
