//! autom4b configuration system
//!
//! Configuration is layered: built-in defaults, then the TOML config file,
//! then a `.env` file and the process environment, then CLI flags applied
//! by the binary. Each section implements [`ConfigSection`] for validation
//! and merging.
//!
//! # Example
//!
//! ```rust,no_run
//! use autom4b_config::ConfigManager;
//!
//! let manager = ConfigManager::new().expect("Failed to initialize config");
//! let config = manager
//!     .load_with_env_overrides(None)
//!     .expect("Invalid configuration");
//!
//! println!("Watching {}", config.paths.inbox_dir.display());
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

pub mod env;

// Config sections
pub mod app_config;
pub mod conversion_config;
pub mod paths_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::ConfigManager;
pub use validation::{ConfigSection, Validator};

pub use app_config::{AppConfig, LogLevel};
pub use conversion_config::{ConversionConfig, OnComplete, OverwriteMode};
pub use paths_config::PathsConfig;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Config file format version
    pub version: u32,

    /// Loop timing and run mode
    pub app: AppConfig,

    /// Inbox and output folders
    pub paths: PathsConfig,

    /// Inbox policy and converter settings
    pub conversion: ConversionConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the entire configuration
    ///
    /// Returns all validation errors found across all sections.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.app.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.paths.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.conversion.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges this config with another, preferring values from `other`
    pub fn merge(&mut self, other: Config) {
        self.app.merge(other.app);
        self.paths.merge(other.paths);
        self.conversion.merge(other.conversion);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppConfig::default(),
            paths: PathsConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}
