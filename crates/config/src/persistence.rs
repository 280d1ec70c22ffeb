//! File system persistence for configuration
//!
//! Config files are written through a temporary file in the same directory
//! and renamed into place, so a crash never leaves a half-written file.

use crate::{Config, ConfigError, ConfigResult, CONFIG_VERSION};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Handles configuration file persistence
pub struct ConfigPersistence {
    config_path: PathBuf,
}

impl ConfigPersistence {
    /// Creates a new persistence handler for the given config file path
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Loads configuration from file
    ///
    /// A missing file yields the defaults. An empty or unparseable file is
    /// an error.
    pub fn load(&self) -> ConfigResult<Config> {
        if !self.config_path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        let contents =
            fs::read_to_string(&self.config_path).map_err(|e| ConfigError::ReadError {
                path: self.config_path.clone(),
                source: e,
            })?;

        if contents.trim().is_empty() {
            return Err(ConfigError::ReadError {
                path: self.config_path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Config file is empty or contains only whitespace",
                ),
            });
        }

        let config: Config = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: self.config_path.clone(),
            source: e,
        })?;

        if config.version > CONFIG_VERSION {
            log::warn!(
                "Config version {} is newer than supported version {}",
                config.version,
                CONFIG_VERSION
            );
        }

        Ok(config)
    }

    /// Saves configuration to file atomically
    ///
    /// Invalid configurations are refused.
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        config.validate().map_err(|errors| {
            ConfigError::ValidationError(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                self.ensure_directory_exists(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(config)?;
        let temp_file = self.create_temp_file()?;
        self.write_atomic(temp_file, &toml_string)?;

        log::info!("Config saved to {}", self.config_path.display());
        Ok(())
    }

    fn ensure_directory_exists(&self, path: &Path) -> ConfigResult<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| ConfigError::DirectoryCreationError {
                path: path.to_path_buf(),
                source: e,
            })?;
            log::info!("Created config directory: {}", path.display());
        }
        Ok(())
    }

    fn create_temp_file(&self) -> ConfigResult<NamedTempFile> {
        let dir = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            Some(_) => Path::new("."),
            None => {
                return Err(ConfigError::PathResolutionError {
                    reason: "Config path has no parent directory".to_string(),
                })
            }
        };

        NamedTempFile::new_in(dir).map_err(ConfigError::IoError)
    }

    fn write_atomic(&self, mut temp_file: NamedTempFile, content: &str) -> ConfigResult<()> {
        temp_file.write_all(content.as_bytes())?;
        temp_file.flush()?;

        temp_file
            .persist(&self.config_path)
            .map_err(|e| ConfigError::WriteError {
                path: self.config_path.clone(),
                source: e.error,
            })?;

        Ok(())
    }
}
