//! Configuration manager - main API for config operations

use crate::env::{apply_env_overrides, load_env_file};
use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Main configuration manager
///
/// Resolves the config file location and layers the file, the `.env` file
/// and the process environment into one validated [`Config`].
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a new config manager using the default config directory
    ///
    /// - Linux: `~/.config/autom4b/`
    /// - macOS: `~/Library/Application Support/autom4b/`
    /// - Windows: `%APPDATA%\autom4b\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Self::with_directory(config_dir)
    }

    /// Creates a config manager with a custom config directory
    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        Ok(Self {
            persistence: ConfigPersistence::new(config_path),
            config_dir,
        })
    }

    /// Creates a config manager for an explicit config file
    pub fn with_config_file(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            persistence: ConfigPersistence::new(config_path),
            config_dir,
        }
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "autom4b")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Could not determine user config directory".to_string(),
            })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        self.persistence.path()
    }

    /// Loads the configuration file, or the defaults if it doesn't exist
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Saves the configuration atomically after validating it
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Writes a default config file if one doesn't exist
    ///
    /// Returns Ok(true) if a new file was created, Ok(false) if one already exists.
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.save(&Config::default())?;
        log::info!("Generated default config at {}", self.config_path().display());
        Ok(true)
    }

    /// Loads the file, then the optional `.env` file, then the process
    /// environment, and validates the result
    ///
    /// Unlike [`load`](Self::load), an invalid final configuration is an error.
    pub fn load_with_env_overrides(&self, env_file: Option<&Path>) -> ConfigResult<Config> {
        let mut config = self.load()?;

        if let Some(path) = env_file {
            load_env_file(path)?;
        }
        apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;

        config.validate().map_err(|errors| {
            ConfigError::ValidationError(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        Ok(config)
    }
}
