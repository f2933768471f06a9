//! # Configuration Management Module
//!
//! Persistent application settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `database_dir`: Where the session database lives (platform data dir when unset)
//! - `database_name` / `database_version`: Store identity passed to the backend
//! - `body_weight_kg`: Weight used by the calorie estimate
//! - `sample_interval_ms`: Requested motion sensor sampling interval
//! - `heart_rate_min` / `heart_rate_max`: Warning thresholds (bpm)
//! - `[stroke]`: Stroke detector thresholds and timing
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/rallytrack/config.toml
//! - Linux: ~/.config/rallytrack/config.toml
//! - Windows: %APPDATA%\rallytrack\config.toml

use crate::calories::DEFAULT_WEIGHT_KG;
use crate::error::ConfigError;
use crate::stroke::StrokeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "rallytrack";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_dir: Option<PathBuf>,
    pub database_name: String,
    pub database_version: u32,
    pub body_weight_kg: f64,
    pub sample_interval_ms: u64,
    pub heart_rate_min: u32,
    pub heart_rate_max: u32,
    pub stroke: StrokeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_dir: None,
            database_name: "rallytrack.db".to_string(),
            database_version: 1,
            body_weight_kg: DEFAULT_WEIGHT_KG,
            sample_interval_ms: 20,
            heart_rate_min: 60,
            heart_rate_max: 180,
            stroke: StrokeConfig::default(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Directory holding the session database
    pub fn resolved_database_dir(&self) -> PathBuf {
        match &self.database_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR),
        }
    }

    /// Load config from the platform location, or create default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the platform location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }
}
