//! Configuration management
//!
//! Engine tunables (grade scale, threshold, recommendation cap) and storage location.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Recommendation engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Database settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Tunables of the recommendation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grades strictly below this trigger remediation
    #[serde(default = "default_grade_threshold")]
    pub grade_threshold: f64,
    /// Maximum number of resources returned per generation
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,
    #[serde(default = "default_grade_min")]
    pub grade_min: f64,
    #[serde(default = "default_grade_max")]
    pub grade_max: f64,
}

fn default_grade_threshold() -> f64 {
    4.0
}

fn default_max_recommendations() -> usize {
    3
}

fn default_grade_min() -> f64 {
    1.0
}

fn default_grade_max() -> f64 {
    7.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grade_threshold: default_grade_threshold(),
            max_recommendations: default_max_recommendations(),
            grade_min: default_grade_min(),
            grade_max: default_grade_max(),
        }
    }
}

impl EngineConfig {
    /// Check the grade scale, threshold placement and cap
    pub fn validate(&self) -> Result<()> {
        if !(self.grade_min.is_finite() && self.grade_max.is_finite()) || self.grade_min >= self.grade_max {
            anyhow::bail!(
                "Invalid grade scale: min {} must be below max {}",
                self.grade_min,
                self.grade_max
            );
        }
        if !(self.grade_min..=self.grade_max).contains(&self.grade_threshold) {
            anyhow::bail!(
                "Grade threshold {} is outside the grade scale {}..={}",
                self.grade_threshold,
                self.grade_min,
                self.grade_max
            );
        }
        if self.max_recommendations == 0 {
            anyhow::bail!("max_recommendations must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file; defaults to `remediation.db` in the data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved database location
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("remediation.db")),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults if missing
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate().context("Invalid [engine] section")
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "remediation", "remediation").context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.grade_threshold, 4.0);
        assert_eq!(config.engine.max_recommendations, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str("[engine]\nmax_recommendations = 5\n").unwrap();
        assert_eq!(config.engine.max_recommendations, 5);
        assert_eq!(config.engine.grade_threshold, 4.0);
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let mut config = Config::default();
        config.engine.grade_threshold = 5.0;
        config.storage.database_path = Some(dir.path().join("r.db"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.engine, config.engine);
        assert_eq!(loaded.storage.database_path().unwrap(), dir.path().join("r.db"));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut engine = EngineConfig::default();
        engine.grade_threshold = 9.0;
        assert!(engine.validate().is_err());

        let mut engine = EngineConfig::default();
        engine.max_recommendations = 0;
        assert!(engine.validate().is_err());

        let mut engine = EngineConfig::default();
        engine.grade_min = 7.0;
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\ngrade_threshold = 0.5\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
