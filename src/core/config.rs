//! Configuration types for bobbin.
//!
//! Every section is optional in YAML; missing keys fall back to the defaults
//! below, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{BobbinError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BobbinConfig {
    /// How the renamer is launched
    pub renamer: RenamerConfig,
    /// Scheduling and scratch space
    pub execution: ExecutionConfig,
    /// Remapped-artifact cache
    pub cache: CacheConfig,
}

impl BobbinConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BobbinError::io(format!("Failed to read config file: {}", path.display()), e)
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(Into::into)
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|e| {
            BobbinError::io(format!("Failed to write config file: {}", path.display()), e)
        })
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.renamer.validate()?;
        self.execution.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

/// Renamer launch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenamerConfig {
    /// Program to spawn
    pub program: PathBuf,
    /// Arguments placed before the argument-file path
    pub args: Vec<String>,
    /// Tool identity; part of every cache key
    pub version: String,
}

impl Default for RenamerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("bobbin-remap"),
            args: Vec::new(),
            version: format!("bobbin-remap/{}", crate::VERSION),
        }
    }
}

impl RenamerConfig {
    fn validate(&self) -> Result<()> {
        if self.program.as_os_str().is_empty() {
            return Err(BobbinError::config_field(
                "renamer program must not be empty",
                "renamer.program",
            ));
        }
        if self.version.trim().is_empty() {
            return Err(BobbinError::config_field(
                "renamer version must not be empty",
                "renamer.version",
            ));
        }
        Ok(())
    }
}

/// Scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Remaps allowed to run at once
    pub max_concurrency: usize,
    /// Parent of the per-invocation scratch directories
    pub scratch_dir: PathBuf,
    /// Rename parameters and local variables
    pub remap_locals: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism().map_or(1, usize::from),
            scratch_dir: std::env::temp_dir(),
            remap_locals: true,
        }
    }
}

impl ExecutionConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(BobbinError::config_field(
                "max_concurrency must be greater than 0",
                "execution.max_concurrency",
            ));
        }
        if self.scratch_dir.as_os_str().is_empty() {
            return Err(BobbinError::config_field(
                "scratch_dir must not be empty",
                "execution.scratch_dir",
            ));
        }
        Ok(())
    }
}

/// Artifact cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Reuse previously remapped artifacts
    pub enabled: bool,
    /// Root of the artifact store
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            enabled: true,
            directory: base.join("bobbin").join("artifacts"),
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.directory.as_os_str().is_empty() {
            return Err(BobbinError::config_field(
                "cache directory must be set when the cache is enabled",
                "cache.directory",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BobbinConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.execution.remap_locals);
        assert!(config.cache.enabled);
        assert!(config.cache.directory.ends_with("bobbin/artifacts"));
        assert_eq!(config.renamer.program, PathBuf::from("bobbin-remap"));
        assert!(config.renamer.version.starts_with("bobbin-remap/"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobbin.yml");
        let mut config = BobbinConfig::default();
        config.renamer.args = vec!["-jar".to_string(), "remapper.jar".to_string()];
        config.execution.max_concurrency = 3;
        config.to_yaml_file(&path).unwrap();
        assert_eq!(BobbinConfig::from_yaml_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobbin.yml");
        std::fs::write(&path, "execution:\n  remap_locals: false\n").unwrap();
        let config = BobbinConfig::from_yaml_file(&path).unwrap();
        assert!(!config.execution.remap_locals);
        assert_eq!(config.renamer, RenamerConfig::default());
        assert!(config.execution.max_concurrency >= 1);
    }

    #[test]
    fn test_empty_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobbin.yml");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(
            BobbinConfig::from_yaml_file(&path).unwrap(),
            BobbinConfig::default()
        );
    }

    #[test]
    fn test_validation_names_the_field() {
        let mut config = BobbinConfig::default();
        config.execution.max_concurrency = 0;
        match config.validate().unwrap_err() {
            BobbinError::Config { field, .. } => {
                assert_eq!(field.as_deref(), Some("execution.max_concurrency"));
            }
            other => panic!("Expected Config error, got {other:?}"),
        }

        let mut config = BobbinConfig::default();
        config.renamer.version = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BobbinConfig::from_yaml_file(dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, BobbinError::Io { .. }));
    }
}
