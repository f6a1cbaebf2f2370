//! Configuration Layer Management
//!
//! Layers, lowest priority first: built-in defaults, the configuration file
//! (explicit `--config` or an implicit `.bobbin.yml`/`.bobbin.yaml`), then
//! command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::cli::args::RemapArgs;
use bobbin_rs::BobbinConfig;

const IMPLICIT_CONFIG_FILES: [&str; 2] = [".bobbin.yml", ".bobbin.yaml"];

/// Apply command-line overrides on top of a loaded configuration
pub trait ApplyOverrides {
    /// Overwrite every setting the arguments specify
    fn apply_to(&self, config: &mut BobbinConfig);
}

impl ApplyOverrides for RemapArgs {
    fn apply_to(&self, config: &mut BobbinConfig) {
        if let Some(program) = &self.renamer {
            config.renamer.program.clone_from(program);
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.execution.max_concurrency = max_concurrency;
        }
        if let Some(scratch_dir) = &self.scratch_dir {
            config.execution.scratch_dir.clone_from(scratch_dir);
        }
        if self.no_remap_locals {
            config.execution.remap_locals = false;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

/// Configuration file in effect: the explicit one, else the first implicit one present
pub fn config_file_in(explicit: Option<&Path>, dir: &Path) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => IMPLICIT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists()),
    }
}

/// Load defaults and the configuration file, without command-line overrides
pub fn load_configuration(explicit: Option<&Path>) -> anyhow::Result<BobbinConfig> {
    let config = match config_file_in(explicit, Path::new(".")) {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            BobbinConfig::from_yaml_file(&path).with_context(|| {
                format!("Failed to load configuration from {}", path.display())
            })?
        }
        None => BobbinConfig::default(),
    };
    Ok(config)
}

/// Full layered configuration for a remap, validated
pub fn build_layered_config(
    explicit: Option<&Path>,
    overrides: &dyn ApplyOverrides,
) -> anyhow::Result<BobbinConfig> {
    let mut config = load_configuration(explicit)?;
    overrides.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
