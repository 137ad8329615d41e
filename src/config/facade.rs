//! Configuration loading entry points.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::AttuneConfig;
use config::{ConfigError, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Builds an [`AttuneConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    ///
    /// Lowest precedence first: defaults, global file, workspace
    /// `config/config.toml`, workspace `config/{ATTUNE_ENV}.toml`, then
    /// `ATTUNE__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<AttuneConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder.add_source(environment()).build()?;
        let loaded: AttuneConfig = config.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(loaded)
    }

    /// Load one explicit file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<AttuneConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn default() -> AttuneConfig {
        AttuneConfig::default()
    }

    /// Location of the global configuration file.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("ATTUNE")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
