//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("engine.root_tag", "status")?
        .set_default("engine.worker_tag", "worker")?
        .set_default("engine.deps_tag", "deps")?
        .set_default("engine.schema_dir", "schemas")?
        .set_default("storage.status_path", ".attune/status.json")
}
