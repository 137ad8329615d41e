//! Configuration System
//!
//! Layered configuration for the engine, status storage and logging.
//! Defaults, the global file, workspace files and `ATTUNE__SECTION__KEY`
//! environment variables are merged in that order.

use crate::logging::LoggingConfig;
use crate::tree::path::validate_name;
use crate::tree::PathAddress;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttuneConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tree layout and worker call settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tag of the status document root
    #[serde(default = "default_root_tag")]
    pub root_tag: String,

    /// Tag of each worker node under the root
    #[serde(default = "default_worker_tag")]
    pub worker_tag: String,

    /// Tag of the dependency section under the root
    #[serde(default = "default_deps_tag")]
    pub deps_tag: String,

    /// Directory of `<worker>.toml` schema files, relative to the workspace
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Per worker call; unset means no limit
    #[serde(default)]
    pub worker_timeout_secs: Option<u64>,
}

fn default_root_tag() -> String {
    "status".to_string()
}

fn default_worker_tag() -> String {
    "worker".to_string()
}

fn default_deps_tag() -> String {
    "deps".to_string()
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schemas")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_tag: default_root_tag(),
            worker_tag: default_worker_tag(),
            deps_tag: default_deps_tag(),
            schema_dir: default_schema_dir(),
            worker_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Worker-list location, e.g. `/status`.
    pub fn prefix(&self) -> PathAddress {
        PathAddress::from_segments(vec![crate::tree::Segment::new_unchecked(&self.root_tag, None)])
    }

    /// Dependency section location, e.g. `/status/deps`.
    pub fn deps_address(&self) -> PathAddress {
        self.prefix()
            .join(crate::tree::Segment::new_unchecked(&self.deps_tag, None))
    }

    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("root_tag", &self.root_tag),
            ("worker_tag", &self.worker_tag),
            ("deps_tag", &self.deps_tag),
        ] {
            validate_name(value, value).map_err(|e| format!("{}: {}", field, e))?;
        }
        if self.worker_tag == self.deps_tag {
            return Err(format!(
                "worker_tag and deps_tag must differ (both '{}')",
                self.worker_tag
            ));
        }
        if self.schema_dir.as_os_str().is_empty() {
            return Err("Schema directory cannot be empty".to_string());
        }
        if self.worker_timeout_secs == Some(0) {
            return Err("worker_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Storage paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persisted observed status, relative to the workspace unless absolute
    #[serde(default = "default_status_path")]
    pub status_path: PathBuf,
}

fn default_status_path() -> PathBuf {
    PathBuf::from(".attune/status.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            status_path: default_status_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.status_path.as_os_str().is_empty() {
            return Err("Status path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Engine(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Engine(msg) => write!(f, "Engine: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl AttuneConfig {
    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.engine.validate() {
            errors.push(ValidationError::Engine(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "Unknown level '{}'",
                self.logging.level
            )));
        }
        if self.logging.format != "json" && self.logging.format != "text" {
            errors.push(ValidationError::Logging(format!(
                "Unknown format '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Status file location for `workspace_root`.
    pub fn status_path(&self, workspace_root: &Path) -> PathBuf {
        resolve(workspace_root, &self.storage.status_path)
    }

    /// Schema directory location for `workspace_root`.
    pub fn schema_dir(&self, workspace_root: &Path) -> PathBuf {
        resolve(workspace_root, &self.engine.schema_dir)
    }
}

fn resolve(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}
