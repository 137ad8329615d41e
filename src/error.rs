//! Error types for the Attune reconciliation engine.
//!
//! Structural errors (addresses, trees, schemas) and planning errors abort a
//! cycle before dispatch. Worker errors never escape dispatch; they are folded
//! into per-unit reports.

use thiserror::Error;

/// Address parsing and manipulation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Malformed address {input:?}: {reason}")]
    Malformed { input: String, reason: String },

    #[error("Address {address} is not under prefix {prefix}")]
    NotUnderPrefix { address: String, prefix: String },

    #[error("{prefix} is not a prefix of {address}")]
    NotAPrefix { address: String, prefix: String },

    #[error("Last segment of {0} carries no id")]
    MissingId(String),

    #[error("Address has no segments")]
    Empty,
}

impl AddressError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        AddressError::Malformed {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Restricted-tree errors
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Malformed tree: {0}")]
    Malformed(String),

    #[error("Address not found in tree: {0}")]
    NotFound(String),

    #[error("Mixed content at {0}: a node holds either text or children")]
    MixedContent(String),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Failed to parse tree document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Planning errors: fatal to the cycle, raised before any dispatch
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("No work-unit boundary above {0}")]
    NoWorkUnitAncestor(String),

    #[error("Unsatisfiable dependency: {src} {op} {tgt}")]
    UnsatisfiableDependency {
        src: String,
        tgt: String,
        op: String,
    },

    #[error("Unknown dependency operator: {0}")]
    UnknownDependencyOperator(String),

    #[error("Dependency cycle among work units: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Schema for worker '{worker}': {reason}")]
    Schema { worker: String, reason: String },

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),
}

/// Persisted status errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors reported by a worker collaborator. Local to the batch that raised them.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("{0}")]
    Failed(String),

    #[error("Worker unreachable: {0}")]
    Unreachable(String),

    #[error("Worker '{0}' timed out")]
    TimedOut(String),
}

/// Top-level errors surfaced by the reconciler and the CLI
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
