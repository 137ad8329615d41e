//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_classification, format_cycle_report, format_plan, format_validation_result,
    ValidationResult,
};
use crate::config::{AttuneConfig, ConfigLoader};
use crate::diff::DiffEngine;
use crate::error::{ApiError, StorageError};
use crate::reconcile::Reconciler;
use crate::schedule::extract_dependencies;
use crate::schema::{WorkerDeclaration, WorkerSchema};
use crate::tree::ConfigTree;
use crate::worker::{RecordingWorker, WorkerRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace root and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: AttuneConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &AttuneConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands, format: &str) -> Result<String, ApiError> {
        if format != "text" && format != "json" {
            return Err(ApiError::ConfigError(format!(
                "Invalid output format: {} (must be 'text' or 'json')",
                format
            )));
        }
        match command {
            Commands::Diff {
                observed,
                desired,
                all,
            } => {
                let observed = read_tree(observed)?;
                let mut desired = read_tree(desired)?;
                extract_dependencies(&mut desired, &self.config.engine.deps_address())?;
                let classification = DiffEngine::compare(&observed, &desired)?;
                format_classification(&classification, *all, format)
            }
            Commands::Plan { desired, observed } => {
                self.ensure_valid()?;
                let reconciler = self.reconciler(WorkerRegistry::new())?;
                let desired = read_tree(desired)?;
                let observed = match observed {
                    Some(path) => read_tree(path)?,
                    None => reconciler.store().load()?,
                };
                let plan = reconciler.plan(desired, observed)?;
                format_plan(&plan, format)
            }
            Commands::Simulate { desired } => {
                self.ensure_valid()?;
                let desired = read_tree(desired)?;
                let registry = self.recording_registry(&desired);
                let reconciler = self.reconciler(registry)?;
                let runtime = tokio::runtime::Runtime::new().map_err(|e| {
                    ApiError::ConfigError(format!("Failed to start async runtime: {}", e))
                })?;
                let report = runtime.block_on(reconciler.run_cycle(desired))?;
                info!(
                    units = report.unit_count,
                    failed = report.failures().len(),
                    "Simulation finished"
                );
                format_cycle_report(&report, reconciler.store().path(), format)
            }
            Commands::Validate { file } => {
                let result = match file {
                    Some(path) => self.validate_file(path)?,
                    None => self.validate_configuration(),
                };
                format_validation_result(&result, format)
            }
        }
    }

    fn reconciler(&self, registry: WorkerRegistry) -> Result<Reconciler, ApiError> {
        Reconciler::from_config(&self.config, &self.workspace_root, registry)
    }

    fn ensure_valid(&self) -> Result<(), ApiError> {
        self.config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })
    }

    /// One recording worker per worker node found in `desired` or declared
    /// in the schema directory.
    fn recording_registry(&self, desired: &ConfigTree) -> WorkerRegistry {
        let engine = &self.config.engine;
        let mut registry = WorkerRegistry::new();
        let from_tree = desired
            .root()
            .children
            .iter()
            .filter(|child| child.tag == engine.worker_tag)
            .filter_map(|child| child.id().map(str::to_string));
        let mut schema = WorkerSchema::new(engine.prefix(), engine.worker_tag.clone());
        let schema_dir = self.config.schema_dir(&self.workspace_root);
        let from_schema: Vec<String> = match schema.load_dir(&schema_dir) {
            Ok(_) => schema.workers().map(str::to_string).collect(),
            Err(e) => {
                warn!(
                    dir = %schema_dir.display(),
                    error = %e,
                    "Skipping schema-declared workers for simulation"
                );
                Vec::new()
            }
        };
        for name in from_tree.chain(from_schema) {
            registry.register(name, Arc::new(RecordingWorker::new()));
        }
        registry
    }

    fn validate_file(&self, path: &Path) -> Result<ValidationResult, ApiError> {
        let source = std::fs::read_to_string(path).map_err(StorageError::Io)?;
        let subject = path.display().to_string();
        let is_schema = path.extension().map_or(false, |ext| ext == "toml");

        if is_schema {
            let worker = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let (errors, notes) = match WorkerDeclaration::from_toml(&worker, &source) {
                Ok(declaration) => (
                    Vec::new(),
                    vec![
                        format!("worker: {}", worker),
                        format!("work-unit patterns: {}", declaration.work_units.len()),
                        format!("ordered patterns: {}", declaration.ordered.len()),
                    ],
                ),
                Err(e) => (vec![e.to_string()], Vec::new()),
            };
            return Ok(ValidationResult {
                subject,
                kind: "schema".to_string(),
                errors,
                notes,
            });
        }

        let mut errors = Vec::new();
        let mut notes = Vec::new();
        match ConfigTree::from_json(&source) {
            Ok(mut tree) => {
                let root_tag = &self.config.engine.root_tag;
                if &tree.root().tag != root_tag {
                    errors.push(format!(
                        "root element is <{}>, expected <{}>",
                        tree.root().tag,
                        root_tag
                    ));
                }
                match extract_dependencies(&mut tree, &self.config.engine.deps_address()) {
                    Ok(deps) => notes.push(format!("dependencies: {}", deps.len())),
                    Err(e) => errors.push(e.to_string()),
                }
                notes.push(format!("addresses: {}", tree.all_addresses().len()));
            }
            Err(e) => errors.push(e.to_string()),
        }
        Ok(ValidationResult {
            subject,
            kind: "tree".to_string(),
            errors,
            notes,
        })
    }

    fn validate_configuration(&self) -> ValidationResult {
        let mut errors: Vec<String> = match self.config.validate() {
            Ok(()) => Vec::new(),
            Err(errs) => errs.iter().map(|e| e.to_string()).collect(),
        };
        let mut notes = Vec::new();
        let engine = &self.config.engine;
        let mut schema = WorkerSchema::new(engine.prefix(), engine.worker_tag.clone());
        let schema_dir = self.config.schema_dir(&self.workspace_root);
        match schema.load_dir(&schema_dir) {
            Ok(count) => notes.push(format!(
                "worker schemas: {} in {}",
                count,
                schema_dir.display()
            )),
            Err(e) => errors.push(e.to_string()),
        }
        notes.push(format!(
            "status: {}",
            self.config.status_path(&self.workspace_root).display()
        ));
        ValidationResult {
            subject: "configuration".to_string(),
            kind: "configuration".to_string(),
            errors,
            notes,
        }
    }
}

fn read_tree(path: &Path) -> Result<ConfigTree, ApiError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {:?}: {}", path, e),
        ))
    })?;
    Ok(ConfigTree::from_json(&source)?)
}
