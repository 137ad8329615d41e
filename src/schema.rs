//! Worker schemas: which tree shapes are work-unit boundaries
//!
//! Each worker owns the subtree `/<root>/<worker_tag>[@id=NAME]`. Its schema
//! source (TOML) lists tag-path patterns, relative to that node, naming the
//! smallest locations the worker accepts a change for, plus the parents whose
//! child order is significant:
//!
//! ```toml
//! work_units = ["package", "group/member"]
//! ordered = ["group"]
//! ```
//!
//! `*` matches any single tag. The worker node itself is always a boundary.

use crate::error::PlanError;
use crate::tree::PathAddress;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const WILDCARD: &str = "*";

/// Tag path relative to a worker node, ids ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern(Vec<String>);

impl TagPattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let trimmed = pattern.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self(Vec::new()));
        }
        let tags: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if let Some(bad) = tags
            .iter()
            .find(|t| t.is_empty() || t.chars().any(|c| "[]@='\"".contains(c)))
        {
            return Err(format!("invalid tag {:?} in pattern {:?}", bad, pattern));
        }
        Ok(Self(tags))
    }

    pub fn matches(&self, tags: &[&str]) -> bool {
        self.0.len() == tags.len()
            && self
                .0
                .iter()
                .zip(tags)
                .all(|(pattern, tag)| pattern == WILDCARD || pattern == tag)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationSource {
    #[serde(default)]
    work_units: Vec<String>,
    #[serde(default)]
    ordered: Vec<String>,
}

/// Structural declaration for one worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerDeclaration {
    pub work_units: Vec<TagPattern>,
    pub ordered: Vec<TagPattern>,
}

impl WorkerDeclaration {
    pub fn from_toml(worker: &str, source: &str) -> Result<Self, PlanError> {
        let schema_error = |reason: String| PlanError::Schema {
            worker: worker.to_string(),
            reason,
        };
        let raw: DeclarationSource =
            toml::from_str(source).map_err(|e| schema_error(e.to_string()))?;
        let parse_all = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| TagPattern::parse(p))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            work_units: parse_all(&raw.work_units).map_err(schema_error)?,
            ordered: parse_all(&raw.ordered).map_err(schema_error)?,
        })
    }
}

/// Work-unit boundary declarations for every worker
#[derive(Debug, Clone)]
pub struct WorkerSchema {
    prefix: PathAddress,
    worker_tag: String,
    declarations: BTreeMap<String, WorkerDeclaration>,
}

impl WorkerSchema {
    /// `prefix` is the worker-list location (e.g. `/status`), `worker_tag` the
    /// tag of each worker node below it.
    pub fn new(prefix: PathAddress, worker_tag: impl Into<String>) -> Self {
        Self {
            prefix,
            worker_tag: worker_tag.into(),
            declarations: BTreeMap::new(),
        }
    }

    pub fn prefix(&self) -> &PathAddress {
        &self.prefix
    }

    pub fn worker_tag(&self) -> &str {
        &self.worker_tag
    }

    /// Parse and register the TOML schema source of one worker.
    pub fn load(&mut self, worker_id: &str, source: &str) -> Result<(), PlanError> {
        let declaration = WorkerDeclaration::from_toml(worker_id, source)?;
        debug!(
            worker = worker_id,
            work_units = declaration.work_units.len(),
            ordered = declaration.ordered.len(),
            "Loaded worker schema"
        );
        self.declare(worker_id, declaration);
        Ok(())
    }

    pub fn declare(&mut self, worker_id: &str, declaration: WorkerDeclaration) {
        self.declarations.insert(worker_id.to_string(), declaration);
    }

    /// Load every `<worker>.toml` in `dir`. A missing directory loads nothing.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, PlanError> {
        if !dir.exists() {
            debug!(dir = %dir.display(), "Schema directory absent");
            return Ok(0);
        }
        let io_error = |e: std::io::Error| PlanError::Schema {
            worker: "*".to_string(),
            reason: format!("failed to read {}: {}", dir.display(), e),
        };
        let mut paths: Vec<_> = fs::read_dir(dir)
            .map_err(io_error)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in &paths {
            let worker = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let source = fs::read_to_string(path).map_err(|e| PlanError::Schema {
                worker: worker.clone(),
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;
            self.load(&worker, &source)?;
        }
        info!(count = paths.len(), dir = %dir.display(), "Worker schemas loaded");
        Ok(paths.len())
    }

    pub fn workers(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(String::as_str)
    }

    pub fn declaration(&self, worker_id: &str) -> Option<&WorkerDeclaration> {
        self.declarations.get(worker_id)
    }

    /// Owning worker and the tags below its node, for element addresses
    /// inside a worker section.
    fn locate<'a>(&self, address: &'a PathAddress) -> Option<(&'a str, Vec<&'a str>)> {
        if address.is_attribute() || !address.starts_with(&self.prefix) {
            return None;
        }
        let depth = self.prefix.depth();
        let segment = address.segments().get(depth)?;
        if segment.tag() != self.worker_tag {
            return None;
        }
        let worker = segment.id()?;
        let tags = address.segments()[depth + 1..]
            .iter()
            .map(|s| s.tag())
            .collect();
        Some((worker, tags))
    }

    /// True iff `address` is a work-unit boundary for its worker.
    pub fn is_work_unit(&self, address: &PathAddress) -> bool {
        match self.locate(address) {
            Some((_, tags)) if tags.is_empty() => true,
            Some((worker, tags)) => self.declarations.get(worker).map_or(false, |d| {
                d.work_units.iter().any(|pattern| pattern.matches(&tags))
            }),
            None => false,
        }
    }

    /// True iff the children of `parent` are order-significant.
    pub fn is_ordered(&self, parent: &PathAddress) -> bool {
        match self.locate(parent) {
            Some((worker, tags)) => self
                .declarations
                .get(worker)
                .map_or(false, |d| d.ordered.iter().any(|p| p.matches(&tags))),
            None => false,
        }
    }

    /// Closest proper ancestor of `address` that is a work-unit boundary.
    pub fn nearest_work_unit_ancestor(
        &self,
        address: &PathAddress,
    ) -> Result<PathAddress, PlanError> {
        let mut current = address.parent();
        while let Some(candidate) = current {
            if self.is_work_unit(&candidate) {
                return Ok(candidate);
            }
            current = candidate.parent();
        }
        Err(PlanError::NoWorkUnitAncestor(address.to_string()))
    }

    /// `address` itself when it is a boundary, its nearest boundary ancestor otherwise.
    pub fn work_unit_for(&self, address: &PathAddress) -> Result<PathAddress, PlanError> {
        if self.is_work_unit(address) {
            Ok(address.clone())
        } else {
            self.nearest_work_unit_ancestor(address)
        }
    }
}
