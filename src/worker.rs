//! Worker collaborators
//!
//! A worker owns one configuration domain (packages, environment variables,
//! firewall rules, ...). The engine only needs two things from it: the current
//! status subtree, and the ability to carry out an ordered batch of work units.

use crate::error::WorkerError;
use crate::plan::WorkUnit;
use crate::tree::{Node, PathAddress};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of one work unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum UnitStatus {
    Success,
    Error(String),
}

impl UnitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitStatus::Success)
    }
}

/// Per-unit result returned by [`Worker::do_work`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: PathAddress,
    #[serde(flatten)]
    pub status: UnitStatus,
}

impl UnitReport {
    pub fn success(unit: PathAddress) -> Self {
        Self {
            unit,
            status: UnitStatus::Success,
        }
    }

    pub fn error(unit: PathAddress, message: impl Into<String>) -> Self {
        Self {
            unit,
            status: UnitStatus::Error(message.into()),
        }
    }
}

impl fmt::Display for UnitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            UnitStatus::Success => write!(f, "{}: success", self.unit),
            UnitStatus::Error(message) => write!(f, "{}: error: {}", self.unit, message),
        }
    }
}

/// One configuration domain
#[async_trait]
pub trait Worker: Send + Sync {
    /// Current status subtree of this worker's domain, rooted at its worker
    /// node. `None` when the worker cannot report status.
    async fn generate_status(&self) -> Result<Option<Node>, WorkerError>;

    /// Apply `batch` in the order given and report on each unit.
    async fn do_work(&self, batch: &[WorkUnit]) -> Result<Vec<UnitReport>, WorkerError>;
}

/// Worker implementations keyed by worker name
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, worker: Arc<dyn Worker>) {
        self.workers.insert(name.into(), worker);
    }

    pub fn with_worker(mut self, name: impl Into<String>, worker: Arc<dyn Worker>) -> Self {
        self.register(name, worker);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Worker>)> {
        self.workers.iter().map(|(name, w)| (name.as_str(), w))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.workers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Accepts every unit and remembers each batch. Optionally reports a fixed
/// status subtree and fails selected units.
#[derive(Default)]
pub struct RecordingWorker {
    status: Mutex<Option<Node>>,
    batches: Mutex<Vec<Vec<WorkUnit>>>,
    failing: Mutex<BTreeMap<PathAddress, String>>,
}

impl RecordingWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: Node) -> Self {
        let worker = Self::default();
        *worker.status.lock() = Some(status);
        worker
    }

    /// Make the unit at `address` report `message` as an error.
    pub fn fail_unit(&self, address: PathAddress, message: impl Into<String>) {
        self.failing.lock().insert(address, message.into());
    }

    pub fn set_status(&self, status: Option<Node>) {
        *self.status.lock() = status;
    }

    pub fn batches(&self) -> Vec<Vec<WorkUnit>> {
        self.batches.lock().clone()
    }

    pub fn unit_count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl Worker for RecordingWorker {
    async fn generate_status(&self) -> Result<Option<Node>, WorkerError> {
        Ok(self.status.lock().clone())
    }

    async fn do_work(&self, batch: &[WorkUnit]) -> Result<Vec<UnitReport>, WorkerError> {
        self.batches.lock().push(batch.to_vec());
        let failing = self.failing.lock();
        Ok(batch
            .iter()
            .map(|unit| match failing.get(unit.id()) {
                Some(message) => UnitReport::error(unit.id().clone(), message.clone()),
                None => UnitReport::success(unit.id().clone()),
            })
            .collect())
    }
}
