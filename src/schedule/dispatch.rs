//! Level-by-level dispatch of work units to workers
//!
//! Within a level, units are grouped into one ordered batch per worker and the
//! batches run concurrently. A level starts only once every batch of the
//! previous level has returned.

use crate::error::{PlanError, WorkerError};
use crate::plan::WorkUnit;
use crate::schedule::deps::{build_dependency_graph, DependencyEdge, DependencyGraph};
use crate::schedule::level::level;
use crate::schema::WorkerSchema;
use crate::tree::PathAddress;
use crate::worker::{UnitReport, Worker, WorkerRegistry};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Where the scheduler is within one reconciliation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SchedulerState {
    Idle,
    Planning,
    Leveling,
    Dispatching { level: usize },
    Done,
    /// Dispatch finished, or is still going, with failed units recorded
    Failed { failed: usize },
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Worker-list location; the segment below it names a unit's worker
    pub prefix: PathAddress,
    /// Per worker call; an expired call fails every unit of its batch
    pub worker_timeout: Option<Duration>,
}

impl SchedulerOptions {
    pub fn new(prefix: PathAddress) -> Self {
        Self {
            prefix,
            worker_timeout: None,
        }
    }

    pub fn with_worker_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_timeout = timeout;
        self
    }
}

/// Ordered levels ready for dispatch
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub graph: DependencyGraph,
    pub levels: Vec<Vec<WorkUnit>>,
}

impl Schedule {
    pub fn unit_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub level_index: usize,
    pub total_count: usize,
    pub batch_count: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
}

/// Outcome of dispatching every level of a cycle
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub level_summaries: Vec<LevelSummary>,
    /// One report per dispatched unit, in dispatch order
    pub reports: Vec<UnitReport>,
    /// Addresses of every unit that reported an error
    pub failures: BTreeSet<PathAddress>,
}

impl CycleResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_units(&self) -> usize {
        self.reports.len()
    }

    pub fn failed_reports(&self) -> impl Iterator<Item = &UnitReport> {
        self.reports.iter().filter(|r| !r.status.is_success())
    }
}

/// Turns work units into levels and drives them through the worker registry
pub struct Scheduler {
    registry: WorkerRegistry,
    options: SchedulerOptions,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(registry: WorkerRegistry, options: SchedulerOptions) -> Self {
        Self {
            registry,
            options,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!(from = ?self.state, to = ?next, "Scheduler state change");
        self.state = next;
    }

    /// Build the dependency graph and level the units.
    pub fn schedule(
        &mut self,
        explicit: &[DependencyEdge],
        units: &[WorkUnit],
        schema: &WorkerSchema,
    ) -> Result<Schedule, PlanError> {
        self.transition(SchedulerState::Planning);
        let graph = build_dependency_graph(explicit, units, schema)?;
        self.transition(SchedulerState::Leveling);
        let levels = level(&graph, units)?;
        info!(
            units = units.len(),
            levels = levels.len(),
            edges = graph.edge_count(),
            "Work units scheduled"
        );
        Ok(Schedule { graph, levels })
    }

    /// Dispatch every level in order. Failed units are recorded; their
    /// dependents in later levels are still dispatched.
    #[instrument(skip_all, fields(levels = levels.len()))]
    pub async fn dispatch(&mut self, levels: &[Vec<WorkUnit>]) -> CycleResult {
        let started_at = Utc::now();
        let mut reports = Vec::new();
        let mut failures = BTreeSet::new();
        let mut level_summaries = Vec::with_capacity(levels.len());

        for (level_index, units) in levels.iter().enumerate() {
            self.transition(SchedulerState::Dispatching { level: level_index });
            let (batches, mut level_reports) = self.partition(units);
            let batch_count = batches.len();

            let mut futures = FuturesUnordered::new();
            for (worker_name, batch) in batches {
                let worker = self.registry.get(&worker_name);
                let timeout = self.options.worker_timeout;
                futures.push(async move {
                    let outcome = run_batch(&worker_name, worker, &batch, timeout).await;
                    (worker_name, batch, outcome)
                });
            }

            while let Some((worker_name, batch, outcome)) = futures.next().await {
                level_reports.extend(fold_batch(&worker_name, &batch, outcome));
            }

            let failed: Vec<&UnitReport> = level_reports
                .iter()
                .filter(|r| !r.status.is_success())
                .collect();
            for report in &failed {
                warn!(level_index, unit = %report.unit, "{}", report);
                failures.insert(report.unit.clone());
            }
            let summary = LevelSummary {
                level_index,
                total_count: units.len(),
                batch_count,
                succeeded_count: level_reports.len() - failed.len(),
                failed_count: failed.len(),
            };
            info!(
                level_index,
                total = summary.total_count,
                succeeded = summary.succeeded_count,
                failed = summary.failed_count,
                "Level dispatched"
            );
            level_summaries.push(summary);
            reports.extend(level_reports);

            if !failures.is_empty() {
                self.transition(SchedulerState::Failed {
                    failed: failures.len(),
                });
            }
        }

        if failures.is_empty() {
            self.transition(SchedulerState::Done);
        } else {
            self.transition(SchedulerState::Failed {
                failed: failures.len(),
            });
        }
        CycleResult {
            started_at,
            finished_at: Utc::now(),
            level_summaries,
            reports,
            failures,
        }
    }

    /// Group `units` into per-worker batches, keeping unit order. Units with
    /// no owning worker are reported as errors straight away.
    fn partition(&self, units: &[WorkUnit]) -> (Vec<(String, Vec<WorkUnit>)>, Vec<UnitReport>) {
        let mut batches: Vec<(String, Vec<WorkUnit>)> = Vec::new();
        let mut orphans = Vec::new();
        for unit in units {
            let name = match unit.worker_name(&self.options.prefix) {
                Ok(name) => name,
                Err(err) => {
                    orphans.push(UnitReport::error(unit.id().clone(), err.to_string()));
                    continue;
                }
            };
            match batches.iter_mut().find(|(worker, _)| worker.as_str() == name) {
                Some((_, batch)) => batch.push(unit.clone()),
                None => batches.push((name.to_string(), vec![unit.clone()])),
            }
        }
        (batches, orphans)
    }
}

async fn run_batch(
    worker_name: &str,
    worker: Option<Arc<dyn Worker>>,
    batch: &[WorkUnit],
    timeout: Option<Duration>,
) -> Result<Vec<UnitReport>, WorkerError> {
    let worker = worker.ok_or_else(|| {
        WorkerError::Unreachable(format!("no worker registered for '{}'", worker_name))
    })?;
    debug!(worker = worker_name, units = batch.len(), "Dispatching batch");
    match timeout {
        Some(limit) => tokio::time::timeout(limit, worker.do_work(batch))
            .await
            .map_err(|_| WorkerError::TimedOut(worker_name.to_string()))?,
        None => worker.do_work(batch).await,
    }
}

/// One report per unit of `batch`, in batch order.
fn fold_batch(
    worker_name: &str,
    batch: &[WorkUnit],
    outcome: Result<Vec<UnitReport>, WorkerError>,
) -> Vec<UnitReport> {
    match outcome {
        Ok(mut returned) => batch
            .iter()
            .map(|unit| match returned.iter().position(|r| &r.unit == unit.id()) {
                Some(index) => returned.swap_remove(index),
                None => UnitReport::error(
                    unit.id().clone(),
                    format!("worker '{}' returned no result", worker_name),
                ),
            })
            .collect(),
        Err(err) => {
            warn!(worker = worker_name, error = %err, "Batch failed");
            batch
                .iter()
                .map(|unit| UnitReport::error(unit.id().clone(), err.to_string()))
                .collect()
        }
    }
}
