//! Reconciliation cycle
//!
//! One cycle: load the previous status, refresh it from the workers, compare
//! it with the desired tree, plan and schedule work units, dispatch them, and
//! persist the resulting status. Any structural or planning error aborts the
//! cycle before dispatch and leaves the persisted status untouched.

use crate::config::{AttuneConfig, EngineConfig};
use crate::diff::{Classification, DiffEngine, DiffSummary};
use crate::error::ApiError;
use crate::plan::{PlanBuilder, WorkUnit};
use crate::schedule::{
    extract_dependencies, CycleResult, DependencyEdge, Schedule, Scheduler, SchedulerOptions,
};
use crate::schema::WorkerSchema;
use crate::status::StatusStore;
use crate::tree::{ConfigTree, Node, PathAddress, Segment};
use crate::worker::WorkerRegistry;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Everything computed for a cycle up to, but not including, dispatch
#[derive(Debug, Clone)]
pub struct Plan {
    /// Desired tree with the dependency section removed
    pub desired: ConfigTree,
    pub observed: ConfigTree,
    pub classification: Classification,
    pub dependencies: Vec<DependencyEdge>,
    pub units: Vec<WorkUnit>,
    /// Observed tree with every unit applied
    pub working: ConfigTree,
    pub schedule: Schedule,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Outcome of a completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub summary: DiffSummary,
    pub unit_count: usize,
    pub result: CycleResult,
    /// Status persisted at the end of the cycle
    pub status: ConfigTree,
}

impl CycleReport {
    pub fn failures(&self) -> &BTreeSet<PathAddress> {
        &self.result.failures
    }
}

pub struct Reconciler {
    engine: EngineConfig,
    schema: WorkerSchema,
    registry: WorkerRegistry,
    store: StatusStore,
}

impl Reconciler {
    pub fn new(
        engine: EngineConfig,
        schema: WorkerSchema,
        registry: WorkerRegistry,
        store: StatusStore,
    ) -> Self {
        Self {
            engine,
            schema,
            registry,
            store,
        }
    }

    /// Build a reconciler for `workspace_root`, loading every worker schema
    /// from the configured schema directory.
    pub fn from_config(
        config: &AttuneConfig,
        workspace_root: &Path,
        registry: WorkerRegistry,
    ) -> Result<Self, ApiError> {
        let engine = config.engine.clone();
        let mut schema = WorkerSchema::new(engine.prefix(), engine.worker_tag.clone());
        schema.load_dir(&config.schema_dir(workspace_root))?;
        let store = StatusStore::new(config.status_path(workspace_root), engine.root_tag.clone());
        Ok(Self::new(engine, schema, registry, store))
    }

    pub fn schema(&self) -> &WorkerSchema {
        &self.schema
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    fn scheduler(&self) -> Scheduler {
        let options = SchedulerOptions::new(self.engine.prefix())
            .with_worker_timeout(self.engine.worker_timeout());
        Scheduler::new(self.registry.clone(), options)
    }

    /// Compare, plan and level without dispatching anything.
    pub fn plan(&self, desired: ConfigTree, observed: ConfigTree) -> Result<Plan, ApiError> {
        self.plan_with(&mut self.scheduler(), desired, observed)
    }

    fn plan_with(
        &self,
        scheduler: &mut Scheduler,
        mut desired: ConfigTree,
        observed: ConfigTree,
    ) -> Result<Plan, ApiError> {
        let dependencies = extract_dependencies(&mut desired, &self.engine.deps_address())?;
        let classification = DiffEngine::compare(&observed, &desired)?;

        let builder = PlanBuilder::new(&self.schema);
        let targets = builder.find_work_units(&classification)?;
        let (units, working) =
            builder.generate_work_units(&targets, &classification, &desired, &observed)?;
        let schedule = scheduler.schedule(&dependencies, &units, &self.schema)?;

        Ok(Plan {
            desired,
            observed,
            classification,
            dependencies,
            units,
            working,
            schedule,
        })
    }

    /// Overlay each worker's reported status onto `previous`. Workers that
    /// report nothing, or fail to report, keep their previous subtree.
    pub async fn refresh_status(
        &self,
        previous: ConfigTree,
        desired: &ConfigTree,
    ) -> Result<ConfigTree, ApiError> {
        let prefix = self.engine.prefix();
        let mut status = previous;
        for (name, worker) in self.registry.iter() {
            let node = match worker.generate_status().await {
                Ok(Some(node)) => node,
                Ok(None) => {
                    debug!(worker = name, "Worker reports no status");
                    continue;
                }
                Err(err) => {
                    warn!(worker = name, error = %err, "Status refresh failed, keeping previous");
                    continue;
                }
            };
            if node.tag != self.engine.worker_tag || node.id() != Some(name) {
                warn!(
                    worker = name,
                    tag = %node.tag,
                    "Worker status is not rooted at its own worker node, ignoring"
                );
                continue;
            }
            let address = prefix.join(node.segment());
            self.overlay(&mut status, &address, node)?;
            if !self.schema.is_ordered(&address) {
                let template = order_template(desired, &status, &address)?;
                status.reorder_children_like(&template, &address)?;
            }
        }
        Ok(status)
    }

    fn overlay(
        &self,
        status: &mut ConfigTree,
        address: &PathAddress,
        node: Node,
    ) -> Result<(), ApiError> {
        if status.contains(address) {
            status.replace(address, node)?;
        } else {
            let prefix = self.engine.prefix();
            status.append(&prefix, node)?;
        }
        Ok(())
    }

    /// Run one full cycle towards `desired` and persist the new status.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self, desired: ConfigTree) -> Result<CycleReport, ApiError> {
        let previous = self.store.load()?;
        let observed = self.refresh_status(previous, &desired).await?;

        let mut scheduler = self.scheduler();
        let plan = self.plan_with(&mut scheduler, desired, observed)?;
        info!(
            units = plan.units.len(),
            levels = plan.schedule.levels.len(),
            "Cycle planned"
        );

        let result = scheduler.dispatch(&plan.schedule.levels).await;
        let status = fold_failures(plan.working, &plan.observed, &result.failures)?;
        self.store.save(&status)?;

        info!(
            units = plan.units.len(),
            failed = result.failures.len(),
            "Cycle finished"
        );
        Ok(CycleReport {
            summary: plan.classification.summary(),
            unit_count: plan.units.len(),
            result,
            status,
        })
    }
}

/// Child order for a refreshed worker node: the desired order when the
/// desired tree has the node, its current order otherwise.
fn order_template(
    desired: &ConfigTree,
    status: &ConfigTree,
    address: &PathAddress,
) -> Result<Vec<Segment>, ApiError> {
    let source = if desired.contains(address) { desired } else { status };
    Ok(source.child_segments(address)?)
}

/// The working tree with every failed unit put back the way it was observed.
pub fn fold_failures(
    mut working: ConfigTree,
    observed: &ConfigTree,
    failures: &BTreeSet<PathAddress>,
) -> Result<ConfigTree, ApiError> {
    for address in failures {
        debug!(unit = %address, "Restoring observed state for failed unit");
        working.restore_from(observed, address)?;
    }
    Ok(working)
}
