//! Topological leveling of work units

use crate::error::PlanError;
use crate::plan::WorkUnit;
use crate::schedule::deps::DependencyGraph;
use crate::tree::PathAddress;
use std::collections::BTreeSet;
use tracing::debug;

/// Split `units` into levels so every unit lands after all of its prerequisites.
///
/// Each pass takes every remaining unit whose prerequisites were placed in
/// earlier levels; units keep their relative input order inside a level.
/// Prerequisites that are not among `units` are ignored.
pub fn level(graph: &DependencyGraph, units: &[WorkUnit]) -> Result<Vec<Vec<WorkUnit>>, PlanError> {
    let known: BTreeSet<&PathAddress> = units.iter().map(WorkUnit::id).collect();
    let mut placed: BTreeSet<&PathAddress> = BTreeSet::new();
    let mut remaining: Vec<&WorkUnit> = units.iter().collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&WorkUnit>, Vec<&WorkUnit>) =
            remaining.into_iter().partition(|unit| {
                graph
                    .prerequisites(unit.id())
                    .all(|p| placed.contains(p) || !known.contains(p))
            });
        if ready.is_empty() {
            return Err(PlanError::DependencyCycle(
                blocked.iter().map(|u| u.id().to_string()).collect(),
            ));
        }
        placed.extend(ready.iter().map(|u| u.id()));
        debug!(level_index = levels.len(), units = ready.len(), "Level formed");
        levels.push(ready.into_iter().cloned().collect());
        remaining = blocked;
    }
    Ok(levels)
}
