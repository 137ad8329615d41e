//! Work-unit planning
//!
//! Turns a classification into work units at the granularity each worker's
//! schema declares, and builds the working tree that reflects the state after
//! every unit has been applied.

use crate::diff::{Classification, DiffState};
use crate::error::{PlanError, TreeError};
use crate::plan::unit::{WorkOp, WorkUnit};
use crate::schema::WorkerSchema;
use crate::tree::{ConfigTree, PathAddress, Position};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument, trace};

pub struct PlanBuilder<'a> {
    schema: &'a WorkerSchema,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(schema: &'a WorkerSchema) -> Self {
        Self { schema }
    }

    /// Boundaries that must be dispatched for `classification`.
    ///
    /// Every left, right or data-diff address maps to itself when it is a
    /// boundary, otherwise to its nearest boundary ancestor. Struct diffs
    /// contribute nothing on their own. A boundary nested under another
    /// selected boundary is dropped: the outer unit's payload covers it.
    pub fn find_work_units(
        &self,
        classification: &Classification,
    ) -> Result<BTreeSet<PathAddress>, PlanError> {
        let mut boundaries = BTreeSet::new();
        for (address, state) in classification.changes() {
            let boundary = self.schema.work_unit_for(address)?;
            trace!(address = %address, ?state, boundary = %boundary, "Mapped change to boundary");
            boundaries.insert(boundary);
        }

        let targets: BTreeSet<PathAddress> = boundaries
            .iter()
            .filter(|b| !b.ancestors().iter().any(|a| boundaries.contains(a)))
            .cloned()
            .collect();
        debug!(
            boundaries = boundaries.len(),
            targets = targets.len(),
            "Work-unit targets selected"
        );
        Ok(targets)
    }

    /// Build the units for `targets` and the working tree they produce.
    ///
    /// Removals come first (deepest document position first), then every
    /// other unit in desired document order so that each `pos` hint names a
    /// sibling already present in the working tree.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub fn generate_work_units(
        &self,
        targets: &BTreeSet<PathAddress>,
        classification: &Classification,
        desired: &ConfigTree,
        observed: &ConfigTree,
    ) -> Result<(Vec<WorkUnit>, ConfigTree), PlanError> {
        let mut working = observed.clone();
        let mut units = Vec::new();
        let mut appended_under: BTreeSet<PathAddress> = BTreeSet::new();

        let observed_order: HashMap<PathAddress, usize> = observed
            .element_addresses()
            .into_iter()
            .enumerate()
            .map(|(i, a)| (a, i))
            .collect();
        let mut removals: Vec<&PathAddress> = targets
            .iter()
            .filter(|t| classification.get(t) == Some(DiffState::Left))
            .collect();
        removals.sort_by_key(|t| std::cmp::Reverse(observed_order.get(*t).copied()));
        for target in removals {
            let payload = observed.subtree(target)?.stub();
            working.remove(target)?;
            units.push(WorkUnit::new(target.clone(), WorkOp::Remove, payload, None));
        }

        for address in desired.element_addresses() {
            if address.ancestors().iter().any(|a| targets.contains(a)) {
                continue;
            }
            let parent = match address.parent() {
                Some(parent) => parent,
                None => continue,
            };
            let ordered = self.schema.is_ordered(&parent);

            if targets.contains(&address) {
                let unit = self.apply_target(&address, &parent, ordered, classification, desired, &mut working)?;
                if let Some(unit) = unit {
                    if unit.op() == WorkOp::Add && !ordered {
                        appended_under.insert(parent);
                    }
                    units.push(unit);
                }
            } else if ordered && self.schema.is_work_unit(&address) {
                let wanted = preceding_sibling(desired, &address)?;
                if preceding_sibling(&working, &address)? != wanted {
                    working.move_to(&address, &wanted)?;
                    let payload = desired.subtree(&address)?.stub();
                    units.push(WorkUnit::new(address, WorkOp::Move, payload, Some(wanted)));
                }
            }
        }

        for parent in &appended_under {
            let template = desired.child_segments(parent)?;
            working.reorder_children_like(&template, parent)?;
        }

        info!(units = units.len(), "Work units generated");
        Ok((units, working))
    }

    fn apply_target(
        &self,
        address: &PathAddress,
        parent: &PathAddress,
        ordered: bool,
        classification: &Classification,
        desired: &ConfigTree,
        working: &mut ConfigTree,
    ) -> Result<Option<WorkUnit>, PlanError> {
        let state = classification.get(address);
        let op = match state {
            Some(DiffState::Right) => WorkOp::Add,
            _ if classification.has_differing_descendants(address) => WorkOp::Deepmod,
            Some(DiffState::DataDiff) => WorkOp::Datamod,
            _ => {
                debug!(address = %address, ?state, "Target carries no change");
                return Ok(None);
            }
        };

        let wanted = if ordered {
            Some(preceding_sibling(desired, address)?)
        } else {
            None
        };
        let subtree = desired.subtree(address)?;

        if op == WorkOp::Add {
            match &wanted {
                Some(position) => working.insert_at(parent, position, subtree.clone())?,
                None => working.append(parent, subtree.clone())?,
            };
            return Ok(Some(WorkUnit::new(address.clone(), op, subtree, wanted)));
        }

        working.replace(address, subtree.clone())?;
        let pos = match wanted {
            Some(position) if preceding_sibling(working, address)? != position => {
                working.move_to(address, &position)?;
                Some(position)
            }
            _ => None,
        };
        let payload = if op == WorkOp::Datamod {
            let mut stub = subtree.stub();
            stub.text = subtree.text.clone();
            stub
        } else {
            subtree
        };
        Ok(Some(WorkUnit::new(address.clone(), op, payload, pos)))
    }
}

/// Position of `address` relative to its preceding sibling in `tree`.
fn preceding_sibling(tree: &ConfigTree, address: &PathAddress) -> Result<Position, PlanError> {
    let not_found = || TreeError::NotFound(address.to_string());
    let parent = address.parent().ok_or_else(not_found)?;
    let siblings = tree.child_segments(&parent)?;
    let index = siblings
        .iter()
        .position(|s| Some(s) == address.segments().last())
        .ok_or_else(not_found)?;
    Ok(match index {
        0 => Position::First,
        i => Position::After(parent.join(siblings[i - 1].clone())),
    })
}
