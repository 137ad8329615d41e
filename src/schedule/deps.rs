//! Explicit dependencies and their translation onto work units
//!
//! Dependency declarations name arbitrary tree addresses. Each edge is lifted
//! to the work units covering its endpoints and checked against the rule table
//! below, keyed by `(op, src action, tgt action)`.

use crate::error::{PlanError, TreeError};
use crate::plan::{Position, WorkOp, WorkUnit};
use crate::schema::WorkerSchema;
use crate::tree::{ConfigTree, PathAddress};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

/// Tag of each declaration inside the deps section
pub const DEP_TAG: &str = "dep";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyOp {
    Requires,
    Excludes,
}

impl DependencyOp {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyOp::Requires => "requires",
            DependencyOp::Excludes => "excludes",
        }
    }
}

impl fmt::Display for DependencyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyOp {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requires" => Ok(DependencyOp::Requires),
            "excludes" => Ok(DependencyOp::Excludes),
            other => Err(PlanError::UnknownDependencyOperator(other.to_string())),
        }
    }
}

/// Declared relation `src op tgt` between two tree addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub src: PathAddress,
    pub tgt: PathAddress,
    pub op: DependencyOp,
}

impl DependencyEdge {
    pub fn new(src: PathAddress, tgt: PathAddress, op: DependencyOp) -> Self {
        Self { src, tgt, op }
    }

    /// Parse from raw attribute strings, as found in the deps section.
    pub fn parse(src: &str, tgt: &str, op: &str) -> Result<Self, PlanError> {
        Ok(Self {
            src: PathAddress::parse(src)?,
            tgt: PathAddress::parse(tgt)?,
            op: op.parse()?,
        })
    }
}

/// What the plan does to the unit covering an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitAction {
    Add,
    Remove,
    Modify,
    None,
}

impl UnitAction {
    pub fn of(op: WorkOp) -> Self {
        match op {
            WorkOp::Add => UnitAction::Add,
            WorkOp::Remove => UnitAction::Remove,
            WorkOp::Datamod | WorkOp::Deepmod | WorkOp::Move => UnitAction::Modify,
        }
    }
}

/// Outcome of one rule-table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Source unit depends on target unit
    SrcAfterTgt,
    /// Target unit depends on source unit
    TgtAfterSrc,
    NoEdge,
    Unsatisfiable,
}

use DependencyOp::{Excludes, Requires};
use Rule::{NoEdge, SrcAfterTgt, TgtAfterSrc, Unsatisfiable};
use UnitAction::{Add as A, Modify as M, None as N, Remove as R};

/// Every `(op, src action, tgt action)` combination.
pub const RULES: [(DependencyOp, UnitAction, UnitAction, Rule); 32] = [
    (Requires, A, A, SrcAfterTgt),
    (Requires, A, M, SrcAfterTgt),
    (Requires, A, R, Unsatisfiable),
    (Requires, A, N, NoEdge),
    (Requires, M, A, SrcAfterTgt),
    (Requires, M, M, SrcAfterTgt),
    (Requires, M, R, Unsatisfiable),
    (Requires, M, N, NoEdge),
    (Requires, R, A, NoEdge),
    (Requires, R, M, NoEdge),
    (Requires, R, R, TgtAfterSrc),
    (Requires, R, N, NoEdge),
    (Requires, N, A, NoEdge),
    (Requires, N, M, NoEdge),
    (Requires, N, R, NoEdge),
    (Requires, N, N, NoEdge),
    (Excludes, A, A, Unsatisfiable),
    (Excludes, A, M, Unsatisfiable),
    (Excludes, A, R, SrcAfterTgt),
    (Excludes, A, N, NoEdge),
    (Excludes, M, A, Unsatisfiable),
    (Excludes, M, M, Unsatisfiable),
    (Excludes, M, R, SrcAfterTgt),
    (Excludes, M, N, NoEdge),
    (Excludes, R, A, TgtAfterSrc),
    (Excludes, R, M, NoEdge),
    (Excludes, R, R, NoEdge),
    (Excludes, R, N, NoEdge),
    (Excludes, N, A, NoEdge),
    (Excludes, N, M, NoEdge),
    (Excludes, N, R, NoEdge),
    (Excludes, N, N, NoEdge),
];

pub fn rule_for(op: DependencyOp, src: UnitAction, tgt: UnitAction) -> Rule {
    RULES
        .iter()
        .find(|(o, s, t, _)| *o == op && *s == src && *t == tgt)
        .map_or(NoEdge, |(_, _, _, rule)| *rule)
}

/// Work-unit ordering constraints: dependent -> prerequisites
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<PathAddress, BTreeSet<PathAddress>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` must run after `prerequisite`. Self-edges are ignored.
    pub fn add_edge(&mut self, dependent: PathAddress, prerequisite: PathAddress) {
        if dependent == prerequisite {
            return;
        }
        self.edges.entry(dependent).or_default().insert(prerequisite);
    }

    pub fn prerequisites(&self, unit: &PathAddress) -> impl Iterator<Item = &PathAddress> {
        self.edges.get(unit).into_iter().flatten()
    }

    pub fn depends_on(&self, dependent: &PathAddress, prerequisite: &PathAddress) -> bool {
        self.edges
            .get(dependent)
            .map_or(false, |set| set.contains(prerequisite))
    }

    /// All edges as `(dependent, prerequisite)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&PathAddress, &PathAddress)> {
        self.edges
            .iter()
            .flat_map(|(dependent, prereqs)| prereqs.iter().map(move |p| (dependent, p)))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Translate explicit dependencies and ordering hints into unit edges.
pub fn build_dependency_graph(
    explicit: &[DependencyEdge],
    units: &[WorkUnit],
    schema: &WorkerSchema,
) -> Result<DependencyGraph, PlanError> {
    let by_id: BTreeMap<&PathAddress, &WorkUnit> = units.iter().map(|u| (u.id(), u)).collect();
    let mut graph = DependencyGraph::new();

    for edge in explicit {
        let src_unit = covering_unit(&edge.src, &by_id, schema)?;
        let tgt_unit = covering_unit(&edge.tgt, &by_id, schema)?;
        let action = |unit: &Covering| unit.op.map_or(UnitAction::None, UnitAction::of);
        let rule = rule_for(edge.op, action(&src_unit), action(&tgt_unit));
        trace!(
            src = %edge.src,
            tgt = %edge.tgt,
            op = %edge.op,
            ?rule,
            "Translated dependency"
        );
        match rule {
            SrcAfterTgt => graph.add_edge(src_unit.address, tgt_unit.address),
            TgtAfterSrc => graph.add_edge(tgt_unit.address, src_unit.address),
            NoEdge => {}
            Unsatisfiable => {
                return Err(PlanError::UnsatisfiableDependency {
                    src: edge.src.to_string(),
                    tgt: edge.tgt.to_string(),
                    op: edge.op.to_string(),
                })
            }
        }
    }

    for unit in units {
        if let Some(Position::After(sibling)) = unit.pos() {
            let placed = by_id
                .get(sibling)
                .map_or(false, |s| s.op() == WorkOp::Add || s.pos().is_some());
            if placed {
                graph.add_edge(unit.id().clone(), sibling.clone());
            }
        }
    }

    debug!(edges = graph.edge_count(), "Dependency graph built");
    Ok(graph)
}

struct Covering {
    address: PathAddress,
    op: Option<WorkOp>,
}

/// The unit covering `address`: its boundary when that boundary is a unit,
/// else the closest unit above it. Not in the plan when neither exists.
fn covering_unit(
    address: &PathAddress,
    units: &BTreeMap<&PathAddress, &WorkUnit>,
    schema: &WorkerSchema,
) -> Result<Covering, PlanError> {
    let boundary = schema.work_unit_for(address)?;
    if let Some(unit) = units.get(&boundary) {
        return Ok(Covering {
            address: boundary,
            op: Some(unit.op()),
        });
    }
    let ancestor = boundary
        .ancestors()
        .into_iter()
        .rev()
        .find_map(|a| units.get(&a).map(|u| (a, u.op())));
    Ok(match ancestor {
        Some((address, op)) => Covering {
            address,
            op: Some(op),
        },
        None => Covering {
            address: boundary,
            op: None,
        },
    })
}

/// Remove the deps section at `section` from `desired` and parse its
/// declarations. A missing section yields no edges.
pub fn extract_dependencies(
    desired: &mut ConfigTree,
    section: &PathAddress,
) -> Result<Vec<DependencyEdge>, PlanError> {
    if !desired.contains(section) {
        return Ok(Vec::new());
    }
    let node = desired.remove(section)?;
    let mut edges = Vec::with_capacity(node.children.len());
    for dep in &node.children {
        if dep.tag != DEP_TAG {
            return Err(TreeError::Malformed(format!(
                "unexpected <{}> in dependency section {}",
                dep.tag, section
            ))
            .into());
        }
        let attr = |name: &str| {
            dep.attributes.get(name).map(String::as_str).ok_or_else(|| {
                TreeError::Malformed(format!(
                    "dependency in {} is missing attribute '{}'",
                    section, name
                ))
            })
        };
        edges.push(DependencyEdge::parse(attr("src")?, attr("tgt")?, attr("op")?)?);
    }
    debug!(count = edges.len(), "Dependencies extracted");
    Ok(edges)
}
