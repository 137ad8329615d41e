//! Dispatchable work units

use crate::error::AddressError;
use crate::tree::{Node, PathAddress, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation a worker is asked to perform on one boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkOp {
    /// Create the boundary; payload is the full desired subtree
    Add,
    /// Delete the boundary; payload is a stub carrying only the id
    Remove,
    /// Change the boundary's own value; payload carries the new text
    Datamod,
    /// Replace the whole boundary; payload is the full desired subtree
    Deepmod,
    /// Reposition an unchanged boundary among ordered siblings
    Move,
}

impl WorkOp {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkOp::Add => "add",
            WorkOp::Remove => "remove",
            WorkOp::Datamod => "datamod",
            WorkOp::Deepmod => "deepmod",
            WorkOp::Move => "move",
        }
    }
}

impl fmt::Display for WorkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The minimum-granularity change dispatched to one worker. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    id: PathAddress,
    op: WorkOp,
    payload: Node,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pos: Option<Position>,
}

impl WorkUnit {
    pub fn new(id: PathAddress, op: WorkOp, payload: Node, pos: Option<Position>) -> Self {
        Self {
            id,
            op,
            payload,
            pos,
        }
    }

    /// Address of the work-unit boundary.
    pub fn id(&self) -> &PathAddress {
        &self.id
    }

    pub fn op(&self) -> WorkOp {
        self.op
    }

    pub fn payload(&self) -> &Node {
        &self.payload
    }

    /// Sibling this unit is placed after, when its parent is ordered.
    pub fn pos(&self) -> Option<&Position> {
        self.pos.as_ref()
    }

    /// Worker owning this unit, i.e. the id of the segment below `prefix`.
    pub fn worker_name(&self, prefix: &PathAddress) -> Result<&str, AddressError> {
        self.id.worker_name(prefix)
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let id = PathAddress::parse("/status/worker['w']/item['2']").unwrap();
        let unit = WorkUnit::new(
            id.clone(),
            WorkOp::Add,
            Node::new("item").with_id("2"),
            Some(Position::After(
                PathAddress::parse("/status/worker['w']/item['1']").unwrap(),
            )),
        );
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["op"], "add");
        assert_eq!(json["id"], "/status/worker[@id='w']/item[@id='2']");
        assert_eq!(json["pos"]["after"], "/status/worker[@id='w']/item[@id='1']");

        let first = WorkUnit::new(id, WorkOp::Move, Node::new("item"), Some(Position::First));
        assert_eq!(serde_json::to_value(&first).unwrap()["pos"], "first");
    }

    #[test]
    fn test_worker_name() {
        let unit = WorkUnit::new(
            PathAddress::parse("/status/worker['pkg']/package['vim']").unwrap(),
            WorkOp::Remove,
            Node::new("package").with_id("vim"),
            None,
        );
        let prefix = PathAddress::parse("/status").unwrap();
        assert_eq!(unit.worker_name(&prefix).unwrap(), "pkg");
        assert_eq!(unit.to_string(), "remove /status/worker[@id='pkg']/package[@id='vim']");
    }
}
