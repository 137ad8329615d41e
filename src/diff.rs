//! Tree diff and classification
//!
//! Classifies every address present in the observed or the desired tree.
//! Classification is a pure function of tree content: both address sets are
//! ordered sets, so traversal order never leaks into the result.

use crate::error::TreeError;
use crate::tree::{ConfigTree, PathAddress};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

/// Classification of one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffState {
    /// Only in the observed tree: stale, to remove
    Left,
    /// Only in the desired tree: new, to add
    Right,
    /// In both, leaf value differs
    DataDiff,
    /// In both, equal itself, some descendant differs
    StructDiff,
    Unchanged,
}

impl DiffState {
    /// Left, right and data differences are direct changes; struct diffs only
    /// reflect changes below.
    pub fn is_change(self) -> bool {
        matches!(self, DiffState::Left | DiffState::Right | DiffState::DataDiff)
    }
}

/// Per-state address counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub left: usize,
    pub right: usize,
    pub data_diff: usize,
    pub struct_diff: usize,
    pub unchanged: usize,
}

/// Output of [`DiffEngine::compare`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    states: BTreeMap<PathAddress, DiffState>,
    /// Ancestor element -> directly changed addresses below it
    #[serde(skip)]
    descendant_changes: BTreeMap<PathAddress, BTreeSet<PathAddress>>,
}

impl Classification {
    pub fn get(&self, address: &PathAddress) -> Option<DiffState> {
        self.states.get(address).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathAddress, DiffState)> {
        self.states.iter().map(|(a, s)| (a, *s))
    }

    /// Addresses that are left, right or data diffs.
    pub fn changes(&self) -> impl Iterator<Item = (&PathAddress, DiffState)> {
        self.iter().filter(|(_, state)| state.is_change())
    }

    pub fn with_state(&self, state: DiffState) -> Vec<&PathAddress> {
        self.iter()
            .filter(|(_, s)| *s == state)
            .map(|(a, _)| a)
            .collect()
    }

    /// True when the trees carry the same content.
    pub fn is_unchanged(&self) -> bool {
        self.states.values().all(|s| *s == DiffState::Unchanged)
    }

    /// Directly changed addresses strictly below `address`.
    pub fn differing_descendants(&self, address: &PathAddress) -> Option<&BTreeSet<PathAddress>> {
        self.descendant_changes.get(address)
    }

    pub fn has_differing_descendants(&self, address: &PathAddress) -> bool {
        self.descendant_changes
            .get(address)
            .map_or(false, |set| !set.is_empty())
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for state in self.states.values() {
            match state {
                DiffState::Left => summary.left += 1,
                DiffState::Right => summary.right += 1,
                DiffState::DataDiff => summary.data_diff += 1,
                DiffState::StructDiff => summary.struct_diff += 1,
                DiffState::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Computes the classified difference between an observed and a desired tree
pub struct DiffEngine;

impl DiffEngine {
    /// Classify every address of `observed` and `desired`.
    ///
    /// Precedence when an address qualifies for several states:
    /// left/right > data diff > struct diff > unchanged.
    #[instrument(skip_all)]
    pub fn compare(
        observed: &ConfigTree,
        desired: &ConfigTree,
    ) -> Result<Classification, TreeError> {
        observed.validate()?;
        desired.validate()?;

        let left = observed.all_addresses();
        let right = desired.all_addresses();
        let mut states: BTreeMap<PathAddress, DiffState> = BTreeMap::new();

        for address in left.difference(&right) {
            states.insert(address.clone(), DiffState::Left);
        }
        for address in right.difference(&left) {
            states.insert(address.clone(), DiffState::Right);
        }
        for address in left.intersection(&right) {
            let before = observed.resolve(address)?.value();
            let after = desired.resolve(address)?.value();
            let state = if before == after {
                DiffState::Unchanged
            } else {
                DiffState::DataDiff
            };
            states.insert(address.clone(), state);
        }

        let changed: Vec<PathAddress> = states
            .iter()
            .filter(|(_, s)| s.is_change())
            .map(|(a, _)| a.clone())
            .collect();
        let mut descendant_changes: BTreeMap<PathAddress, BTreeSet<PathAddress>> = BTreeMap::new();
        for address in &changed {
            for ancestor in address.ancestors() {
                if let Some(state) = states.get_mut(&ancestor) {
                    if *state == DiffState::Unchanged {
                        *state = DiffState::StructDiff;
                    }
                }
                descendant_changes
                    .entry(ancestor)
                    .or_default()
                    .insert(address.clone());
            }
        }

        let classification = Classification {
            states,
            descendant_changes,
        };
        let summary = classification.summary();
        debug!(
            left = summary.left,
            right = summary.right,
            data_diff = summary.data_diff,
            struct_diff = summary.struct_diff,
            unchanged = summary.unchanged,
            "Trees compared"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn addr(s: &str) -> PathAddress {
        PathAddress::parse(s).unwrap()
    }

    fn tree(items: &[(&str, &str)]) -> ConfigTree {
        let mut worker = Node::new("worker").with_id("w");
        for (id, text) in items {
            worker = worker.with_child(Node::new("item").with_id(*id).with_text(*text));
        }
        ConfigTree::new(Node::new("status").with_child(worker)).unwrap()
    }

    #[test]
    fn test_identical_trees_are_unchanged() {
        let t = tree(&[("1", "a"), ("2", "b")]);
        let c = DiffEngine::compare(&t, &t.clone()).unwrap();
        assert!(c.is_unchanged());
        assert_eq!(c.changes().count(), 0);
        assert!(c.with_state(DiffState::StructDiff).is_empty());
    }

    #[test]
    fn test_data_diff_propagates_struct_diff() {
        let observed = tree(&[("1", "old")]);
        let desired = tree(&[("1", "new")]);
        let c = DiffEngine::compare(&observed, &desired).unwrap();
        let item = addr("/status/worker['w']/item['1']");
        assert_eq!(c.get(&item), Some(DiffState::DataDiff));
        assert_eq!(c.get(&addr("/status/worker['w']")), Some(DiffState::StructDiff));
        assert_eq!(c.get(&addr("/status")), Some(DiffState::StructDiff));
        assert!(c
            .differing_descendants(&addr("/status"))
            .unwrap()
            .contains(&item));
    }

    #[test]
    fn test_left_and_right() {
        let observed = tree(&[("1", "a")]);
        let desired = tree(&[("2", "a")]);
        let c = DiffEngine::compare(&observed, &desired).unwrap();
        assert_eq!(c.get(&addr("/status/worker['w']/item['1']")), Some(DiffState::Left));
        assert_eq!(c.get(&addr("/status/worker['w']/item['2']")), Some(DiffState::Right));
        assert_eq!(c.get(&addr("/status/worker['w']")), Some(DiffState::StructDiff));
        let summary = c.summary();
        assert_eq!((summary.left, summary.right, summary.struct_diff), (1, 1, 2));
    }

    #[test]
    fn test_attribute_changes() {
        let observed = ConfigTree::new(
            Node::new("status").with_child(Node::new("worker").with_id("w").with_attribute("v", "1")),
        )
        .unwrap();
        let desired = ConfigTree::new(
            Node::new("status").with_child(
                Node::new("worker")
                    .with_id("w")
                    .with_attribute("v", "2")
                    .with_attribute("extra", "x"),
            ),
        )
        .unwrap();
        let c = DiffEngine::compare(&observed, &desired).unwrap();
        assert_eq!(c.get(&addr("/status/worker['w']/@v")), Some(DiffState::DataDiff));
        assert_eq!(c.get(&addr("/status/worker['w']/@extra")), Some(DiffState::Right));
        assert_eq!(c.get(&addr("/status/worker['w']")), Some(DiffState::StructDiff));
    }

    #[test]
    fn test_changed_ancestor_keeps_stronger_state() {
        let observed = ConfigTree::new(
            Node::new("status").with_child(Node::new("worker").with_id("w").with_attribute("v", "1").with_text("t")),
        )
        .unwrap();
        let desired = ConfigTree::new(
            Node::new("status").with_child(Node::new("worker").with_id("w").with_attribute("v", "2").with_text("u")),
        )
        .unwrap();
        let c = DiffEngine::compare(&observed, &desired).unwrap();
        assert_eq!(c.get(&addr("/status/worker['w']")), Some(DiffState::DataDiff));
    }

    #[test]
    fn test_order_does_not_matter() {
        let a = tree(&[("1", "a"), ("2", "b")]);
        let b = tree(&[("2", "b"), ("1", "a")]);
        assert!(DiffEngine::compare(&a, &b).unwrap().is_unchanged());
    }
}
