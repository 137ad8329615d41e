//! Reference reconciliation scenarios, end to end through the public API

use crate::integration::{addr, single_worker};
use attune::diff::{DiffEngine, DiffState};
use attune::error::PlanError;
use attune::plan::{PlanBuilder, WorkOp, WorkUnit};
use attune::schedule::{build_dependency_graph, level, DependencyEdge, DependencyGraph, DependencyOp};
use attune::schema::WorkerSchema;
use attune::tree::{ConfigTree, Node};

fn item_schema() -> WorkerSchema {
    let mut schema = WorkerSchema::new(addr("/status"), "worker");
    schema.load("w", "work_units = [\"item\"]").unwrap();
    schema
}

fn units_for(schema: &WorkerSchema, observed: &ConfigTree, desired: &ConfigTree) -> Vec<WorkUnit> {
    let classification = DiffEngine::compare(observed, desired).unwrap();
    let builder = PlanBuilder::new(schema);
    let targets = builder.find_work_units(&classification).unwrap();
    builder
        .generate_work_units(&targets, &classification, desired, observed)
        .unwrap()
        .0
}

fn ids(level: &[WorkUnit]) -> Vec<String> {
    level.iter().map(|u| u.id().to_string()).collect()
}

#[test]
fn test_changed_text_becomes_single_datamod() {
    let observed = single_worker(&[("1", "old")]);
    let desired = single_worker(&[("1", "new")]);
    let item = addr("/status/worker[@id='w']/item[@id='1']");

    let classification = DiffEngine::compare(&observed, &desired).unwrap();
    let changes: Vec<_> = classification.changes().collect();
    assert_eq!(changes, vec![(&item, DiffState::DataDiff)]);

    let units = units_for(&item_schema(), &observed, &desired);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].id(), &item);
    assert_eq!(units[0].op(), WorkOp::Datamod);
    assert_eq!(units[0].payload().text.as_deref(), Some("new"));
}

#[test]
fn test_new_item_becomes_add_with_full_subtree() {
    let observed = single_worker(&[("1", "a")]);
    let mut desired = single_worker(&[("1", "a")]);
    let worker = addr("/status/worker['w']");
    let added = Node::new("item")
        .with_id("2")
        .with_attribute("mode", "0644")
        .with_text("b");
    desired.append(&worker, added.clone()).unwrap();

    let classification = DiffEngine::compare(&observed, &desired).unwrap();
    let item = addr("/status/worker['w']/item['2']");
    assert_eq!(classification.get(&item), Some(DiffState::Right));
    assert_eq!(classification.get(&worker), Some(DiffState::StructDiff));

    let units = units_for(&item_schema(), &observed, &desired);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].op(), WorkOp::Add);
    assert_eq!(units[0].payload(), &added);
}

#[test]
fn test_add_requiring_removed_unit_is_unsatisfiable() {
    let observed = single_worker(&[("old", "x")]);
    let desired = single_worker(&[("new", "y")]);
    let schema = item_schema();
    let units = units_for(&schema, &observed, &desired);
    assert_eq!(units.len(), 2);

    let edge = DependencyEdge::new(
        addr("/status/worker['w']/item['new']"),
        addr("/status/worker['w']/item['old']"),
        DependencyOp::Requires,
    );
    let err = build_dependency_graph(&[edge], &units, &schema).unwrap_err();
    assert!(matches!(err, PlanError::UnsatisfiableDependency { .. }));
}

#[test]
fn test_unrelated_units_share_level_zero() {
    let observed = ConfigTree::new(
        Node::new("status")
            .with_child(Node::new("worker").with_id("a"))
            .with_child(Node::new("worker").with_id("b")),
    )
    .unwrap();
    let desired = ConfigTree::new(
        Node::new("status")
            .with_child(Node::new("worker").with_id("a").with_child(Node::new("x").with_text("1")))
            .with_child(Node::new("worker").with_id("b").with_child(Node::new("y").with_text("2"))),
    )
    .unwrap();
    let schema = WorkerSchema::new(addr("/status"), "worker");
    let units = units_for(&schema, &observed, &desired);
    assert_eq!(units.len(), 2);

    let graph = build_dependency_graph(&[], &units, &schema).unwrap();
    let levels = level(&graph, &units).unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0].len(), 2);
}

#[test]
fn test_dependency_chain_levels_in_reverse() {
    let observed = single_worker(&[]);
    let desired = single_worker(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let schema = item_schema();
    let units = units_for(&schema, &observed, &desired);
    let item = |id: &str| format!("/status/worker['w']/item['{}']", id);
    let requires = |src: &str, tgt: &str| {
        DependencyEdge::parse(&item(src), &item(tgt), "requires").unwrap()
    };

    let graph = build_dependency_graph(&[requires("a", "b"), requires("b", "c")], &units, &schema)
        .unwrap();
    let levels = level(&graph, &units).unwrap();
    let rendered: Vec<Vec<String>> = levels.iter().map(|l| ids(l)).collect();
    let full = |id: &str| addr(&item(id)).to_string();
    assert_eq!(
        rendered,
        vec![vec![full("c")], vec![full("b")], vec![full("a")]]
    );
}

#[test]
fn test_cycle_is_reported() {
    let observed = single_worker(&[]);
    let desired = single_worker(&[("a", "1"), ("b", "2")]);
    let units = units_for(&item_schema(), &observed, &desired);
    let mut graph = DependencyGraph::new();
    graph.add_edge(units[0].id().clone(), units[1].id().clone());
    graph.add_edge(units[1].id().clone(), units[0].id().clone());
    assert!(matches!(
        level(&graph, &units),
        Err(PlanError::DependencyCycle(_))
    ));
}
