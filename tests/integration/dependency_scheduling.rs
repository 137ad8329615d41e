//! Integration tests for dependency extraction and level-by-level dispatch

use crate::integration::{addr, single_worker};
use async_trait::async_trait;
use attune::error::{PlanError, TreeError, WorkerError};
use attune::plan::{WorkOp, WorkUnit};
use attune::schedule::{extract_dependencies, DependencyOp, Scheduler, SchedulerOptions, SchedulerState};
use attune::schema::WorkerSchema;
use attune::tree::Node;
use attune::worker::{RecordingWorker, UnitReport, Worker, WorkerRegistry};
use std::sync::Arc;
use std::time::Duration;

struct StalledWorker;

#[async_trait]
impl Worker for StalledWorker {
    async fn generate_status(&self) -> Result<Option<Node>, WorkerError> {
        Ok(None)
    }

    async fn do_work(&self, batch: &[WorkUnit]) -> Result<Vec<UnitReport>, WorkerError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(batch.iter().map(|u| UnitReport::success(u.id().clone())).collect())
    }
}

fn add(worker: &str, id: &str) -> WorkUnit {
    WorkUnit::new(
        addr(&format!("/status/worker['{}']/item['{}']", worker, id)),
        WorkOp::Add,
        Node::new("item").with_id(id),
        None,
    )
}

#[test]
fn test_extracts_and_removes_dependency_section() {
    let mut root = single_worker(&[("a", "1")]).root().clone();
    root.children.push(
        Node::new("deps")
            .with_child(
                Node::new("dep")
                    .with_id("1")
                    .with_attribute("src", "/status/worker['w']/item['a']")
                    .with_attribute("tgt", "/status/worker[@id='w']/item[@id='b']")
                    .with_attribute("op", "requires"),
            )
            .with_child(
                Node::new("dep")
                    .with_id("2")
                    .with_attribute("src", "/status/worker['w']/item['a']")
                    .with_attribute("tgt", "/status/worker['w']/item['c']")
                    .with_attribute("op", "excludes"),
            ),
    );
    let mut desired = attune::tree::ConfigTree::new(root).unwrap();

    let edges = extract_dependencies(&mut desired, &addr("/status/deps")).unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].tgt, addr("/status/worker['w']/item['b']"));
    assert_eq!(edges[1].op, DependencyOp::Excludes);
    assert_eq!(desired, single_worker(&[("a", "1")]));
}

#[test]
fn test_rejects_bad_dependency_entries() {
    let build = |dep: Node| {
        let mut root = single_worker(&[]).root().clone();
        root.children.push(Node::new("deps").with_child(dep));
        attune::tree::ConfigTree::new(root).unwrap()
    };

    let mut missing_op = build(
        Node::new("dep")
            .with_attribute("src", "/status/worker['w']")
            .with_attribute("tgt", "/status/worker['v']"),
    );
    assert!(matches!(
        extract_dependencies(&mut missing_op, &addr("/status/deps")),
        Err(PlanError::Tree(TreeError::Malformed(_)))
    ));

    let mut unknown_op = build(
        Node::new("dep")
            .with_attribute("src", "/status/worker['w']")
            .with_attribute("tgt", "/status/worker['v']")
            .with_attribute("op", "prefers"),
    );
    assert!(extract_dependencies(&mut unknown_op, &addr("/status/deps")).is_err());
}

#[tokio::test]
async fn test_batches_are_grouped_per_worker() {
    let a = Arc::new(RecordingWorker::new());
    let b = Arc::new(RecordingWorker::new());
    let registry = WorkerRegistry::new()
        .with_worker("a", a.clone())
        .with_worker("b", b.clone());
    let mut scheduler = Scheduler::new(registry, SchedulerOptions::new(addr("/status")));

    let units = vec![add("a", "1"), add("b", "1"), add("a", "2")];
    let schema = WorkerSchema::new(addr("/status"), "worker");
    let schedule = scheduler.schedule(&[], &units, &schema).unwrap();
    assert_eq!(schedule.levels.len(), 1);

    let result = scheduler.dispatch(&schedule.levels).await;
    assert!(result.is_success());
    assert_eq!(result.level_summaries[0].batch_count, 2);
    assert_eq!(a.batches().len(), 1);
    assert_eq!(a.unit_count(), 2);
    assert_eq!(b.unit_count(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Done);
}

#[tokio::test]
async fn test_timed_out_worker_fails_only_its_batch() {
    let quick = Arc::new(RecordingWorker::new());
    let registry = WorkerRegistry::new()
        .with_worker("quick", quick.clone())
        .with_worker("stalled", Arc::new(StalledWorker));
    let options = SchedulerOptions::new(addr("/status"))
        .with_worker_timeout(Some(Duration::from_millis(50)));
    let mut scheduler = Scheduler::new(registry, options);

    let levels = vec![vec![add("quick", "1"), add("stalled", "1"), add("stalled", "2")]];
    let result = scheduler.dispatch(&levels).await;
    assert_eq!(result.failures.len(), 2);
    assert!(result.failures.contains(&addr("/status/worker['stalled']/item['2']")));
    assert_eq!(quick.unit_count(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Failed { failed: 2 });
}
