//! Integration tests for full reconciliation cycles against recording workers

use crate::integration::{addr, single_worker, write_schema};
use attune::config::AttuneConfig;
use attune::plan::WorkOp;
use attune::reconcile::Reconciler;
use attune::tree::{ConfigTree, Node};
use attune::worker::{RecordingWorker, WorkerRegistry};
use std::sync::Arc;
use tempfile::TempDir;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_schema(dir.path(), "w", "work_units = [\"item\"]\n");
    dir
}

fn reconciler(dir: &TempDir, registry: WorkerRegistry) -> Reconciler {
    Reconciler::from_config(&AttuneConfig::default(), dir.path(), registry).unwrap()
}

fn with_deps(tree: ConfigTree, deps: &[(&str, &str, &str)]) -> ConfigTree {
    let mut section = Node::new("deps");
    for (n, (src, tgt, op)) in deps.iter().enumerate() {
        section = section.with_child(
            Node::new("dep")
                .with_id(n.to_string())
                .with_attribute("src", *src)
                .with_attribute("tgt", *tgt)
                .with_attribute("op", *op),
        );
    }
    let mut root = tree.root().clone();
    root.children.push(section);
    ConfigTree::new(root).unwrap()
}

#[tokio::test]
async fn test_status_persists_across_reconcilers() {
    let dir = workspace();
    let desired = single_worker(&[("1", "a"), ("2", "b")]);

    let worker = Arc::new(RecordingWorker::new());
    let first = reconciler(&dir, WorkerRegistry::new().with_worker("w", worker.clone()));
    let report = first.run_cycle(desired.clone()).await.unwrap();
    assert_eq!(report.unit_count, 1);
    assert!(dir.path().join(".attune/status.json").exists());

    let worker = Arc::new(RecordingWorker::new());
    let second = reconciler(&dir, WorkerRegistry::new().with_worker("w", worker.clone()));
    let report = second.run_cycle(desired).await.unwrap();
    assert_eq!(report.unit_count, 0);
    assert!(worker.batches().is_empty());
}

#[tokio::test]
async fn test_required_unit_is_dispatched_first() {
    let dir = workspace();
    let worker = Arc::new(RecordingWorker::new());
    let reconciler = reconciler(&dir, WorkerRegistry::new().with_worker("w", worker.clone()));
    reconciler.store().save(&single_worker(&[])).unwrap();

    let desired = with_deps(
        single_worker(&[("app", "1"), ("lib", "2")]),
        &[(
            "/status/worker['w']/item['app']",
            "/status/worker['w']/item['lib']",
            "requires",
        )],
    );
    let report = reconciler.run_cycle(desired).await.unwrap();
    assert!(report.result.is_success());
    assert_eq!(report.result.level_summaries.len(), 2);

    let batches = worker.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0][0].id(), &addr("/status/worker['w']/item['lib']"));
    assert_eq!(batches[1][0].id(), &addr("/status/worker['w']/item['app']"));
    assert!(!report.status.contains(&addr("/status/deps")));
}

#[tokio::test]
async fn test_failed_unit_is_retried_next_cycle() {
    let dir = workspace();
    let worker = Arc::new(RecordingWorker::new());
    let reconciler = reconciler(&dir, WorkerRegistry::new().with_worker("w", worker.clone()));
    reconciler.store().save(&single_worker(&[])).unwrap();
    let failing = addr("/status/worker['w']/item['2']");
    worker.fail_unit(failing.clone(), "package mirror offline");

    let desired = single_worker(&[("1", "a"), ("2", "b")]);
    let report = reconciler.run_cycle(desired.clone()).await.unwrap();
    assert!(report.failures().contains(&failing));
    assert!(!report.status.contains(&failing));
    assert!(report.status.contains(&addr("/status/worker['w']")));

    let worker = Arc::new(RecordingWorker::new());
    let retry = Reconciler::from_config(
        &AttuneConfig::default(),
        dir.path(),
        WorkerRegistry::new().with_worker("w", worker.clone()),
    )
    .unwrap();
    let report = retry.run_cycle(desired.clone()).await.unwrap();
    assert!(report.result.is_success());
    let batches = worker.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].id(), &failing);
    assert_eq!(batches[0][0].op(), WorkOp::Add);
    assert_eq!(report.status, desired);
}

#[tokio::test]
async fn test_unregistered_worker_fails_its_units() {
    let dir = workspace();
    let reconciler = reconciler(&dir, WorkerRegistry::new());
    let report = reconciler
        .run_cycle(single_worker(&[("1", "a")]))
        .await
        .unwrap();
    assert!(!report.result.is_success());
    let messages: Vec<String> = report
        .result
        .failed_reports()
        .map(|r| r.to_string())
        .collect();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("no worker registered for 'w'"));
    assert_eq!(report.status, ConfigTree::empty("status").unwrap());
}
