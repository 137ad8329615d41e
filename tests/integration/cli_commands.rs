//! Integration tests for CLI command routing

use crate::integration::{single_worker, with_isolated_env, write_schema, write_tree};
use attune::cli::{Cli, Commands, RunContext};
use clap::Parser;
use serde_json::Value;
use tempfile::TempDir;

fn run(test_dir: &TempDir, args: &[&str]) -> Result<String, attune::error::ApiError> {
    let workspace = test_dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();
    let ws = workspace.to_string_lossy().to_string();
    let mut argv = vec!["attune", "--workspace", ws.as_str()];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    with_isolated_env(test_dir, || {
        let context = RunContext::new(cli.workspace.clone(), cli.config.clone())?;
        context.execute(&cli.command, &cli.format)
    })
}

fn json(output: &str) -> Value {
    serde_json::from_str(output).unwrap()
}

#[test]
fn test_diff_reports_changed_addresses() {
    let test_dir = TempDir::new().unwrap();
    let observed = test_dir.path().join("observed.json");
    let desired = test_dir.path().join("desired.json");
    write_tree(&observed, &single_worker(&[("1", "old")]));
    write_tree(&desired, &single_worker(&[("1", "new"), ("2", "b")]));

    let output = run(
        &test_dir,
        &[
            "--format",
            "json",
            "diff",
            "--observed",
            observed.to_str().unwrap(),
            "--desired",
            desired.to_str().unwrap(),
        ],
    )
    .unwrap();
    let value = json(&output);
    assert_eq!(value["summary"]["data_diff"], 1);
    assert_eq!(value["summary"]["right"], 1);
    assert!(value["addresses"]
        .as_array()
        .unwrap()
        .iter()
        .all(|a| a["state"] != "unchanged"));
}

#[test]
fn test_plan_against_persisted_status_and_simulate() {
    let test_dir = TempDir::new().unwrap();
    let workspace = test_dir.path().join("workspace");
    write_schema(&workspace, "w", "work_units = [\"item\"]\n");
    let desired = test_dir.path().join("desired.json");
    write_tree(&desired, &single_worker(&[("1", "a"), ("2", "b")]));
    let desired_arg = desired.to_str().unwrap();

    let plan = json(&run(&test_dir, &["--format", "json", "plan", "--desired", desired_arg]).unwrap());
    assert_eq!(plan["levels"].as_array().unwrap().len(), 1);
    assert!(!workspace.join(".attune/status.json").exists());

    let cycle = json(&run(&test_dir, &["--format", "json", "simulate", "--desired", desired_arg]).unwrap());
    assert_eq!(cycle["units"], 1);
    assert!(cycle["failures"].as_array().unwrap().is_empty());
    assert!(workspace.join(".attune/status.json").exists());

    let text = run(&test_dir, &["plan", "--desired", desired_arg]).unwrap();
    assert!(text.contains("Nothing to do"));
}

#[test]
fn test_validate_files_and_configuration() {
    let test_dir = TempDir::new().unwrap();
    let schema = test_dir.path().join("pkg.toml");
    std::fs::write(&schema, "work_units = [\"package\"]\nordered = [\"repos\"]\n").unwrap();
    let bad_schema = test_dir.path().join("bad.toml");
    std::fs::write(&bad_schema, "units = [\"package\"]\n").unwrap();
    let tree = test_dir.path().join("tree.json");
    std::fs::write(&tree, r#"{"tag": "machine"}"#).unwrap();

    let valid = json(&run(&test_dir, &["--format", "json", "validate", schema.to_str().unwrap()]).unwrap());
    assert_eq!(valid["valid"], true);
    assert_eq!(valid["kind"], "schema");

    let invalid = json(&run(&test_dir, &["--format", "json", "validate", bad_schema.to_str().unwrap()]).unwrap());
    assert_eq!(invalid["valid"], false);

    let wrong_root = json(&run(&test_dir, &["--format", "json", "validate", tree.to_str().unwrap()]).unwrap());
    assert_eq!(wrong_root["valid"], false);
    assert!(wrong_root["errors"][0].as_str().unwrap().contains("expected <status>"));

    let configuration = run(&test_dir, &["validate"]).unwrap();
    assert!(configuration.contains("configuration"));
}

#[test]
fn test_rejects_unknown_output_format() {
    let test_dir = TempDir::new().unwrap();
    let err = run(&test_dir, &["--format", "yaml", "validate"]).unwrap_err();
    assert!(attune::cli::map_error(&err).contains("Invalid output format"));
}

#[test]
fn test_unsatisfiable_plan_maps_to_aborted_message() {
    let test_dir = TempDir::new().unwrap();
    let workspace = test_dir.path().join("workspace");
    write_schema(&workspace, "w", "work_units = [\"item\"]\n");
    let observed = test_dir.path().join("observed.json");
    write_tree(&observed, &single_worker(&[("old", "x")]));
    let desired = test_dir.path().join("desired.json");
    std::fs::write(
        &desired,
        r#"{
  "tag": "status",
  "children": [
    {"tag": "worker", "attributes": {"id": "w"}, "children": [
      {"tag": "item", "attributes": {"id": "new"}, "text": "y"}
    ]},
    {"tag": "deps", "children": [
      {"tag": "dep", "attributes": {
        "src": "/status/worker['w']/item['new']",
        "tgt": "/status/worker['w']/item['old']",
        "op": "requires"
      }}
    ]}
  ]
}"#,
    )
    .unwrap();

    let err = run(
        &test_dir,
        &[
            "plan",
            "--desired",
            desired.to_str().unwrap(),
            "--observed",
            observed.to_str().unwrap(),
        ],
    )
    .unwrap_err();
    assert!(attune::cli::map_error(&err).starts_with("Planning aborted"));
}

#[test]
fn test_commands_parse() {
    let cli = Cli::try_parse_from(["attune", "diff", "--observed", "a", "--desired", "b", "--all"]).unwrap();
    assert!(matches!(cli.command, Commands::Diff { all: true, .. }));
    assert!(Cli::try_parse_from(["attune", "simulate"]).is_err());
}
