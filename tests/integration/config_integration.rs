//! Integration tests for layered configuration loading

use crate::integration::with_isolated_env;
use attune::config::ConfigLoader;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(path: PathBuf, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_defaults_without_any_file() {
    let test_dir = TempDir::new().unwrap();
    let config = with_isolated_env(&test_dir, || {
        ConfigLoader::load(&test_dir.path().join("workspace")).unwrap()
    });
    assert_eq!(config, ConfigLoader::default());
}

#[test]
fn test_workspace_file_overrides_global_file() {
    let test_dir = TempDir::new().unwrap();
    let workspace = test_dir.path().join("workspace");
    write(
        test_dir.path().join("xdg/attune/config.toml"),
        "[engine]\nroot_tag = \"host\"\nworker_timeout_secs = 10\n",
    );
    write(
        workspace.join("config/config.toml"),
        "[engine]\nworker_timeout_secs = 30\n",
    );

    let (config, global_path) = with_isolated_env(&test_dir, || {
        (
            ConfigLoader::load(&workspace).unwrap(),
            ConfigLoader::global_config_path(),
        )
    });
    assert_eq!(config.engine.root_tag, "host");
    assert_eq!(config.engine.worker_timeout_secs, Some(30));
    assert_eq!(
        global_path,
        Some(test_dir.path().join("xdg/attune/config.toml"))
    );
}

#[test]
fn test_environment_file_and_variables_win() {
    let test_dir = TempDir::new().unwrap();
    let workspace = test_dir.path().join("workspace");
    write(
        workspace.join("config/config.toml"),
        "[storage]\nstatus_path = \"state/base.json\"\n",
    );
    write(
        workspace.join("config/production.toml"),
        "[storage]\nstatus_path = \"state/prod.json\"\n[logging]\nlevel = \"warn\"\n",
    );

    let config = with_isolated_env(&test_dir, || {
        std::env::set_var("ATTUNE_ENV", "production");
        std::env::set_var("ATTUNE__ENGINE__ROOT_TAG", "machine");
        ConfigLoader::load(&workspace).unwrap()
    });
    assert_eq!(config.storage.status_path, PathBuf::from("state/prod.json"));
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.engine.root_tag, "machine");
    assert_eq!(
        config.status_path(&workspace),
        workspace.join("state/prod.json")
    );
}

#[test]
fn test_invalid_values_are_reported_by_validate() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("attune.toml");
    std::fs::write(
        &config_file,
        "[engine]\ndeps_tag = \"worker\"\n[logging]\nformat = \"xml\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
}
