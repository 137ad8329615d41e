//! Shared test utilities for integration tests
//!
//! Environment isolation for configuration loading and small tree builders.

use attune::tree::{ConfigTree, Node, PathAddress};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes every test that touches process environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: [&str; 4] = ["HOME", "XDG_CONFIG_HOME", "ATTUNE_ENV", "ATTUNE__ENGINE__ROOT_TAG"];

/// Environment variable state to restore after test
struct EnvState(Vec<(&'static str, Option<String>)>);

impl EnvState {
    fn capture() -> Self {
        Self(
            ISOLATED_VARS
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        )
    }

    fn restore(self) {
        for (name, value) in self.0 {
            match value {
                Some(orig) => std::env::set_var(name, orig),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir` and the
/// Attune variables cleared, restoring everything afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().join("xdg"));
    std::env::remove_var("ATTUNE_ENV");
    std::env::remove_var("ATTUNE__ENGINE__ROOT_TAG");

    let result = f();

    env_state.restore();

    result
}

pub fn addr(s: &str) -> PathAddress {
    PathAddress::parse(s).unwrap()
}

/// `/status/worker['w']` holding one `item` per `(id, text)` pair.
pub fn single_worker(items: &[(&str, &str)]) -> ConfigTree {
    let mut worker = Node::new("worker").with_id("w");
    for (id, text) in items {
        worker = worker.with_child(Node::new("item").with_id(*id).with_text(*text));
    }
    ConfigTree::new(Node::new("status").with_child(worker)).unwrap()
}

pub fn write_schema(workspace: &Path, worker: &str, source: &str) {
    let dir = workspace.join("schemas");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.toml", worker)), source).unwrap();
}

pub fn write_tree(path: &Path, tree: &ConfigTree) {
    std::fs::write(path, tree.to_json().unwrap()).unwrap();
}
