//! Persisted observed status
//!
//! The observed tree from the last cycle is kept as one JSON document. It is
//! read at cycle start and replaced atomically at cycle end.

use crate::error::StorageError;
use crate::tree::ConfigTree;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct StatusStore {
    path: PathBuf,
    root_tag: String,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>, root_tag: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            root_tag: root_tag.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the previous status. A missing file yields an empty status tree.
    pub fn load(&self) -> Result<ConfigTree, StorageError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No previous status, starting empty");
            return ConfigTree::empty(&self.root_tag)
                .map_err(|e| StorageError::Serialization(e.to_string()));
        }
        let document = fs::read_to_string(&self.path)?;
        let tree = ConfigTree::from_json(&document).map_err(|e| {
            StorageError::Serialization(format!(
                "Failed to load status from {:?}: {}",
                self.path, e
            ))
        })?;
        if tree.root().tag != self.root_tag {
            return Err(StorageError::Serialization(format!(
                "Status in {:?} is rooted at <{}>, expected <{}>",
                self.path,
                tree.root().tag,
                self.root_tag
            )));
        }
        Ok(tree)
    }

    /// Replace the persisted status with `tree`.
    ///
    /// Writes a temporary sibling file, then renames it over the target.
    pub fn save(&self, tree: &ConfigTree) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create parent directory {:?}: {}", parent, e),
                ))
            })?;
        }

        let serialized = tree
            .to_json()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized.as_bytes()).map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write status to {:?}: {}", temp_path, e),
            ))
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", self.path, e),
            ))
        })?;

        info!(path = %self.path.display(), "Status saved");
        Ok(())
    }
}
