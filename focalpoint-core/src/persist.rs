//! Snapshot persistence for the state cache.
//!
//! The store hands whole JSON snapshots to a [`Persistence`] under a small
//! set of fixed names and reads them back on startup.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{FocalError, FocalResult};

/// Public keys and the selected index.
pub const KEY_STORE: &str = "key-store";
/// The consideration, profile and graph maps.
pub const SPACE_TIME_STORE: &str = "space-time-store";
pub const CURRENT_VIEW: &str = "current-view";
pub const GENESIS_VIEW: &str = "genesis-view";
pub const SELECTED_NODE: &str = "selected-node";

/// Load/save capability for named snapshots.
pub trait Persistence: Send + Sync {
    /// The last value saved under `key`, if any.
    fn load(&self, key: &str) -> FocalResult<Option<String>>;

    /// Replace the value saved under `key`.
    fn save(&self, key: &str, value: &str) -> FocalResult<()>;
}

/// Keeps snapshots in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, key: &str) -> FocalResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> FocalResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<dir>/<key>.json` file per snapshot.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    /// Snapshots live in `dir`, created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> FocalResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\', '.']) {
            return Err(FocalError::Persistence(format!("invalid snapshot name {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Persistence for FilePersistence {
    fn load(&self, key: &str) -> FocalResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FocalError::Persistence(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn save(&self, key: &str, value: &str) -> FocalResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            FocalError::Persistence(format!("failed to create {}: {e}", self.dir.display()))
        })?;

        // Write beside the target and rename so readers never see half a file.
        let partial = path.with_extension("json.partial");
        fs::write(&partial, value).map_err(|e| {
            FocalError::Persistence(format!("failed to write {}: {e}", partial.display()))
        })?;
        fs::rename(&partial, &path).map_err(|e| {
            FocalError::Persistence(format!("failed to replace {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let persistence = MemoryPersistence::new();
        assert_eq!(persistence.load(KEY_STORE).unwrap(), None);

        persistence.save(KEY_STORE, "[1]").unwrap();
        persistence.save(KEY_STORE, "[2]").unwrap();
        assert_eq!(persistence.load(KEY_STORE).unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn files_land_under_their_names() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path().join("state"));

        assert_eq!(persistence.load(SELECTED_NODE).unwrap(), None);
        persistence.save(SELECTED_NODE, "\"127.0.0.1:8831\"").unwrap();

        let on_disk = fs::read_to_string(dir.path().join("state/selected-node.json")).unwrap();
        assert_eq!(on_disk, "\"127.0.0.1:8831\"");
        assert_eq!(
            persistence.load(SELECTED_NODE).unwrap().as_deref(),
            Some("\"127.0.0.1:8831\"")
        );
        assert!(!dir.path().join("state/selected-node.json.partial").exists());
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path());
        assert!(persistence.save("../escape", "x").is_err());
        assert!(persistence.load("").is_err());
    }
}
