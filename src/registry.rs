use crate::error::{RegistryError, ReplayError};
use crate::source::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// Version cursor of a file that has never been synchronized
pub const UNSYNCED_VERSION: i32 = -1;

/// What the previous runs recorded for one (branch, path)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRegistration {
    /// Identity of the item last seen at this path
    pub file_id: ItemId,
    /// Last revision turned into a commit
    pub version: i32,
    pub content_version: i32,
    pub content_hash: String,
}

/// Persisted per-(branch, path) registration records
///
/// Injected into the engine; the engine assumes exclusive ownership for the
/// duration of a run and does no locking of its own.
pub trait RegistrationStore {
    fn get(&self, branch: &str, path: &str) -> Option<FileRegistration>;

    fn put(&mut self, branch: &str, path: &str, record: FileRegistration);

    /// Swap the identity of an existing record, keeping its cursor
    fn update_identity(&mut self, branch: &str, path: &str, file_id: ItemId);
}

/// Orchestrator bookkeeping for one branch between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    /// Latest commit date finalized by the previous run
    #[serde(default)]
    pub last_commit_time: Option<DateTime<Utc>>,
    /// Paths present at the end of the previous run
    #[serde(default)]
    pub known_paths: BTreeSet<String>,
}

/// JSON-backed registration store
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Registry {
    /// Map of branch -> (path -> registration)
    #[serde(default)]
    pub files: HashMap<String, BTreeMap<String, FileRegistration>>,
    /// Map of branch -> run state
    #[serde(default)]
    pub branches: HashMap<String, BranchState>,
}

impl Registry {
    /// Load the registry from disk, starting empty when the file is missing
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        if !path.exists() {
            tracing::debug!("Registry file not found, starting with empty registry");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| RegistryError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let registry: Registry =
            serde_json::from_str(&content).map_err(|e| RegistryError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            "Loaded registry with {} branches",
            registry.files.len().max(registry.branches.len())
        );
        Ok(registry)
    }

    /// Save the registry to disk
    pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
        let save_failed = |reason: String| RegistryError::SaveFailed {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;

        fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;

        tracing::debug!("Saved registry to {:?}", path);
        Ok(())
    }

    pub fn branch_state(&self, branch: &str) -> BranchState {
        self.branches.get(branch).cloned().unwrap_or_default()
    }

    pub fn set_branch_state(&mut self, branch: &str, state: BranchState) {
        self.branches.insert(branch.to_string(), state);
    }

    /// Number of registered paths on a branch
    pub fn file_count(&self, branch: &str) -> usize {
        self.files.get(branch).map(|f| f.len()).unwrap_or(0)
    }

    /// Forget a path, e.g. once its deletion reached the target
    pub fn remove(&mut self, branch: &str, path: &str) -> Option<FileRegistration> {
        self.files.get_mut(branch)?.remove(path)
    }
}

impl RegistrationStore for Registry {
    fn get(&self, branch: &str, path: &str) -> Option<FileRegistration> {
        self.files.get(branch)?.get(path).cloned()
    }

    fn put(&mut self, branch: &str, path: &str, record: FileRegistration) {
        self.files
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), record);
    }

    fn update_identity(&mut self, branch: &str, path: &str, file_id: ItemId) {
        if let Some(record) = self.files.get_mut(branch).and_then(|f| f.get_mut(path)) {
            record.file_id = file_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(file_id: ItemId, version: i32) -> FileRegistration {
        FileRegistration {
            file_id,
            version,
            content_version: version,
            content_hash: format!("hash-{}", version),
        }
    }

    #[test]
    fn test_default() {
        let registry = Registry::default();
        assert_eq!(registry.file_count("main"), 0);
        assert!(registry.get("main", "a.txt").is_none());
    }

    #[test]
    fn test_put_is_scoped_by_branch() {
        let mut registry = Registry::default();
        registry.put("main", "a.txt", record(10, 2));

        assert_eq!(registry.get("main", "a.txt"), Some(record(10, 2)));
        assert!(registry.get("release", "a.txt").is_none());
        assert_eq!(registry.file_count("main"), 1);
    }

    #[test]
    fn test_update_identity_keeps_cursor() {
        let mut registry = Registry::default();
        registry.put("main", "a.txt", record(10, 4));
        registry.update_identity("main", "a.txt", 77);

        let updated = registry.get("main", "a.txt").unwrap();
        assert_eq!(updated.file_id, 77);
        assert_eq!(updated.version, 4);
    }

    #[test]
    fn test_update_identity_unknown_path_is_noop() {
        let mut registry = Registry::default();
        registry.update_identity("main", "missing.txt", 77);
        assert!(registry.get("main", "missing.txt").is_none());
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::default();
        registry.put("main", "a.txt", record(10, 1));
        assert!(registry.remove("main", "a.txt").is_some());
        assert!(registry.remove("main", "a.txt").is_none());
    }

    #[test]
    fn test_branch_state_defaults() {
        let registry = Registry::default();
        let state = registry.branch_state("main");
        assert!(state.last_commit_time.is_none());
        assert!(state.known_paths.is_empty());
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/registry.json");

        let mut registry = Registry::default();
        registry.put("main", "src/a.c", record(3, 5));
        registry.set_branch_state(
            "main",
            BranchState {
                last_commit_time: Some(Utc.timestamp_opt(1_600_000_000, 0).unwrap()),
                known_paths: ["src/a.c".to_string()].into_iter().collect(),
            },
        );
        registry.save(&path).unwrap();

        let loaded = Registry::load(&path).unwrap();
        assert_eq!(loaded.get("main", "src/a.c"), Some(record(3, 5)));
        assert_eq!(loaded.branch_state("main"), registry.branch_state("main"));
    }

    #[test]
    fn test_load_nonexistent() {
        let dir = tempdir().unwrap();
        let loaded = Registry::load(&dir.path().join("missing.json")).unwrap();
        assert!(loaded.files.is_empty());
    }

    #[test]
    fn test_load_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Registry::load(&path).unwrap_err(),
            ReplayError::Registry(RegistryError::LoadFailed { .. })
        ));
    }
}
