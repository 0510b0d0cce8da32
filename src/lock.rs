//! Per-branch filesystem lock
//!
//! The engine assumes it is the only writer of a branch's registrations for
//! the whole run. `BranchLock` makes the binary honour that across processes
//! with an exclusive flock on a file derived from (registry, branch).

use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lock file for a (registry, branch) pair inside `dir`
fn lock_file_path(dir: &Path, registry: &Path, branch: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(registry.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(branch.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    dir.join(format!("{}.lock", &hash[..16]))
}

/// Guard holding the exclusive lock; released on drop
pub struct BranchLock {
    _file: File,
    branch: String,
}

impl BranchLock {
    /// Try to lock `branch` of `registry` without blocking, keeping the lock
    /// file in `dir`
    ///
    /// Returns `Ok(None)` when another process holds the lock.
    pub fn try_acquire_in(dir: &Path, registry: &Path, branch: &str) -> Result<Option<Self>> {
        let lock_path = lock_file_path(dir, registry, branch);
        fs::create_dir_all(dir).context("Failed to create lock directory")?;
        let file = File::create(&lock_path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Locked branch {} (lock_file={:?})", branch, lock_path);
                Ok(Some(Self {
                    _file: file,
                    branch: branch.to_string(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e).context("Failed to acquire branch lock"),
        }
    }

    /// Poll until the lock is free or `timeout` expires
    pub fn acquire_blocking(
        dir: &Path,
        registry: &Path,
        branch: &str,
        timeout: Duration,
    ) -> Result<Option<Self>> {
        let start = Instant::now();
        let sleep_interval = Duration::from_millis(200).min(timeout.max(Duration::from_millis(10)));

        loop {
            if let Some(lock) = Self::try_acquire_in(dir, registry, branch)? {
                return Ok(Some(lock));
            }
            if start.elapsed() >= timeout {
                tracing::warn!(
                    "Timeout waiting for branch {} after {:?}",
                    branch,
                    timeout
                );
                return Ok(None);
            }
            tracing::info!("Branch {} is busy, waiting", branch);
            std::thread::sleep(sleep_interval);
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }
}

impl Drop for BranchLock {
    fn drop(&mut self) {
        tracing::debug!("Releasing lock on branch {}", self.branch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let registry = Path::new("/data/registry.json");

        let lock = BranchLock::try_acquire_in(dir.path(), registry, "main").unwrap();
        assert_eq!(lock.as_ref().unwrap().branch(), "main");
        drop(lock);

        assert!(
            BranchLock::try_acquire_in(dir.path(), registry, "main")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_same_branch_is_exclusive() {
        let dir = tempdir().unwrap();
        let registry = Path::new("/data/registry.json");
        let _held = BranchLock::try_acquire_in(dir.path(), registry, "main")
            .unwrap()
            .unwrap();

        let dir_path = dir.path().to_path_buf();
        let handle = thread::spawn(move || {
            BranchLock::try_acquire_in(&dir_path, Path::new("/data/registry.json"), "main")
                .unwrap()
                .is_none()
        });
        assert!(handle.join().unwrap(), "second lock on the branch should fail");
    }

    #[test]
    fn test_other_branch_is_independent() {
        let dir = tempdir().unwrap();
        let registry = Path::new("/data/registry.json");
        let _main = BranchLock::try_acquire_in(dir.path(), registry, "main")
            .unwrap()
            .unwrap();
        assert!(
            BranchLock::try_acquire_in(dir.path(), registry, "release")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_blocking_acquire_times_out() {
        let dir = tempdir().unwrap();
        let registry = Path::new("/data/registry.json");
        let _held = BranchLock::try_acquire_in(dir.path(), registry, "main")
            .unwrap()
            .unwrap();

        let dir_path = dir.path().to_path_buf();
        let handle = thread::spawn(move || {
            BranchLock::acquire_blocking(
                &dir_path,
                Path::new("/data/registry.json"),
                "main",
                Duration::from_millis(100),
            )
            .unwrap()
            .is_none()
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_lock_file_path_uniqueness() {
        let dir = Path::new("/locks");
        let a = lock_file_path(dir, Path::new("/r.json"), "main");
        let b = lock_file_path(dir, Path::new("/r.json"), "release");
        let c = lock_file_path(dir, Path::new("/other.json"), "main");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, lock_file_path(dir, Path::new("/r.json"), "main"));
    }
}
