//! Per-repository mutual exclusion for execution runs.
//!
//! The lock is a file created with `create_new` (O_EXCL), keyed by a hash
//! of the repository's canonical root. Acquisition is non-blocking: a held
//! lock fails the second caller immediately, it never queues. Release
//! happens explicitly in the run's teardown and again on drop as a
//! backstop.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

use crate::domain::error::ExecError;
use crate::services::checksum::sha256_hex;

/// Identity hash for a repository root.
///
/// Canonicalizes when possible so `/repo` and `/repo/../repo` contend for
/// the same lock; falls back to the literal path for roots that do not
/// exist yet.
pub fn repo_hash(repo_root: &Path) -> String {
    let canonical = repo_root
        .canonicalize()
        .unwrap_or_else(|_| repo_root.to_path_buf());
    sha256_hex(canonical.display().to_string().as_bytes())
}

/// Holds one repository's execution lock until released or dropped.
#[derive(Debug)]
pub struct ExecutionLockGuard {
    lock_path: PathBuf,
    repo_hash: String,
    released: bool,
}

impl ExecutionLockGuard {
    pub fn repo_hash(&self) -> &str {
        &self.repo_hash
    }

    /// Release the lock now.
    pub async fn release(mut self) -> Result<(), ExecError> {
        self.released = true;
        tokio::fs::remove_file(&self.lock_path).await?;
        debug!(repo_hash = %self.repo_hash, "execution lock released");
        Ok(())
    }
}

impl Drop for ExecutionLockGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.lock_path) {
                warn!(
                    repo_hash = %self.repo_hash,
                    error = %e,
                    "failed to remove lock file on drop"
                );
            }
        }
    }
}

/// Factory for per-repository execution locks.
pub struct ExecutionLock {
    locks_dir: PathBuf,
}

impl ExecutionLock {
    pub fn new(locks_dir: impl Into<PathBuf>) -> Self {
        Self {
            locks_dir: locks_dir.into(),
        }
    }

    /// Try to take the lock for `repo_root`.
    ///
    /// Fail-closed: any inability to create the lock file exclusively,
    /// including a transient filesystem error, denies the run.
    #[instrument(skip(self), fields(repo_root = %repo_root.display()))]
    pub async fn acquire(
        &self,
        repo_root: &Path,
        execution_request_id: &str,
    ) -> Result<ExecutionLockGuard, ExecError> {
        let hash = repo_hash(repo_root);
        tokio::fs::create_dir_all(&self.locks_dir).await?;
        let lock_path = self.locks_dir.join(format!("{hash}.lock"));

        let open = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await;

        let file = match open {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(repo_hash = %hash, "execution lock already held");
                return Err(ExecError::LockHeld { repo_hash: hash });
            }
            Err(e) => return Err(ExecError::Io(e)),
        };
        drop(file);

        // Holder info for forensics; losing this write does not lose the lock.
        let holder = serde_json::json!({
            "execution_request_id": execution_request_id,
            "repo_root": repo_root.display().to_string(),
            "pid": std::process::id(),
            "acquired_at": Utc::now(),
        });
        if let Err(e) = tokio::fs::write(&lock_path, holder.to_string()).await {
            warn!(repo_hash = %hash, error = %e, "failed to write lock holder info");
        }

        debug!(repo_hash = %hash, "execution lock acquired");
        Ok(ExecutionLockGuard {
            lock_path,
            repo_hash: hash,
            released: false,
        })
    }
}
