//! Disposable sandbox working copies.
//!
//! A sandbox is a full clone of the target repository checked out at the
//! run's base commit. All operations execute against it; nothing touches
//! the real repository until bring-back, and the sandbox is destroyed in
//! every teardown path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::error::ExecError;
use crate::domain::ports::GitClient;

/// A live sandbox working copy.
#[derive(Debug, Clone)]
pub struct Sandbox {
    path: PathBuf,
    base_commit: String,
}

impl Sandbox {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_commit(&self) -> &str {
        &self.base_commit
    }

    /// A sandbox is valid while its clone metadata is on disk.
    pub fn is_valid(&self) -> bool {
        self.path.join(".git").exists()
    }
}

/// Creates and destroys sandboxes for execution runs.
pub struct SandboxManager {
    git: Arc<dyn GitClient>,
}

impl SandboxManager {
    pub fn new(git: Arc<dyn GitClient>) -> Self {
        Self { git }
    }

    /// Clone `repo_root` at `base_commit` into `dest`.
    #[instrument(skip(self), fields(repo = %repo_root.display(), dest = %dest.display()))]
    pub async fn create(
        &self,
        repo_root: &Path,
        base_commit: &str,
        dest: &Path,
    ) -> Result<Sandbox, ExecError> {
        if dest.exists() {
            return Err(ExecError::Git {
                operation: "clone".to_string(),
                detail: format!("sandbox destination {} already exists", dest.display()),
            });
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.git.clone_at(repo_root, dest, base_commit).await?;
        info!(base_commit, "sandbox created");
        Ok(Sandbox {
            path: dest.to_path_buf(),
            base_commit: base_commit.to_string(),
        })
    }

    /// Remove the sandbox directory.
    ///
    /// Callers treat failure as a teardown warning, not a run failure; a
    /// leftover sandbox directory leaks disk, it does not leak commits.
    #[instrument(skip(self, sandbox), fields(path = %sandbox.path.display()))]
    pub async fn destroy(&self, sandbox: &Sandbox) -> Result<(), ExecError> {
        match tokio::fs::remove_dir_all(&sandbox.path).await {
            Ok(()) => {
                info!("sandbox destroyed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(error = %e, "failed to remove sandbox directory");
                Err(ExecError::Io(e))
            }
        }
    }
}
