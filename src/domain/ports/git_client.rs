use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::error::ExecError;

/// Port for version-control operations.
///
/// The core consumes git through this narrow interface only; the production
/// adapter shells out to the `git` binary. Every method targets an explicit
/// repository path so one client serves the real repository and any number
/// of sandboxes.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Resolve the current HEAD commit hash.
    async fn head(&self, repo: &Path) -> Result<String, ExecError>;

    /// Clone `src` into `dst` and check out `commit`.
    async fn clone_at(&self, src: &Path, dst: &Path, commit: &str) -> Result<(), ExecError>;

    /// Stage specific paths.
    async fn add(&self, repo: &Path, paths: &[String]) -> Result<(), ExecError>;

    /// Stage everything.
    async fn add_all(&self, repo: &Path) -> Result<(), ExecError>;

    /// Commit staged changes, returning the new commit hash.
    async fn commit(&self, repo: &Path, message: &str) -> Result<String, ExecError>;

    /// Apply a patch file to the working tree and index.
    async fn apply_patch(&self, repo: &Path, patch_file: &Path) -> Result<(), ExecError>;

    /// Commits reachable from `head` but not `base`, oldest first.
    async fn commit_range(
        &self,
        repo: &Path,
        base: &str,
        head: &str,
    ) -> Result<Vec<String>, ExecError>;

    /// Write one patch file per commit in `base..head` into `out_dir`,
    /// returning the generated files oldest first.
    async fn format_patches(
        &self,
        repo: &Path,
        base: &str,
        head: &str,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExecError>;

    /// Hard-reset the repository to `commit`.
    async fn reset_hard(&self, repo: &Path, commit: &str) -> Result<(), ExecError>;
}
