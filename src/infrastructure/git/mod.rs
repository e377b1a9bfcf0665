//! Git CLI adapter.
//!
//! Shells out to the `git` binary with an explicit working directory per
//! call, so one client serves the real repository and every sandbox. Stderr
//! is captured and carried into the error; nothing is parsed out of
//! localized human-facing output, only plumbing commands are used.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::domain::error::ExecError;
use crate::domain::ports::GitClient;

/// Production `GitClient` backed by the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    /// Run one git command in `cwd`, returning trimmed stdout.
    async fn git(&self, cwd: &Path, operation: &str, args: &[&str]) -> Result<String, ExecError> {
        debug!(cwd = %cwd.display(), operation, ?args, "running git");
        let output = Command::new("git")
            .current_dir(cwd)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExecError::Git {
                operation: operation.to_string(),
                detail: format!("failed to spawn git: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::Git {
                operation: operation.to_string(),
                detail: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Read one config value, treating unset keys as absent.
    async fn config_get(&self, repo: &Path, key: &str) -> Option<String> {
        self.git(repo, "config_get", &["config", "--get", key])
            .await
            .ok()
            .filter(|value| !value.is_empty())
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn head(&self, repo: &Path) -> Result<String, ExecError> {
        self.git(repo, "head", &["rev-parse", "HEAD"]).await
    }

    async fn clone_at(&self, src: &Path, dst: &Path, commit: &str) -> Result<(), ExecError> {
        let src_str = src.display().to_string();
        let dst_str = dst.display().to_string();
        self.git(src, "clone", &["clone", "--no-hardlinks", &src_str, &dst_str])
            .await?;
        // Commits made in the clone carry the source repository's identity;
        // local config does not survive a clone on its own.
        for key in ["user.name", "user.email"] {
            if let Some(value) = self.config_get(src, key).await {
                self.git(dst, "config", &["config", key, &value]).await?;
            }
        }
        self.git(dst, "checkout", &["checkout", "--quiet", commit])
            .await?;
        Ok(())
    }

    async fn add(&self, repo: &Path, paths: &[String]) -> Result<(), ExecError> {
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.git(repo, "add", &args).await?;
        Ok(())
    }

    async fn add_all(&self, repo: &Path) -> Result<(), ExecError> {
        self.git(repo, "add_all", &["add", "-A"]).await?;
        Ok(())
    }

    async fn commit(&self, repo: &Path, message: &str) -> Result<String, ExecError> {
        self.git(repo, "commit", &["commit", "-m", message]).await?;
        self.git(repo, "commit", &["rev-parse", "HEAD"]).await
    }

    async fn apply_patch(&self, repo: &Path, patch_file: &Path) -> Result<(), ExecError> {
        let patch = patch_file.display().to_string();
        // --index keeps the working tree and index consistent and makes the
        // apply all-or-nothing per patch.
        self.git(repo, "apply_patch", &["apply", "--index", &patch])
            .await?;
        Ok(())
    }

    async fn commit_range(
        &self,
        repo: &Path,
        base: &str,
        head: &str,
    ) -> Result<Vec<String>, ExecError> {
        let range = format!("{base}..{head}");
        let stdout = self
            .git(repo, "commit_range", &["rev-list", "--reverse", &range])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    async fn format_patches(
        &self,
        repo: &Path,
        base: &str,
        head: &str,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExecError> {
        let range = format!("{base}..{head}");
        let dir = out_dir.display().to_string();
        let stdout = self
            .git(
                repo,
                "format_patches",
                &["format-patch", "--output-directory", &dir, &range],
            )
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    async fn reset_hard(&self, repo: &Path, commit: &str) -> Result<(), ExecError> {
        self.git(repo, "reset_hard", &["reset", "--hard", commit])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn init_repo() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().to_path_buf();
        for args in [
            vec!["init"],
            vec!["config", "user.email", "warden-test@example.com"],
            vec!["config", "user.name", "Warden Test"],
            vec!["commit", "--allow-empty", "-m", "initial commit"],
        ] {
            let status = StdCommand::new("git")
                .args(&args)
                .current_dir(&path)
                .output()
                .expect("failed to run git");
            assert!(status.status.success(), "git {args:?} failed");
        }
        (dir, path)
    }

    fn write_and_commit(repo: &Path, file: &str, content: &str, message: &str) {
        std::fs::write(repo.join(file), content).unwrap();
        for args in [vec!["add", "-A"], vec!["commit", "-m", message]] {
            let status = StdCommand::new("git")
                .args(&args)
                .current_dir(repo)
                .output()
                .expect("failed to run git");
            assert!(status.status.success(), "git {args:?} failed");
        }
    }

    #[tokio::test]
    async fn test_head_resolves_commit_hash() {
        let (_dir, repo) = init_repo();
        let git = GitCli::new();

        let head = git.head(&repo).await.unwrap();
        assert_eq!(head.len(), 40);
        assert!(head.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_head_fails_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new();

        let err = git.head(dir.path()).await.unwrap_err();
        assert!(matches!(err, ExecError::Git { .. }));
    }

    #[tokio::test]
    async fn test_clone_at_checks_out_requested_commit() {
        let (_dir, repo) = init_repo();
        let git = GitCli::new();
        let first = git.head(&repo).await.unwrap();
        write_and_commit(&repo, "a.txt", "one", "add a");

        let clone_parent = tempfile::tempdir().unwrap();
        let dst = clone_parent.path().join("sandbox");
        git.clone_at(&repo, &dst, &first).await.unwrap();

        assert_eq!(git.head(&dst).await.unwrap(), first);
        assert!(!dst.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_commit_and_commit_range() {
        let (_dir, repo) = init_repo();
        let git = GitCli::new();
        let base = git.head(&repo).await.unwrap();

        std::fs::write(repo.join("x.txt"), "x").unwrap();
        git.add_all(&repo).await.unwrap();
        let c1 = git.commit(&repo, "add x").await.unwrap();

        std::fs::write(repo.join("y.txt"), "y").unwrap();
        git.add(&repo, &["y.txt".to_string()]).await.unwrap();
        let c2 = git.commit(&repo, "add y").await.unwrap();

        let head = git.head(&repo).await.unwrap();
        assert_eq!(head, c2);

        let range = git.commit_range(&repo, &base, &head).await.unwrap();
        assert_eq!(range, vec![c1, c2]);
    }

    #[tokio::test]
    async fn test_format_patches_and_apply_round_trip() {
        let (_dir, repo) = init_repo();
        let git = GitCli::new();
        let base = git.head(&repo).await.unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let target = target_dir.path().join("target");
        git.clone_at(&repo, &target, &base).await.unwrap();

        write_and_commit(&repo, "feature.txt", "payload\n", "add feature");
        let head = git.head(&repo).await.unwrap();

        let patches_dir = tempfile::tempdir().unwrap();
        let patches = git
            .format_patches(&repo, &base, &head, patches_dir.path())
            .await
            .unwrap();
        assert_eq!(patches.len(), 1);
        assert!(patches[0].exists());

        git.apply_patch(&target, &patches[0]).await.unwrap();
        let applied = std::fs::read_to_string(target.join("feature.txt")).unwrap();
        assert_eq!(applied, "payload\n");
    }

    #[tokio::test]
    async fn test_clone_carries_commit_identity() {
        let (_dir, repo) = init_repo();
        let git = GitCli::new();
        let head = git.head(&repo).await.unwrap();

        let clone_parent = tempfile::tempdir().unwrap();
        let dst = clone_parent.path().join("sandbox");
        git.clone_at(&repo, &dst, &head).await.unwrap();

        std::fs::write(dst.join("new.txt"), "content").unwrap();
        git.add_all(&dst).await.unwrap();
        let commit = git.commit(&dst, "commit inside clone").await.unwrap();
        assert_eq!(commit.len(), 40);
    }

    #[tokio::test]
    async fn test_reset_hard_restores_commit() {
        let (_dir, repo) = init_repo();
        let git = GitCli::new();
        let base = git.head(&repo).await.unwrap();

        write_and_commit(&repo, "temp.txt", "temp", "add temp");
        assert!(repo.join("temp.txt").exists());

        git.reset_hard(&repo, &base).await.unwrap();
        assert_eq!(git.head(&repo).await.unwrap(), base);
        assert!(!repo.join("temp.txt").exists());
    }
}
