//! Pre-execution checkpoints and best-effort recovery.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::domain::error::ExecError;
use crate::domain::models::RollbackPoint;
use crate::domain::ports::GitClient;

/// Captures restore points for one execution run.
///
/// Points live only as long as the run. On unexpected failure the most
/// recent point is the one restored.
pub struct RollbackManager {
    git: Arc<dyn GitClient>,
    points: RwLock<Vec<RollbackPoint>>,
}

impl RollbackManager {
    pub fn new(git: Arc<dyn GitClient>) -> Self {
        Self {
            git,
            points: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot the repository's current head as a restore point.
    #[instrument(skip(self), fields(repo = %repo_root.display()))]
    pub async fn checkpoint(
        &self,
        label: &str,
        repo_root: &Path,
        sandbox_path: &Path,
    ) -> Result<RollbackPoint, ExecError> {
        let base_commit = self.git.head(repo_root).await?;
        let point = RollbackPoint::new(label, base_commit, sandbox_path);
        info!(label, base_commit = %point.base_commit, "rollback checkpoint created");
        self.points.write().await.push(point.clone());
        Ok(point)
    }

    /// The most recent checkpoint, if any.
    pub async fn latest(&self) -> Option<RollbackPoint> {
        self.points.read().await.last().cloned()
    }

    /// Restore the repository to the most recent checkpoint.
    ///
    /// Best-effort by contract: failures are reported, not retried, and
    /// the caller continues finalization either way.
    #[instrument(skip(self), fields(repo = %repo_root.display()))]
    pub async fn restore_latest(
        &self,
        repo_root: &Path,
    ) -> Result<Option<RollbackPoint>, ExecError> {
        let Some(point) = self.latest().await else {
            warn!("restore requested but no checkpoint exists");
            return Ok(None);
        };
        self.git.reset_hard(repo_root, &point.base_commit).await?;
        info!(label = %point.label, base_commit = %point.base_commit, "repository restored");
        Ok(Some(point))
    }
}
