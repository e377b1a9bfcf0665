//! Rollback checkpoint model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A recoverable point captured before side effects begin.
///
/// Lifetime is one execution run; the most recent point is the one used
/// for recovery on unexpected failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPoint {
    /// Human-readable label, e.g. `pre_execution`
    pub label: String,
    /// Commit the repository can be restored to
    pub base_commit: String,
    /// Sandbox working copy the point refers to
    pub sandbox_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl RollbackPoint {
    pub fn new(
        label: impl Into<String>,
        base_commit: impl Into<String>,
        sandbox_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            label: label.into(),
            base_commit: base_commit.into(),
            sandbox_path: sandbox_path.into(),
            created_at: Utc::now(),
        }
    }
}
