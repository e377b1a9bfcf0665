//! Append-only, checksummed audit trail for one execution run.
//!
//! The trail opens before any other side effect of a run, so even setup
//! failures are captured. Events accumulate in memory in true decision
//! order and flush to `audit/run_tape.jsonl`; a checksum manifest over the
//! tape and the original request makes tampering evident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::error::ExecError;
use crate::domain::models::{AuditLevel, ExecutionRequest, ExecutionResult};
use crate::services::checksum::{sha256_file, sha256_hex};

/// File names inside a run directory.
const REQUEST_FILE: &str = "execution_request.json";
const RESULT_FILE: &str = "execution_result.json";
const TAPE_FILE: &str = "audit/run_tape.jsonl";
const CHECKSUMS_FILE: &str = "audit/checksums.json";
const PROOF_FILE: &str = "audit/sandbox_proof.json";
const SUMMARY_FILE: &str = "reports/execution_summary.json";

/// One event on the run tape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeEvent {
    /// Monotonic position within the run; the true decision order
    pub seq: u64,
    pub level: AuditLevel,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Condensed run report written under `reports/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_request_id: String,
    pub status: String,
    pub commit_count: usize,
    pub patch_count: usize,
    pub sandbox_used: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionSummary {
    /// Derive a summary from a finished result.
    pub fn from_result(result: &ExecutionResult, sandbox_used: bool) -> Self {
        Self {
            execution_request_id: result.execution_request_id.clone(),
            status: result.status.as_str().to_string(),
            commit_count: result.commits_brought_back.len(),
            patch_count: result.patches_generated.len(),
            sandbox_used,
            started_at: result.started_at,
            completed_at: result.completed_at,
            error: result.error.clone(),
        }
    }
}

/// Evidence that bring-back replayed exactly what the sandbox produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxProof {
    /// Commits made inside the sandbox working copy
    pub worktree_commits: Vec<String>,
    /// Real-repository commits present after the merge
    pub main_repo_commits_after_merge: Vec<String>,
    /// Patch file name to content hash
    pub patch_sha256: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brought_back_at: Option<DateTime<Utc>>,
}

/// Checksum manifest over the run's integrity-bearing files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumManifest {
    pub generated_at: DateTime<Utc>,
    /// Run-relative file name to sha256
    pub files: BTreeMap<String, String>,
}

/// Append-only event log for one execution run.
pub struct AuditTrail {
    run_dir: PathBuf,
    events: RwLock<Vec<TapeEvent>>,
}

impl AuditTrail {
    /// Open the trail for a run: create the run directory tree and persist
    /// the original request before anything else can go wrong.
    #[instrument(skip(request), fields(execution_request_id = %request.execution_request_id))]
    pub async fn open(runs_root: &Path, request: &ExecutionRequest) -> Result<Self, ExecError> {
        let run_dir = absolutize(runs_root.join(&request.execution_request_id))?;
        tokio::fs::create_dir_all(run_dir.join("audit")).await?;
        tokio::fs::create_dir_all(run_dir.join("reports")).await?;
        tokio::fs::create_dir_all(run_dir.join("patches")).await?;

        let request_json = serde_json::to_vec_pretty(request)?;
        tokio::fs::write(run_dir.join(REQUEST_FILE), request_json).await?;

        let trail = Self {
            run_dir,
            events: RwLock::new(Vec::new()),
        };
        trail
            .record(
                AuditLevel::Info,
                "run_opened",
                serde_json::json!({
                    "execution_request_id": request.execution_request_id,
                    "repo_root": request.repo_root.display().to_string(),
                }),
            )
            .await;
        Ok(trail)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Where the sandbox working copy for this run lives.
    pub fn sandbox_dir(&self) -> PathBuf {
        self.run_dir.join("sandbox")
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.run_dir.join("patches")
    }

    /// Append one event. In-memory and infallible: a decision can always
    /// be recorded, persistence happens at flush.
    pub async fn record(&self, level: AuditLevel, event_type: &str, payload: serde_json::Value) {
        let mut events = self.events.write().await;
        let event = TapeEvent {
            seq: events.len() as u64,
            level,
            event_type: event_type.to_string(),
            payload,
            recorded_at: Utc::now(),
        };
        debug!(seq = event.seq, event_type, "tape event");
        events.push(event);
    }

    pub async fn record_info(&self, event_type: &str, payload: serde_json::Value) {
        self.record(AuditLevel::Info, event_type, payload).await;
    }

    pub async fn record_decision(&self, event_type: &str, payload: serde_json::Value) {
        self.record(AuditLevel::Decision, event_type, payload).await;
    }

    pub async fn record_error(&self, event_type: &str, payload: serde_json::Value) {
        self.record(AuditLevel::Error, event_type, payload).await;
    }

    /// Snapshot of all events so far.
    pub async fn events(&self) -> Vec<TapeEvent> {
        self.events.read().await.clone()
    }

    /// Whether an event of the given type has been recorded.
    pub async fn has_event(&self, event_type: &str) -> bool {
        self.events
            .read()
            .await
            .iter()
            .any(|e| e.event_type == event_type)
    }

    /// Persist the tape as one JSON object per line.
    pub async fn flush(&self) -> Result<PathBuf, ExecError> {
        let events = self.events.read().await;
        let mut out = String::new();
        for event in events.iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        let path = self.run_dir.join(TAPE_FILE);
        tokio::fs::write(&path, out).await?;
        Ok(path)
    }

    /// Persist the full execution result record.
    pub async fn write_result(&self, result: &ExecutionResult) -> Result<(), ExecError> {
        let bytes = serde_json::to_vec_pretty(result)?;
        tokio::fs::write(self.run_dir.join(RESULT_FILE), bytes).await?;
        Ok(())
    }

    /// Persist the condensed summary report.
    pub async fn write_summary(&self, summary: &ExecutionSummary) -> Result<(), ExecError> {
        let bytes = serde_json::to_vec_pretty(summary)?;
        tokio::fs::write(self.run_dir.join(SUMMARY_FILE), bytes).await?;
        Ok(())
    }

    /// Persist the bring-back proof.
    pub async fn write_sandbox_proof(&self, proof: &SandboxProof) -> Result<(), ExecError> {
        let bytes = serde_json::to_vec_pretty(proof)?;
        tokio::fs::write(self.run_dir.join(PROOF_FILE), bytes).await?;
        Ok(())
    }

    /// Write the checksum manifest over the tape, the original request,
    /// and the result record when present. Call after the final flush.
    pub async fn write_checksums(&self) -> Result<ChecksumManifest, ExecError> {
        let mut files = BTreeMap::new();
        for name in [TAPE_FILE, REQUEST_FILE, RESULT_FILE] {
            let path = self.run_dir.join(name);
            if path.exists() {
                files.insert(name.to_string(), sha256_file(&path).await?);
            }
        }
        let manifest = ChecksumManifest {
            generated_at: Utc::now(),
            files,
        };
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(self.run_dir.join(CHECKSUMS_FILE), bytes).await?;
        Ok(manifest)
    }
}

/// Hash a patch file's content for the sandbox proof.
pub async fn patch_digest(path: &Path) -> Result<String, ExecError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(sha256_hex(&bytes))
}

/// Anchor a run directory to the process working directory. Paths under
/// the run directory get handed to git commands running in other
/// directories, where a relative path would resolve against the wrong
/// base, the governed repository included.
fn absolutize(path: PathBuf) -> Result<PathBuf, ExecError> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExecutionRequest {
        ExecutionRequest::new("run-tape-test", "/tmp/repo")
    }

    #[tokio::test]
    async fn test_open_persists_request_before_anything_else() {
        let root = tempfile::tempdir().unwrap();
        let trail = AuditTrail::open(root.path(), &request()).await.unwrap();

        let request_path = trail.run_dir().join(REQUEST_FILE);
        assert!(request_path.exists());
        assert!(trail.run_dir().is_absolute());
        assert!(trail.run_dir().join("audit").is_dir());
        assert!(trail.run_dir().join("reports").is_dir());
        assert!(trail.run_dir().join("patches").is_dir());
        assert!(trail.has_event("run_opened").await);
    }

    #[test]
    fn test_absolutize_anchors_relative_paths() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            absolutize(PathBuf::from(".warden/runs/run-1")).unwrap(),
            cwd.join(".warden/runs/run-1")
        );
        assert_eq!(absolutize(cwd.join("elsewhere")).unwrap(), cwd.join("elsewhere"));
    }

    #[tokio::test]
    async fn test_events_keep_decision_order() {
        let root = tempfile::tempdir().unwrap();
        let trail = AuditTrail::open(root.path(), &request()).await.unwrap();

        trail.record_decision("gate_a", serde_json::json!({})).await;
        trail.record_info("step_b", serde_json::json!({})).await;
        trail.record_error("fail_c", serde_json::json!({})).await;

        let events = trail.events().await;
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["run_opened", "gate_a", "step_b", "fail_c"]);
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_flush_writes_jsonl() {
        let root = tempfile::tempdir().unwrap();
        let trail = AuditTrail::open(root.path(), &request()).await.unwrap();
        trail.record_info("one", serde_json::json!({"k": 1})).await;

        let path = trail.flush().await.unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: TapeEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.event_type, "one");
        assert_eq!(parsed.seq, 1);
    }

    #[tokio::test]
    async fn test_checksums_cover_tape_and_request() {
        let root = tempfile::tempdir().unwrap();
        let trail = AuditTrail::open(root.path(), &request()).await.unwrap();
        trail.flush().await.unwrap();

        let manifest = trail.write_checksums().await.unwrap();
        assert!(manifest.files.contains_key(TAPE_FILE));
        assert!(manifest.files.contains_key(REQUEST_FILE));
        // No result was written in this run.
        assert!(!manifest.files.contains_key(RESULT_FILE));

        let on_disk: ChecksumManifest = serde_json::from_slice(
            &tokio::fs::read(trail.run_dir().join(CHECKSUMS_FILE))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk.files, manifest.files);

        // Manifest digest matches an independent recomputation.
        let tape_hash = sha256_file(&trail.run_dir().join(TAPE_FILE)).await.unwrap();
        assert_eq!(manifest.files.get(TAPE_FILE), Some(&tape_hash));
    }

    #[tokio::test]
    async fn test_result_and_summary_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let req = request();
        let trail = AuditTrail::open(root.path(), &req).await.unwrap();

        let mut result = ExecutionResult::begin(&req);
        result.finish(crate::domain::models::ExecutionStatus::Failed, Some("boom".into()));
        trail.write_result(&result).await.unwrap();
        trail
            .write_summary(&ExecutionSummary::from_result(&result, false))
            .await
            .unwrap();

        let summary: ExecutionSummary = serde_json::from_slice(
            &tokio::fs::read(trail.run_dir().join(SUMMARY_FILE))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(summary.status, "failed");
        assert_eq!(summary.error.as_deref(), Some("boom"));
        assert!(!summary.sandbox_used);
    }
}
