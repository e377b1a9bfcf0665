//! Execution request and result models.
//!
//! An `ExecutionRequest` describes one batch of side-effecting operations to
//! run against a repository. An `ExecutionResult` is always produced, one per
//! run, no matter how the run terminated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::rollback::RollbackPoint;

/// Which component submitted an execution request.
///
/// Only the task runner may trigger execution. Chat surfaces are
/// structurally forbidden; there is no configuration that lifts this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerSource {
    /// The task-runner worker
    TaskRunner,
    /// An interactive chat surface
    Chat,
}

impl CallerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskRunner => "task_runner",
            Self::Chat => "chat",
        }
    }
}

/// One side-effecting operation inside an execution request.
///
/// `action` selects the handler (`write_file`, `update_file`, `mkdir`,
/// `git_add`, `git_commit`); `params` is handler-specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Operation {
    pub fn new(action: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    /// Fetch a required string parameter.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

/// A named group of operations inside a patch plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// Structured plan of steps; the modern alternative to the flat
/// `allowed_operations` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchPlan {
    #[serde(default)]
    pub steps: Vec<PatchStep>,
}

/// One batch of work to execute against a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Caller-supplied run identifier; also names the artifact directory
    pub execution_request_id: String,
    /// Governed task; absent ids resolve to a fresh orphan task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// Governance mode; `None` resolves to `implementation`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<String>,
    /// Repository the run targets; also the lock identity
    pub repo_root: PathBuf,
    /// When true the run is blocked unless `approval_ref` is present
    #[serde(default)]
    pub requires_review: bool,
    /// Reference to an external approval record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_ref: Option<String>,
    /// Legacy flat operation list; ignored when `patch_plan` is present
    #[serde(default)]
    pub allowed_operations: Vec<Operation>,
    /// Structured plan; wins over `allowed_operations` when both exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_plan: Option<PatchPlan>,
    /// Who submitted the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl ExecutionRequest {
    /// Create a minimal request against a repository.
    pub fn new(execution_request_id: impl Into<String>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            execution_request_id: execution_request_id.into(),
            task_id: None,
            mode_id: None,
            repo_root: repo_root.into(),
            requires_review: false,
            approval_ref: None,
            allowed_operations: Vec::new(),
            patch_plan: None,
            requested_by: None,
        }
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_mode(mut self, mode_id: impl Into<String>) -> Self {
        self.mode_id = Some(mode_id.into());
        self
    }

    pub fn with_operations(mut self, operations: Vec<Operation>) -> Self {
        self.allowed_operations = operations;
        self
    }

    pub fn with_patch_plan(mut self, plan: PatchPlan) -> Self {
        self.patch_plan = Some(plan);
        self
    }

    pub fn with_review_required(mut self) -> Self {
        self.requires_review = true;
        self
    }

    pub fn with_approval(mut self, approval_ref: impl Into<String>) -> Self {
        self.approval_ref = Some(approval_ref.into());
        self
    }

    /// Mode id after defaulting.
    pub fn resolved_mode_id(&self) -> &str {
        self.mode_id.as_deref().unwrap_or("implementation")
    }

    /// The flattened operation list for the run. A patch plan takes
    /// precedence; the legacy list is only consulted when no plan exists.
    pub fn operations(&self) -> Vec<Operation> {
        match &self.patch_plan {
            Some(plan) => plan
                .steps
                .iter()
                .flat_map(|step| step.operations.iter().cloned())
                .collect(),
            None => self.allowed_operations.clone(),
        }
    }
}

/// Terminal status of one execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// All operations ran and bring-back succeeded
    Success,
    /// A policy layer denied the run
    Denied,
    /// Review required and no approval present
    Blocked,
    /// The run failed
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Denied => "denied",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one operation inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    /// The operation errored; the batch continued
    Failed,
    /// The planning guard refused the operation; the batch continued
    Forbidden,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Forbidden => "forbidden",
        }
    }
}

/// Outcome of one operation, in batch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Zero-based position in the batch
    pub index: usize,
    pub action: String,
    pub status: OperationStatus,
    /// Handler detail; a `write_file` success records `size`
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl OperationOutcome {
    pub fn success(index: usize, action: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            index,
            action: action.into(),
            status: OperationStatus::Success,
            detail,
        }
    }

    pub fn failed(index: usize, action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            index,
            action: action.into(),
            status: OperationStatus::Failed,
            detail: serde_json::json!({ "error": error.into() }),
        }
    }

    pub fn forbidden(index: usize, action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            index,
            action: action.into(),
            status: OperationStatus::Forbidden,
            detail: serde_json::json!({ "reason": reason.into() }),
        }
    }
}

/// Record of one execution run. Persisted to the run directory regardless
/// of how the run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_result_id: String,
    pub execution_request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    pub status: ExecutionStatus,
    /// Per-operation outcomes in batch order
    pub operations_executed: Vec<OperationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_point: Option<RollbackPoint>,
    /// Sandbox commit hashes replayed into the real repository
    pub commits_brought_back: Vec<String>,
    /// Generated patch file names
    pub patches_generated: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Start a result record for a request.
    pub fn begin(request: &ExecutionRequest) -> Self {
        Self {
            execution_result_id: Uuid::new_v4().to_string(),
            execution_request_id: request.execution_request_id.clone(),
            task_id: request.task_id,
            status: ExecutionStatus::Failed,
            operations_executed: Vec::new(),
            rollback_point: None,
            commits_brought_back: Vec::new(),
            patches_generated: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Close the record with a terminal status.
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}

/// Enumerated reasons a task may enter `Failed`.
///
/// The state machine refuses a transition into `Failed` whose
/// `metadata.exit_reason` is not one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Error,
    PolicyDenied,
    SpecNotFrozen,
    LockUnavailable,
    ModeViolation,
    RiskBlocked,
    Infrastructure,
    CanceledByUser,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::PolicyDenied => "policy_denied",
            Self::SpecNotFrozen => "spec_not_frozen",
            Self::LockUnavailable => "lock_unavailable",
            Self::ModeViolation => "mode_violation",
            Self::RiskBlocked => "risk_blocked",
            Self::Infrastructure => "infrastructure",
            Self::CanceledByUser => "canceled_by_user",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "policy_denied" => Some(Self::PolicyDenied),
            "spec_not_frozen" => Some(Self::SpecNotFrozen),
            "lock_unavailable" => Some(Self::LockUnavailable),
            "mode_violation" => Some(Self::ModeViolation),
            "risk_blocked" => Some(Self::RiskBlocked),
            "infrastructure" => Some(Self::Infrastructure),
            "canceled_by_user" => Some(Self::CanceledByUser),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
