//! Task domain model.
//!
//! Tasks are governed units of work. Their status only ever moves along the
//! edges of a fixed transition table, and every traversal leaves exactly one
//! audit row behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Status of a task in the governed lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is being drafted; spec may still change
    Draft,
    /// Task has been approved for scheduling
    Approved,
    /// Task is queued for execution
    Queued,
    /// Task is currently being executed
    Running,
    /// Execution finished, awaiting verification
    Verifying,
    /// Verification passed
    Verified,
    /// Task completed (terminal)
    Done,
    /// Task failed during execution or verification
    Failed,
    /// Task is blocked awaiting approval or unblocking
    Blocked,
    /// Task was canceled (terminal)
    Canceled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Verifying => "verifying",
            Self::Verified => "verified",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "approved" => Some(Self::Approved),
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "verifying" => Some(Self::Verifying),
            "verified" => Some(Self::Verified),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }

    /// Valid transitions from this status.
    ///
    /// This is the single source of truth for the lifecycle; the state
    /// machine, the CLI, and the tests all read from here.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Draft => vec![Self::Approved, Self::Canceled],
            Self::Approved => vec![Self::Queued, Self::Canceled],
            Self::Queued => vec![Self::Running, Self::Canceled],
            Self::Running => vec![Self::Verifying, Self::Failed, Self::Canceled, Self::Blocked],
            // Failed verification may requeue for retry.
            Self::Verifying => vec![Self::Verified, Self::Failed, Self::Canceled, Self::Queued],
            Self::Verified => vec![Self::Done],
            Self::Done => vec![],
            Self::Failed => vec![Self::Queued],
            Self::Blocked => vec![Self::Queued, Self::Canceled],
            Self::Canceled => vec![],
        }
    }

    /// Check whether a transition to `new_status` is permitted.
    ///
    /// Self-transitions are always permitted and treated as idempotent
    /// no-ops by the state machine.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        *self == new_status || self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque per-task metadata carried alongside the status.
///
/// The governed keys (`mode_id`, `exit_reason`, `cleanup_summary`,
/// `current_stage`) have dedicated fields; everything else flows through
/// `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Governance mode consulted on every transition, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<String>,
    /// Why the task entered `Failed`; must be one of the enumerated reasons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<String>,
    /// Synthesized or supplied summary recorded on cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_summary: Option<String>,
    /// Free-form stage marker; `"planning"` engages the planning guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    /// Uninterpreted keys; preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TaskMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the governance mode.
    pub fn with_mode(mut self, mode_id: impl Into<String>) -> Self {
        self.mode_id = Some(mode_id.into());
        self
    }

    /// Set the stage marker.
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage = Some(stage.into());
        self
    }

    /// Set the exit reason.
    pub fn with_exit_reason(mut self, reason: impl Into<String>) -> Self {
        self.exit_reason = Some(reason.into());
        self
    }

    /// Set an uninterpreted key.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Overlay `patch` onto this metadata: `Some` fields win, extra keys
    /// are merged with the patch taking precedence.
    pub fn apply(&mut self, patch: &TaskMetadata) {
        if patch.mode_id.is_some() {
            self.mode_id = patch.mode_id.clone();
        }
        if patch.exit_reason.is_some() {
            self.exit_reason = patch.exit_reason.clone();
        }
        if patch.cleanup_summary.is_some() {
            self.cleanup_summary = patch.cleanup_summary.clone();
        }
        if patch.current_stage.is_some() {
            self.current_stage = patch.current_stage.clone();
        }
        for (k, v) in &patch.extra {
            self.extra.insert(k.clone(), v.clone());
        }
    }
}

/// A governed unit of work.
///
/// Mutated only through `TaskStateMachine` transitions; direct status writes
/// bypass the audit trail and are a bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Whether the task specification has been locked against edits.
    /// Execution refuses to run against an unfrozen spec.
    pub spec_frozen: bool,
    /// Governed metadata
    pub metadata: TaskMetadata,
    /// Who created the task
    pub created_by: Option<String>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new draft task.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: TaskStatus::default(),
            spec_frozen: false,
            metadata: TaskMetadata::default(),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the creator.
    pub fn with_created_by(mut self, creator: impl Into<String>) -> Self {
        self.created_by = Some(creator.into());
        self
    }

    /// Set the metadata.
    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark the spec frozen.
    pub fn with_frozen_spec(mut self) -> Self {
        self.spec_frozen = true;
        self
    }

    /// Check if can transition to given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate task invariants that do not depend on persisted state.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("Ship the release");
        assert_eq!(task.title, "Ship the release");
        assert_eq!(task.status, TaskStatus::Draft);
        assert!(!task.spec_frozen);
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TaskStatus::Draft,
            TaskStatus::Approved,
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Verifying,
            TaskStatus::Verified,
            TaskStatus::Done,
            TaskStatus::Failed,
            TaskStatus::Blocked,
            TaskStatus::Canceled,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("cancelled"), Some(TaskStatus::Canceled));
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_happy_path_edges() {
        assert!(TaskStatus::Draft.can_transition_to(TaskStatus::Approved));
        assert!(TaskStatus::Approved.can_transition_to(TaskStatus::Queued));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Verifying));
        assert!(TaskStatus::Verifying.can_transition_to(TaskStatus::Verified));
        assert!(TaskStatus::Verified.can_transition_to(TaskStatus::Done));
    }

    #[test]
    fn test_retry_and_recovery_edges() {
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Queued));
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::Queued));
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::Canceled));
        // Failed verification may requeue.
        assert!(TaskStatus::Verifying.can_transition_to(TaskStatus::Queued));
    }

    #[test]
    fn test_forbidden_edges() {
        assert!(!TaskStatus::Draft.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Draft.can_transition_to(TaskStatus::Done));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Verified));
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::Canceled.can_transition_to(TaskStatus::Queued));
    }

    #[test]
    fn test_self_transition_always_permitted() {
        for status in [TaskStatus::Draft, TaskStatus::Running, TaskStatus::Done] {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
        assert!(TaskStatus::Done.valid_transitions().is_empty());
        assert!(TaskStatus::Canceled.valid_transitions().is_empty());
    }

    #[test]
    fn test_metadata_apply_overlays() {
        let mut base = TaskMetadata::new()
            .with_mode("implementation")
            .with_extra("attempt", serde_json::json!(1));
        let patch = TaskMetadata::new()
            .with_exit_reason("error")
            .with_extra("attempt", serde_json::json!(2));

        base.apply(&patch);

        assert_eq!(base.mode_id.as_deref(), Some("implementation"));
        assert_eq!(base.exit_reason.as_deref(), Some("error"));
        assert_eq!(base.extra.get("attempt"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_metadata_serde_flatten() {
        let meta = TaskMetadata::new()
            .with_mode("planning")
            .with_extra("owner", serde_json::json!("svc"));
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["mode_id"], "planning");
        assert_eq!(value["owner"], "svc");

        let back: TaskMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_validate_rejects_empty_title() {
        let task = Task::new("   ");
        assert!(task.validate().is_err());
        assert!(Task::new("ok").validate().is_ok());
    }
}
