//! Governance mode model and gateway decision protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskStatus;

/// A governance mode: an id plus two capability predicates.
///
/// Modes come from the registry only. The core never constructs a default
/// permissive mode; failing to resolve one is its own error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    mode_id: String,
    allows_commit: bool,
    allows_diff: bool,
}

impl Mode {
    pub fn new(mode_id: impl Into<String>, allows_commit: bool, allows_diff: bool) -> Self {
        Self {
            mode_id: mode_id.into(),
            allows_commit,
            allows_diff,
        }
    }

    pub fn mode_id(&self) -> &str {
        &self.mode_id
    }

    /// Whether commits may reach a repository under this mode.
    pub fn allows_commit(&self) -> bool {
        self.allows_commit
    }

    /// Whether diffs may be applied under this mode.
    pub fn allows_diff(&self) -> bool {
        self.allows_diff
    }
}

/// What a gateway review is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    pub mode_id: String,
    /// Present for state transitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_state: Option<TaskStatus>,
    /// Present for operation reviews, e.g. `apply_diff`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GateContext {
    /// Context for a lifecycle transition review.
    pub fn transition(
        task_id: Uuid,
        mode_id: impl Into<String>,
        from_state: TaskStatus,
        to_state: TaskStatus,
    ) -> Self {
        Self {
            task_id: Some(task_id),
            mode_id: mode_id.into(),
            from_state: Some(from_state),
            to_state: Some(to_state),
            operation: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Context for an operation review.
    pub fn operation(mode_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            task_id: None,
            mode_id: mode_id.into(),
            from_state: None,
            to_state: None,
            operation: Some(operation.into()),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Gateway ruling kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    Approved,
    Rejected,
    /// Requires approval before proceeding
    Blocked,
    /// Decision postponed; treated as not approved
    Deferred,
}

impl GateVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Blocked => "blocked",
            Self::Deferred => "deferred",
        }
    }
}

/// A gateway ruling with its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub verdict: GateVerdict,
    pub reason: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GateDecision {
    pub fn approved(reason: impl Into<String>) -> Self {
        Self {
            verdict: GateVerdict::Approved,
            reason: reason.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            verdict: GateVerdict::Rejected,
            reason: reason.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            verdict: GateVerdict::Blocked,
            reason: reason.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn deferred(reason: impl Into<String>) -> Self {
        Self {
            verdict: GateVerdict::Deferred,
            reason: reason.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.verdict == GateVerdict::Approved
    }
}
