use thiserror::Error;
use uuid::Uuid;

use super::models::diff::DiffValidationResult;
use super::models::task::TaskStatus;

/// Domain errors for the execution safety core.
///
/// The enum is closed on purpose: every denial, block, and infrastructure
/// failure the core can produce has a named variant, and callers match on
/// variants rather than string-sniffing messages. Two variants carry the
/// lock/gateway asymmetry: `LockHeld` is fail-closed (the run dies),
/// a gateway `Infrastructure` error during a state transition is fail-open
/// (the transition proceeds under a warning alert).
#[derive(Error, Debug)]
pub enum ExecError {
    // Hard structural gates. Never retried.
    #[error("execution may only be triggered by the task runner, not `{caller}`")]
    ChatCallerForbidden { caller: String },

    #[error("task {task_id} spec is not frozen; execution requires a frozen spec")]
    SpecNotFrozen { task_id: Uuid },

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    // Policy denials. Fatal to the run, fully audited.
    #[error("policy denied operation `{operation}`: {reason}")]
    PolicyDenied {
        operation: String,
        reason: String,
        rule_id: Option<String>,
    },

    #[error("diff rejected by path-scope verification: {}", validation.errors.join("; "))]
    DiffRejected { validation: DiffValidationResult },

    #[error("no sandbox policy supplied; bring-back requires an explicit path allow-list")]
    PolicyMissing,

    #[error("malformed sandbox policy: {reason}")]
    PolicyInvalid { reason: String },

    // Mode violations. Alerted before raised.
    #[error("mode `{mode_id}` forbids {operation}: {reason}")]
    ModeViolation {
        mode_id: String,
        operation: String,
        reason: String,
    },

    #[error("cannot resolve mode `{mode_id}`: {reason}")]
    ModeResolution { mode_id: String, reason: String },

    // Risk blocks. Unconditional, no override path.
    #[error("risk gate blocked {risk_level} operation `{operation}`: no approval reference")]
    RiskBlocked { operation: String, risk_level: String },

    // Planning violations. Local to one operation; the batch continues.
    #[error("side effect `{operation_type}:{operation_name}` forbidden during planning phase")]
    PlanningViolation {
        operation_type: String,
        operation_name: String,
    },

    // State machine errors.
    #[error("invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: TaskStatus,
        to: TaskStatus,
        reason: String,
    },

    #[error("entry gate for {target:?} failed: {reason}")]
    StateGate { target: TaskStatus, reason: String },

    // Lock acquisition. Fail-closed: the run dies, never queues.
    #[error("execution lock for repo hash {repo_hash} is already held")]
    LockHeld { repo_hash: String },

    // Infrastructure.
    #[error("store error: {0}")]
    Store(String),

    #[error("serialized write timed out after {timeout_ms}ms")]
    WriteTimeout { timeout_ms: u64 },

    #[error("git operation `{operation}` failed: {detail}")]
    Git { operation: String, detail: String },

    #[error("mode gateway infrastructure error: {0}")]
    Infrastructure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ExecError {
    /// Stable category string recorded in audit payloads and summaries.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ChatCallerForbidden { .. } | Self::SpecNotFrozen { .. } | Self::TaskNotFound(_) => {
                "structural"
            }
            Self::PolicyDenied { .. } | Self::DiffRejected { .. } => "policy",
            Self::PolicyMissing | Self::PolicyInvalid { .. } => "configuration",
            Self::ModeViolation { .. } | Self::ModeResolution { .. } => "mode",
            Self::RiskBlocked { .. } => "risk",
            Self::PlanningViolation { .. } => "planning",
            Self::InvalidTransition { .. } | Self::StateGate { .. } => "state",
            Self::LockHeld { .. } => "lock",
            Self::Store(_)
            | Self::WriteTimeout { .. }
            | Self::Git { .. }
            | Self::Infrastructure(_)
            | Self::Io(_)
            | Self::Serde(_) => "infrastructure",
        }
    }
}
