//! Audit domain model.
//!
//! Two audit surfaces share these types: the per-task audit rows persisted
//! in SQLite, and the in-memory run tape an executor carries for one
//! execution and flushes into the artifact directory at the end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Verbose diagnostic detail
    Debug,
    /// Routine lifecycle events
    Info,
    /// A gate or guard made a ruling
    Decision,
    /// Something surprising but recoverable
    Warning,
    /// An operation failed
    Error,
    /// Safety chokepoint violated or integrity at risk
    Critical,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Decision => "decision",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "decision" => Some(Self::Decision),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit row attached to a task.
///
/// Rows are never updated or deleted. A status transition writes exactly one
/// row; gates and guards write one row per ruling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAudit {
    /// Unique identifier
    pub id: Uuid,
    /// Task this row belongs to
    pub task_id: Uuid,
    /// Severity
    pub level: AuditLevel,
    /// Machine-readable event name, e.g. `status_transition`
    pub event_type: String,
    /// Structured event detail
    pub payload: serde_json::Value,
    /// When recorded
    pub created_at: DateTime<Utc>,
}

impl TaskAudit {
    /// Create a new audit row for a task.
    pub fn new(task_id: Uuid, level: AuditLevel, event_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            level,
            event_type: event_type.into(),
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
