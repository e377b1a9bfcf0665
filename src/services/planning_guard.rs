//! Guard forbidding side effects during a task's planning phase.

use tracing::debug;

use crate::domain::error::ExecError;
use crate::domain::models::{Task, TaskStatus};

/// Side-effect categories forbidden while planning. Fixed catalog; exact
/// `(operation_type, operation_name)` pairs.
const FORBIDDEN_IN_PLANNING: &[(&str, &str)] = &[
    ("shell", "exec"),
    ("shell", "spawn"),
    ("file", "write"),
    ("file", "update"),
    ("file", "delete"),
    ("file", "mkdir"),
    ("git", "add"),
    ("git", "commit"),
    ("git", "apply_patch"),
    ("git", "push"),
    ("network", "http_request"),
    ("network", "download"),
];

/// Stateless classifier for the planning phase.
///
/// This is a soft gate at its call site: the executor catches the
/// violation, records the one operation as forbidden, and carries on with
/// the rest of the batch.
pub struct PlanningGuard;

impl PlanningGuard {
    pub fn new() -> Self {
        Self
    }

    /// Whether the task is currently in its pure-reasoning phase.
    ///
    /// Running always means execution in progress, even if stale metadata
    /// still says planning.
    pub fn is_planning_phase(&self, task: &Task) -> bool {
        if task.status == TaskStatus::Running {
            return false;
        }
        matches!(task.status, TaskStatus::Draft | TaskStatus::Approved)
            || task.metadata.current_stage.as_deref() == Some("planning")
            || task.metadata.mode_id.as_deref() == Some("planning")
    }

    /// No-op outside planning; inside planning, fails for cataloged
    /// side-effect pairs.
    pub fn assert_operation_allowed(
        &self,
        operation_type: &str,
        operation_name: &str,
        task: &Task,
    ) -> Result<(), ExecError> {
        if !self.is_planning_phase(task) {
            return Ok(());
        }
        if FORBIDDEN_IN_PLANNING
            .iter()
            .any(|(t, n)| *t == operation_type && *n == operation_name)
        {
            debug!(
                task_id = %task.id,
                operation_type,
                operation_name,
                "side effect refused during planning phase"
            );
            return Err(ExecError::PlanningViolation {
                operation_type: operation_type.to_string(),
                operation_name: operation_name.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for PlanningGuard {
    fn default() -> Self {
        Self::new()
    }
}
