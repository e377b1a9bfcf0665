use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::ExecError;
use crate::domain::models::{Task, TaskAudit, TaskStatus};

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub limit: Option<i64>,
}

/// Port for task persistence.
///
/// Writes go through the store's serialized writer and carry its bounded
/// timeout; reads use independent connections. `commit_transition` is the
/// only way a status change reaches disk, and it writes the status, the
/// metadata, and exactly one audit row in a single transaction.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task.
    async fn insert(&self, task: &Task) -> Result<(), ExecError>;

    /// Get a task by id.
    async fn get(&self, id: Uuid) -> Result<Option<Task>, ExecError>;

    /// List tasks with optional filters.
    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>, ExecError>;

    /// Atomically persist a validated transition: the task's new status and
    /// metadata plus its single audit row, all or nothing.
    async fn commit_transition(&self, task: &Task, audit: &TaskAudit) -> Result<(), ExecError>;

    /// Append one audit row outside a transition.
    async fn append_audit(&self, audit: &TaskAudit) -> Result<(), ExecError>;

    /// All audit rows for a task, oldest first.
    async fn list_audit(&self, task_id: Uuid) -> Result<Vec<TaskAudit>, ExecError>;

    /// Number of audit rows for a task.
    async fn count_audit(&self, task_id: Uuid) -> Result<i64, ExecError>;

    /// Flip the spec-frozen flag.
    async fn set_spec_frozen(&self, id: Uuid, frozen: bool) -> Result<(), ExecError>;
}
