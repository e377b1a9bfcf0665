//! SQLite task store with a serialized writer.
//!
//! All task-record mutations are funneled through a single writer task so no
//! two writes interleave. Reads bypass the writer and run directly on the
//! pool. Callers wait for the writer's acknowledgement under a bounded
//! timeout.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::domain::error::ExecError;
use crate::domain::models::{AuditLevel, Task, TaskAudit, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskStore};

use super::utils::parse_datetime;

/// Pending writes the channel buffers before `send` applies backpressure.
const WRITE_QUEUE_DEPTH: usize = 64;

/// Default acknowledgement timeout, matching `execution.write_timeout_ms`.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

type Ack = oneshot::Sender<Result<(), ExecError>>;

enum WriteOp {
    Insert {
        task: Task,
        ack: Ack,
    },
    CommitTransition {
        task: Task,
        audit: TaskAudit,
        ack: Ack,
    },
    AppendAudit {
        audit: TaskAudit,
        ack: Ack,
    },
    SetSpecFrozen {
        id: Uuid,
        frozen: bool,
        ack: Ack,
    },
}

/// SQLite implementation of the [`TaskStore`] port.
///
/// Spawns its writer task on construction, so it must be created inside a
/// Tokio runtime. Dropping the store closes the channel and lets the writer
/// drain and exit.
pub struct SqliteTaskStore {
    pool: SqlitePool,
    writer: mpsc::Sender<WriteOp>,
    write_timeout: Duration,
}

impl SqliteTaskStore {
    /// Create a store with the default write acknowledgement timeout.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_write_timeout(pool, DEFAULT_WRITE_TIMEOUT)
    }

    /// Create a store that gives up on writer acknowledgements after
    /// `write_timeout`.
    pub fn with_write_timeout(pool: SqlitePool, write_timeout: Duration) -> Self {
        let (writer, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        tokio::spawn(run_writer(pool.clone(), rx));
        Self {
            pool,
            writer,
            write_timeout,
        }
    }

    async fn submit(
        &self,
        op: WriteOp,
        ack_rx: oneshot::Receiver<Result<(), ExecError>>,
    ) -> Result<(), ExecError> {
        self.writer
            .send(op)
            .await
            .map_err(|_| ExecError::Store("task store writer has shut down".into()))?;

        match tokio::time::timeout(self.write_timeout, ack_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ExecError::Store(
                "task store writer dropped the acknowledgement".into(),
            )),
            Err(_) => Err(ExecError::WriteTimeout {
                timeout_ms: self.write_timeout.as_millis() as u64,
            }),
        }
    }

    fn row_to_task(row: &SqliteRow) -> Result<Task, ExecError> {
        let status_raw: String = row.get("status");
        let status = TaskStatus::from_str(&status_raw)
            .ok_or_else(|| ExecError::Store(format!("unknown task status `{status_raw}`")))?;
        let metadata_raw: String = row.get("metadata");

        Ok(Task {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            title: row.get("title"),
            status,
            spec_frozen: row.get::<i64, _>("spec_frozen") != 0,
            metadata: serde_json::from_str(&metadata_raw)?,
            created_by: row.get("created_by"),
            created_at: parse_column_datetime(row, "created_at")?,
            updated_at: parse_column_datetime(row, "updated_at")?,
        })
    }

    fn row_to_audit(row: &SqliteRow) -> Result<TaskAudit, ExecError> {
        let level_raw: String = row.get("level");
        let level = AuditLevel::from_str(&level_raw)
            .ok_or_else(|| ExecError::Store(format!("unknown audit level `{level_raw}`")))?;
        let payload_raw: String = row.get("payload");

        Ok(TaskAudit {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            task_id: parse_uuid(&row.get::<String, _>("task_id"))?,
            level,
            event_type: row.get("event_type"),
            payload: serde_json::from_str(&payload_raw)?,
            created_at: parse_column_datetime(row, "created_at")?,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &Task) -> Result<(), ExecError> {
        let (ack, ack_rx) = oneshot::channel();
        self.submit(
            WriteOp::Insert {
                task: task.clone(),
                ack,
            },
            ack_rx,
        )
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, ExecError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(r) => Ok(Some(Self::row_to_task(&r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>, ExecError> {
        let mut sql = String::from("SELECT * FROM tasks");
        if filter.status.is_some() {
            sql.push_str(" WHERE status = ?");
        }
        sql.push_str(" ORDER BY updated_at DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(store_err)?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn commit_transition(&self, task: &Task, audit: &TaskAudit) -> Result<(), ExecError> {
        let (ack, ack_rx) = oneshot::channel();
        self.submit(
            WriteOp::CommitTransition {
                task: task.clone(),
                audit: audit.clone(),
                ack,
            },
            ack_rx,
        )
        .await
    }

    async fn append_audit(&self, audit: &TaskAudit) -> Result<(), ExecError> {
        let (ack, ack_rx) = oneshot::channel();
        self.submit(
            WriteOp::AppendAudit {
                audit: audit.clone(),
                ack,
            },
            ack_rx,
        )
        .await
    }

    async fn list_audit(&self, task_id: Uuid) -> Result<Vec<TaskAudit>, ExecError> {
        // rowid breaks ties between rows written in the same instant
        let rows = sqlx::query(
            "SELECT * FROM task_audit WHERE task_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(Self::row_to_audit).collect()
    }

    async fn count_audit(&self, task_id: Uuid) -> Result<i64, ExecError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM task_audit WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn set_spec_frozen(&self, id: Uuid, frozen: bool) -> Result<(), ExecError> {
        let (ack, ack_rx) = oneshot::channel();
        self.submit(WriteOp::SetSpecFrozen { id, frozen, ack }, ack_rx)
            .await
    }
}

async fn run_writer(pool: SqlitePool, mut rx: mpsc::Receiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Insert { task, ack } => {
                let _ = ack.send(insert_task(&pool, &task).await);
            }
            WriteOp::CommitTransition { task, audit, ack } => {
                let _ = ack.send(persist_transition(&pool, &task, &audit).await);
            }
            WriteOp::AppendAudit { audit, ack } => {
                let _ = ack.send(insert_audit_row(&pool, &audit).await);
            }
            WriteOp::SetSpecFrozen { id, frozen, ack } => {
                let _ = ack.send(update_spec_frozen(&pool, id, frozen).await);
            }
        }
    }
    debug!("task store writer channel closed");
}

fn store_err(e: sqlx::Error) -> ExecError {
    ExecError::Store(e.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, ExecError> {
    Uuid::parse_str(s).map_err(|e| ExecError::Store(format!("invalid uuid `{s}`: {e}")))
}

fn parse_column_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<chrono::DateTime<chrono::Utc>, ExecError> {
    let raw: String = row.get(column);
    parse_datetime(&raw).map_err(|e| ExecError::Store(format!("bad {column} `{raw}`: {e}")))
}

async fn insert_task(pool: &SqlitePool, task: &Task) -> Result<(), ExecError> {
    let metadata = serde_json::to_string(&task.metadata)?;

    sqlx::query(
        r"
        INSERT INTO tasks (id, title, status, spec_frozen, metadata, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(task.id.to_string())
    .bind(&task.title)
    .bind(task.status.as_str())
    .bind(task.spec_frozen)
    .bind(metadata)
    .bind(&task.created_by)
    .bind(task.created_at.to_rfc3339())
    .bind(task.updated_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(store_err)?;

    Ok(())
}

async fn persist_transition(
    pool: &SqlitePool,
    task: &Task,
    audit: &TaskAudit,
) -> Result<(), ExecError> {
    let metadata = serde_json::to_string(&task.metadata)?;
    let payload = serde_json::to_string(&audit.payload)?;

    let mut tx = pool.begin().await.map_err(store_err)?;

    let updated = sqlx::query("UPDATE tasks SET status = ?, metadata = ?, updated_at = ? WHERE id = ?")
        .bind(task.status.as_str())
        .bind(metadata)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

    // Dropping the uncommitted transaction rolls the update back
    if updated.rows_affected() == 0 {
        return Err(ExecError::TaskNotFound(task.id));
    }

    sqlx::query(
        r"
        INSERT INTO task_audit (id, task_id, level, event_type, payload, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(audit.id.to_string())
    .bind(audit.task_id.to_string())
    .bind(audit.level.as_str())
    .bind(&audit.event_type)
    .bind(payload)
    .bind(audit.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;

    tx.commit().await.map_err(store_err)?;
    Ok(())
}

async fn insert_audit_row(pool: &SqlitePool, audit: &TaskAudit) -> Result<(), ExecError> {
    let payload = serde_json::to_string(&audit.payload)?;

    sqlx::query(
        r"
        INSERT INTO task_audit (id, task_id, level, event_type, payload, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(audit.id.to_string())
    .bind(audit.task_id.to_string())
    .bind(audit.level.as_str())
    .bind(&audit.event_type)
    .bind(payload)
    .bind(audit.created_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(store_err)?;

    Ok(())
}

async fn update_spec_frozen(pool: &SqlitePool, id: Uuid, frozen: bool) -> Result<(), ExecError> {
    let updated =
        sqlx::query("UPDATE tasks SET spec_frozen = ?, updated_at = ? WHERE id = ?")
            .bind(frozen)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(pool)
            .await
            .map_err(store_err)?;

    if updated.rows_affected() == 0 {
        return Err(ExecError::TaskNotFound(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskMetadata;
    use crate::infrastructure::database::DatabaseConnection;
    use serde_json::json;

    async fn test_store() -> (tempfile::TempDir, SqliteTaskStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = DatabaseConnection::initialize(&dir.path().join("warden.db"))
            .await
            .expect("failed to initialize database");
        let store = SqliteTaskStore::new(db.pool().clone());
        (dir, store)
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (_dir, store) = test_store().await;

        let task = Task::new("Ship the parser")
            .with_created_by("alice")
            .with_metadata(
                TaskMetadata::new()
                    .with_mode("review")
                    .with_extra("ticket", json!("WARD-42")),
            );
        store.insert(&task).await.expect("insert failed");

        let fetched = store
            .get(task.id)
            .await
            .expect("get failed")
            .expect("task should exist");
        assert_eq!(fetched.id, task.id);
        assert_eq!(fetched.title, "Ship the parser");
        assert_eq!(fetched.status, TaskStatus::Draft);
        assert!(!fetched.spec_frozen);
        assert_eq!(fetched.created_by.as_deref(), Some("alice"));
        assert_eq!(fetched.metadata.mode_id.as_deref(), Some("review"));
        assert_eq!(fetched.metadata.extra.get("ticket"), Some(&json!("WARD-42")));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (_dir, store) = test_store().await;
        let found = store.get(Uuid::new_v4()).await.expect("get failed");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_limit() {
        let (_dir, store) = test_store().await;

        let mut approved = Task::new("Approved one");
        approved.status = TaskStatus::Approved;
        store.insert(&approved).await.expect("insert failed");
        store
            .insert(&Task::new("Draft one"))
            .await
            .expect("insert failed");
        store
            .insert(&Task::new("Draft two"))
            .await
            .expect("insert failed");

        let drafts = store
            .list(TaskFilter {
                status: Some(TaskStatus::Draft),
                limit: None,
            })
            .await
            .expect("list failed");
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|t| t.status == TaskStatus::Draft));

        let limited = store
            .list(TaskFilter {
                status: None,
                limit: Some(1),
            })
            .await
            .expect("list failed");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_transition_persists_status_and_audit() {
        let (_dir, store) = test_store().await;

        let mut task = Task::new("Lifecycle test");
        store.insert(&task).await.expect("insert failed");

        task.status = TaskStatus::Approved;
        task.metadata = task.metadata.clone().with_stage("approved");
        task.updated_at = chrono::Utc::now();
        let audit = TaskAudit::new(task.id, AuditLevel::Decision, "transition")
            .with_payload(json!({"from": "draft", "to": "approved"}));

        store
            .commit_transition(&task, &audit)
            .await
            .expect("commit_transition failed");

        let fetched = store
            .get(task.id)
            .await
            .expect("get failed")
            .expect("task should exist");
        assert_eq!(fetched.status, TaskStatus::Approved);
        assert_eq!(fetched.metadata.current_stage.as_deref(), Some("approved"));

        assert_eq!(store.count_audit(task.id).await.expect("count failed"), 1);
        let rows = store.list_audit(task.id).await.expect("list_audit failed");
        assert_eq!(rows[0].event_type, "transition");
        assert_eq!(rows[0].payload["to"], json!("approved"));
    }

    #[tokio::test]
    async fn test_commit_transition_unknown_task_rolls_back() {
        let (_dir, store) = test_store().await;

        let ghost = Task::new("Never inserted");
        let audit = TaskAudit::new(ghost.id, AuditLevel::Decision, "transition");

        let err = store
            .commit_transition(&ghost, &audit)
            .await
            .expect_err("transition of a missing task should fail");
        assert!(matches!(err, ExecError::TaskNotFound(_)));

        // The audit insert must not have survived the rollback
        assert_eq!(store.count_audit(ghost.id).await.expect("count failed"), 0);
    }

    #[tokio::test]
    async fn test_append_and_list_audit_oldest_first() {
        let (_dir, store) = test_store().await;

        let task = Task::new("Audit ordering");
        store.insert(&task).await.expect("insert failed");

        for event in ["first", "second", "third"] {
            let audit = TaskAudit::new(task.id, AuditLevel::Info, event);
            store.append_audit(&audit).await.expect("append failed");
        }

        let rows = store.list_audit(task.id).await.expect("list_audit failed");
        let events: Vec<&str> = rows.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(events, vec!["first", "second", "third"]);
        assert_eq!(store.count_audit(task.id).await.expect("count failed"), 3);
    }

    #[tokio::test]
    async fn test_set_spec_frozen_flips_flag() {
        let (_dir, store) = test_store().await;

        let task = Task::new("Freeze me");
        store.insert(&task).await.expect("insert failed");

        store
            .set_spec_frozen(task.id, true)
            .await
            .expect("freeze failed");
        let fetched = store.get(task.id).await.expect("get failed").unwrap();
        assert!(fetched.spec_frozen);

        store
            .set_spec_frozen(task.id, false)
            .await
            .expect("unfreeze failed");
        let fetched = store.get(task.id).await.expect("get failed").unwrap();
        assert!(!fetched.spec_frozen);
    }

    #[tokio::test]
    async fn test_set_spec_frozen_missing_task() {
        let (_dir, store) = test_store().await;
        let err = store
            .set_spec_frozen(Uuid::new_v4(), true)
            .await
            .expect_err("freezing a missing task should fail");
        assert!(matches!(err, ExecError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_writes_all_land() {
        let (_dir, store) = test_store().await;

        let task = Task::new("Writer queue");
        store.insert(&task).await.expect("insert failed");

        let appends = (0..8).map(|i| {
            let audit = TaskAudit::new(task.id, AuditLevel::Info, format!("event_{i}"));
            let store = &store;
            async move { store.append_audit(&audit).await }
        });
        let results = futures::future::join_all(appends).await;
        assert!(results.iter().all(Result::is_ok));

        assert_eq!(store.count_audit(task.id).await.expect("count failed"), 8);
    }
}
