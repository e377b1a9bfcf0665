//! Governed task lifecycle transitions.
//!
//! The state machine is the only writer of task status. A transition
//! validates the edge, consults the mode gateway when a mode governs the
//! task, runs per-target entry gates, and persists status, metadata, and
//! exactly one audit row in a single serialized write.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::ExecError;
use crate::domain::models::{
    Alert, AlertSeverity, AuditLevel, ExitReason, GateContext, GateVerdict, Task, TaskAudit,
    TaskMetadata, TaskStatus,
};
use crate::domain::ports::{AlertSink, ModeGateway, TaskStore};

/// Tunables for lifecycle governance.
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// Entering Done below this audit-row count warns but proceeds.
    pub min_audit_events_for_done: i64,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            min_audit_events_for_done: 3,
        }
    }
}

/// Validates and performs task lifecycle transitions.
pub struct TaskStateMachine {
    store: Arc<dyn TaskStore>,
    gateway: Arc<dyn ModeGateway>,
    alerts: Arc<dyn AlertSink>,
    config: StateMachineConfig,
}

impl TaskStateMachine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        gateway: Arc<dyn ModeGateway>,
        alerts: Arc<dyn AlertSink>,
        config: StateMachineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            alerts,
            config,
        }
    }

    /// Check an edge against the lifecycle table.
    pub fn validate_or_raise(from: TaskStatus, to: TaskStatus) -> Result<(), ExecError> {
        if from.can_transition_to(to) {
            return Ok(());
        }
        Err(ExecError::InvalidTransition {
            from,
            to,
            reason: format!("no edge from {from} to {to} in the lifecycle table"),
        })
    }

    /// Move a task to `to`, overlaying `metadata_patch` first.
    ///
    /// Self-transitions return the task untouched: no write, no audit row.
    /// Everything else either fully persists (status + metadata + one audit
    /// row, atomically) or leaves the record exactly as it was.
    #[instrument(skip(self, metadata_patch), fields(task_id = %task_id, to = %to))]
    pub async fn transition(
        &self,
        task_id: Uuid,
        to: TaskStatus,
        metadata_patch: Option<TaskMetadata>,
    ) -> Result<Task, ExecError> {
        let mut task = self
            .store
            .get(task_id)
            .await?
            .ok_or(ExecError::TaskNotFound(task_id))?;
        let from = task.status;

        if from == to {
            info!(%from, "self-transition, no-op");
            return Ok(task);
        }
        Self::validate_or_raise(from, to)?;

        if let Some(patch) = &metadata_patch {
            task.metadata.apply(patch);
        }

        // Governance review. A non-approved decision aborts; a gateway
        // infrastructure error fails open so broken governance plumbing
        // cannot deadlock task progress.
        if let Some(mode_id) = task.metadata.mode_id.clone() {
            let ctx = GateContext::transition(task_id, mode_id.clone(), from, to)
                .with_metadata(serde_json::to_value(&task.metadata)?);
            match self.gateway.review(&ctx).await {
                Ok(decision) if decision.is_approved() => {}
                Ok(decision) => {
                    let severity = match decision.verdict {
                        GateVerdict::Rejected => AlertSeverity::Error,
                        _ => AlertSeverity::Warning,
                    };
                    self.alerts.emit(
                        Alert::new(
                            severity,
                            format!(
                                "gateway {} transition {from} -> {to}: {}",
                                decision.verdict.as_str(),
                                decision.reason
                            ),
                        )
                        .with_mode(mode_id.clone())
                        .with_operation("transition"),
                    );
                    return Err(ExecError::ModeViolation {
                        mode_id,
                        operation: format!("transition {from} -> {to}"),
                        reason: decision.reason,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "mode gateway failed, transition allowed fail-open");
                    self.alerts.emit(
                        Alert::new(
                            AlertSeverity::Warning,
                            format!("mode gateway error during {from} -> {to}, failing open: {e}"),
                        )
                        .with_mode(mode_id)
                        .with_operation("transition"),
                    );
                }
            }
        }

        self.run_entry_gates(&mut task, to).await?;

        task.status = to;
        task.updated_at = chrono::Utc::now();

        let audit = TaskAudit::new(task_id, AuditLevel::Decision, "status_transition")
            .with_payload(serde_json::json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "mode_id": task.metadata.mode_id,
                "exit_reason": task.metadata.exit_reason,
            }));
        self.store.commit_transition(&task, &audit).await?;
        info!(%from, "transition committed");
        Ok(task)
    }

    /// Per-target entry requirements, run after validation and governance.
    async fn run_entry_gates(&self, task: &mut Task, to: TaskStatus) -> Result<(), ExecError> {
        match to {
            TaskStatus::Done => {
                let audit_count = self.store.count_audit(task.id).await?;
                if audit_count < self.config.min_audit_events_for_done {
                    warn!(
                        audit_count,
                        required = self.config.min_audit_events_for_done,
                        "thin audit trail entering Done"
                    );
                    self.alerts.emit(
                        Alert::new(
                            AlertSeverity::Warning,
                            format!(
                                "task {} entering Done with {audit_count} audit rows, expected at least {}",
                                task.id, self.config.min_audit_events_for_done
                            ),
                        )
                        .with_operation("transition"),
                    );
                }
                Ok(())
            }
            TaskStatus::Failed => {
                let reason = task.metadata.exit_reason.as_deref().unwrap_or("");
                if ExitReason::from_str(reason).is_none() {
                    return Err(ExecError::StateGate {
                        target: TaskStatus::Failed,
                        reason: format!(
                            "exit_reason `{reason}` is not one of the enumerated failure reasons"
                        ),
                    });
                }
                Ok(())
            }
            TaskStatus::Canceled => {
                if task.metadata.cleanup_summary.is_none() {
                    task.metadata.cleanup_summary = Some(format!(
                        "canceled from {}; no cleanup recorded",
                        task.status
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
