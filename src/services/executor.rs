//! Top-level orchestrator of one execution run.
//!
//! `execute` walks a request through its checked steps: structural caller
//! gate, audit trail, task resolution, frozen-spec check, mode resolution,
//! policy load, review check, repository lock, sandbox, the operation
//! batch, commit bring-back, and finalization. Failures escape at any
//! checked step, but finalization always runs: artifacts are written, the
//! task status is updated when a legal edge exists, the sandbox is
//! destroyed, and the lock is released.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::domain::error::ExecError;
use crate::domain::models::{
    AuditLevel, CallerSource, ExecutionRequest, ExecutionResult, ExecutionStatus, ExitReason,
    Operation, OperationOutcome, RiskLevel, SandboxPolicy, Task, TaskAudit, TaskMetadata,
    TaskStatus,
};
use crate::domain::ports::{AlertSink, GitClient, ModeGateway, ModeRegistry, TaskStore};
use crate::services::audit_trail::{patch_digest, AuditTrail, ExecutionSummary, SandboxProof};
use crate::services::diff_gate::DiffGate;
use crate::services::execution_lock::{ExecutionLock, ExecutionLockGuard};
use crate::services::planning_guard::PlanningGuard;
use crate::services::risk_gate::RiskGate;
use crate::services::rollback::RollbackManager;
use crate::services::sandbox::{Sandbox, SandboxManager};
use crate::services::state_machine::TaskStateMachine;

/// Filesystem roots the engine writes under.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Run directories are created under here, one per request id
    pub runs_root: PathBuf,
    /// Lock files live here
    pub locks_dir: PathBuf,
}

/// Risk and guard classification for one action.
fn classify_action(action: &str) -> (String, String, RiskLevel) {
    let (op_type, op_name, risk) = match action {
        "write_file" => ("file", "write", RiskLevel::Medium),
        "update_file" => ("file", "update", RiskLevel::Medium),
        "mkdir" => ("file", "mkdir", RiskLevel::Low),
        "delete_file" => ("file", "delete", RiskLevel::High),
        "git_add" => ("git", "add", RiskLevel::Low),
        "git_commit" => ("git", "commit", RiskLevel::Medium),
        "git_push" => ("git", "push", RiskLevel::Critical),
        "shell" | "run_command" => ("shell", "exec", RiskLevel::Critical),
        // Unknown actions are treated as high risk until cataloged.
        other => return ("unknown".to_string(), other.to_string(), RiskLevel::High),
    };
    (op_type.to_string(), op_name.to_string(), risk)
}

/// Resolve an operation path inside the sandbox, refusing escapes.
fn sandbox_path(sandbox_root: &Path, raw: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return Err(format!("path `{raw}` must be sandbox-relative"));
    }
    for component in candidate.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err(format!("path `{raw}` escapes the sandbox"));
        }
    }
    Ok(sandbox_root.join(candidate))
}

/// Terminal result status for a run error.
fn status_for(error: &ExecError) -> ExecutionStatus {
    match error {
        ExecError::PolicyDenied { .. }
        | ExecError::DiffRejected { .. }
        | ExecError::ModeViolation { .. } => ExecutionStatus::Denied,
        ExecError::RiskBlocked { .. } => ExecutionStatus::Blocked,
        _ => ExecutionStatus::Failed,
    }
}

/// Enumerated task exit reason for a run error.
fn exit_reason_for(error: &ExecError) -> ExitReason {
    match error {
        ExecError::PolicyDenied { .. }
        | ExecError::DiffRejected { .. }
        | ExecError::PolicyMissing
        | ExecError::PolicyInvalid { .. } => ExitReason::PolicyDenied,
        ExecError::SpecNotFrozen { .. } => ExitReason::SpecNotFrozen,
        ExecError::LockHeld { .. } => ExitReason::LockUnavailable,
        ExecError::ModeViolation { .. } | ExecError::ModeResolution { .. } => {
            ExitReason::ModeViolation
        }
        ExecError::RiskBlocked { .. } => ExitReason::RiskBlocked,
        ExecError::Store(_)
        | ExecError::WriteTimeout { .. }
        | ExecError::Git { .. }
        | ExecError::Infrastructure(_)
        | ExecError::Io(_)
        | ExecError::Serde(_) => ExitReason::Infrastructure,
        _ => ExitReason::Error,
    }
}

/// Resources a run accumulates; finalization consumes them.
struct RunState {
    task: Option<Task>,
    mode_id: String,
    policy: Option<SandboxPolicy>,
    lock: Option<ExecutionLockGuard>,
    sandbox: Option<Sandbox>,
    rollback: RollbackManager,
    sandbox_used: bool,
    repo_root: PathBuf,
    /// Set before the first patch touches the real repository, committed
    /// or not. Rollback keys off this, not off recorded commits.
    repo_touched: bool,
}

impl RunState {
    fn new(git: Arc<dyn GitClient>, repo_root: PathBuf) -> Self {
        Self {
            task: None,
            mode_id: "implementation".to_string(),
            policy: None,
            lock: None,
            sandbox: None,
            rollback: RollbackManager::new(git),
            sandbox_used: false,
            repo_root,
            repo_touched: false,
        }
    }
}

/// Orchestrates execution runs under mutual exclusion, sandbox isolation,
/// layered policy gating, and a tamper-evident audit trail.
pub struct ExecutorEngine {
    store: Arc<dyn TaskStore>,
    git: Arc<dyn GitClient>,
    registry: Arc<dyn ModeRegistry>,
    state_machine: Arc<TaskStateMachine>,
    planning_guard: PlanningGuard,
    risk_gate: RiskGate,
    diff_gate: DiffGate,
    lock: ExecutionLock,
    sandboxes: SandboxManager,
    config: ExecutorConfig,
}

impl ExecutorEngine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        git: Arc<dyn GitClient>,
        registry: Arc<dyn ModeRegistry>,
        gateway: Arc<dyn ModeGateway>,
        alerts: Arc<dyn AlertSink>,
        state_machine: Arc<TaskStateMachine>,
        config: ExecutorConfig,
    ) -> Self {
        let diff_gate = DiffGate::new(
            registry.clone(),
            gateway,
            alerts,
            git.clone(),
        );
        let lock = ExecutionLock::new(config.locks_dir.clone());
        let sandboxes = SandboxManager::new(git.clone());
        Self {
            store,
            git,
            registry,
            state_machine,
            planning_guard: PlanningGuard::new(),
            risk_gate: RiskGate::new(),
            diff_gate,
            lock,
            sandboxes,
            config,
        }
    }

    /// Run one execution request to completion.
    ///
    /// Returns `Err` only for failures that occur before the audit trail
    /// opens: the structural caller gate and trail creation itself. Every
    /// later outcome, including denials and infrastructure failures, comes
    /// back as an `ExecutionResult` with its artifact set on disk.
    #[instrument(
        skip(self, request, policy_path),
        fields(execution_request_id = %request.execution_request_id, caller = caller.as_str())
    )]
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        policy_path: Option<&Path>,
        caller: CallerSource,
    ) -> Result<ExecutionResult, ExecError> {
        // Structural gate: chat surfaces never trigger execution. This
        // precedes every side effect, the audit trail included.
        if caller == CallerSource::Chat {
            return Err(ExecError::ChatCallerForbidden {
                caller: caller.as_str().to_string(),
            });
        }

        let trail = AuditTrail::open(&self.config.runs_root, &request).await?;
        let mut result = ExecutionResult::begin(&request);
        let mut state = RunState::new(self.git.clone(), request.repo_root.clone());

        let outcome = self
            .run_inner(&trail, &request, policy_path, &mut result, &mut state)
            .await;
        Ok(self.finalize(&trail, result, state, outcome).await)
    }

    /// The checked steps of a run. Any `Err` escapes to finalization.
    async fn run_inner(
        &self,
        trail: &AuditTrail,
        request: &ExecutionRequest,
        policy_path: Option<&Path>,
        result: &mut ExecutionResult,
        state: &mut RunState,
    ) -> Result<ExecutionStatus, ExecError> {
        // Task resolution: explicit ids must exist, absent ids become a
        // fresh orphan so execution history cannot silently vanish.
        let task = match request.task_id {
            Some(id) => self
                .store
                .get(id)
                .await?
                .ok_or(ExecError::TaskNotFound(id))?,
            None => self.create_orphan_task(trail, request).await?,
        };
        result.task_id = Some(task.id);
        trail
            .record_info(
                "task_resolved",
                serde_json::json!({
                    "task_id": task.id,
                    "status": task.status.as_str(),
                    "spec_frozen": task.spec_frozen,
                }),
            )
            .await;

        if !task.spec_frozen {
            trail
                .record_error(
                    "spec_not_frozen",
                    serde_json::json!({ "task_id": task.id }),
                )
                .await;
            state.task = Some(task.clone());
            return Err(ExecError::SpecNotFrozen { task_id: task.id });
        }
        state.task = Some(task.clone());

        // Mode resolution; no default permissive fallback exists.
        let mode_id = request.resolved_mode_id().to_string();
        self.registry.resolve(&mode_id)?;
        state.mode_id = mode_id.clone();
        trail
            .record_info("mode_resolved", serde_json::json!({ "mode_id": mode_id }))
            .await;

        // Policy load; a supplied-but-unreadable policy is terminal.
        if let Some(path) = policy_path {
            let text = tokio::fs::read_to_string(path).await?;
            let policy = SandboxPolicy::parse(&text)?;
            trail
                .record_info(
                    "policy_loaded",
                    serde_json::json!({
                        "policy_id": policy.policy_id,
                        "path": path.display().to_string(),
                    }),
                )
                .await;
            state.policy = Some(policy);
        }

        if request.requires_review && request.approval_ref.is_none() {
            trail
                .record_decision(
                    "review_required",
                    serde_json::json!({ "blocked": true, "reason": "no approval reference" }),
                )
                .await;
            return Ok(ExecutionStatus::Blocked);
        }

        // Repository lock: non-blocking, fail-closed.
        let guard = self
            .lock
            .acquire(&request.repo_root, &request.execution_request_id)
            .await?;
        trail
            .record_info(
                "lock_acquired",
                serde_json::json!({ "repo_hash": guard.repo_hash() }),
            )
            .await;
        state.lock = Some(guard);

        let base_commit = self.git.head(&request.repo_root).await?;
        let sandbox = self
            .sandboxes
            .create(&request.repo_root, &base_commit, &trail.sandbox_dir())
            .await?;
        state.sandbox = Some(sandbox.clone());
        state.sandbox_used = true;
        trail
            .record_info(
                "sandbox_created",
                serde_json::json!({
                    "path": sandbox.path().display().to_string(),
                    "base_commit": base_commit,
                }),
            )
            .await;

        let checkpoint = state
            .rollback
            .checkpoint("pre_execution", &request.repo_root, sandbox.path())
            .await?;
        result.rollback_point = Some(checkpoint.clone());
        trail
            .record_info(
                "rollback_checkpoint",
                serde_json::json!({ "base_commit": checkpoint.base_commit }),
            )
            .await;

        // The operation batch. Risk blocks and policy denials are hard and
        // abort the run; planning violations and handler errors are local
        // to their operation.
        let operations = request.operations();
        trail
            .record_info(
                "operations_start",
                serde_json::json!({ "count": operations.len() }),
            )
            .await;
        for (index, op) in operations.iter().enumerate() {
            let outcome = self
                .execute_operation(trail, index, op, &task, request, state, &sandbox)
                .await?;
            trail
                .record_info(
                    "operation_result",
                    serde_json::json!({
                        "index": index,
                        "action": outcome.action,
                        "status": outcome.status.as_str(),
                    }),
                )
                .await;
            result.operations_executed.push(outcome);
        }

        self.bring_back(trail, request, result, state, &sandbox).await?;
        Ok(ExecutionStatus::Success)
    }

    async fn create_orphan_task(
        &self,
        trail: &AuditTrail,
        request: &ExecutionRequest,
    ) -> Result<Task, ExecError> {
        let task = Task::new(format!(
            "Orphan execution {}",
            request.execution_request_id
        ))
        .with_created_by(
            request
                .requested_by
                .clone()
                .unwrap_or_else(|| "executor".to_string()),
        )
        .with_metadata(TaskMetadata::new().with_extra("orphan", serde_json::json!(true)));
        self.store.insert(&task).await?;
        self.store
            .append_audit(
                &TaskAudit::new(task.id, AuditLevel::Info, "orphan_task_created").with_payload(
                    serde_json::json!({
                        "execution_request_id": request.execution_request_id,
                    }),
                ),
            )
            .await?;
        trail
            .record_info(
                "orphan_task_created",
                serde_json::json!({ "task_id": task.id }),
            )
            .await;
        info!(task_id = %task.id, "orphan task created for request without task_id");
        Ok(task)
    }

    /// Gate and run one operation.
    ///
    /// `Err` from here aborts the whole run; forbidden and failed
    /// operations come back as outcomes instead.
    #[allow(clippy::too_many_arguments)]
    async fn execute_operation(
        &self,
        trail: &AuditTrail,
        index: usize,
        op: &Operation,
        task: &Task,
        request: &ExecutionRequest,
        state: &RunState,
        sandbox: &Sandbox,
    ) -> Result<OperationOutcome, ExecError> {
        let (op_type, op_name, risk) = classify_action(&op.action);

        // Risk gate: unconditional hard stop without an approval.
        let decision = self.risk_gate.evaluate(
            risk,
            &op.action,
            Some(task.id),
            request.approval_ref.as_deref(),
        );
        self.store
            .append_audit(
                &TaskAudit::new(task.id, AuditLevel::Decision, "risk_decision").with_payload(
                    serde_json::json!({
                        "action": op.action,
                        "risk_level": risk.as_str(),
                        "allowed": decision.allowed,
                        "requires_approval": decision.requires_approval,
                    }),
                ),
            )
            .await?;
        trail
            .record_decision(
                "risk_decision",
                serde_json::json!({
                    "index": index,
                    "action": op.action,
                    "risk_level": risk.as_str(),
                    "allowed": decision.allowed,
                }),
            )
            .await;
        if !decision.allowed {
            return Err(ExecError::RiskBlocked {
                operation: op.action.clone(),
                risk_level: risk.as_str().to_string(),
            });
        }

        // Planning guard: soft, forbids just this operation.
        if let Err(e) = self
            .planning_guard
            .assert_operation_allowed(&op_type, &op_name, task)
        {
            self.store
                .append_audit(
                    &TaskAudit::new(task.id, AuditLevel::Decision, "planning_violation")
                        .with_payload(serde_json::json!({
                            "action": op.action,
                            "operation_type": op_type,
                            "operation_name": op_name,
                        })),
                )
                .await?;
            trail
                .record_decision(
                    "planning_violation",
                    serde_json::json!({ "index": index, "action": op.action }),
                )
                .await;
            return Ok(OperationOutcome::forbidden(index, &op.action, e.to_string()));
        }

        // Sandbox policy: a denial here is hard, unlike the planning guard.
        if let Some(policy) = &state.policy {
            if let Err(e) = policy.assert_operation_allowed(&op.action, &op.params) {
                self.store
                    .append_audit(
                        &TaskAudit::new(task.id, AuditLevel::Error, "policy_denied").with_payload(
                            serde_json::json!({
                                "action": op.action,
                                "error": e.to_string(),
                            }),
                        ),
                    )
                    .await?;
                trail
                    .record_error(
                        "policy_denied",
                        serde_json::json!({ "index": index, "action": op.action, "error": e.to_string() }),
                    )
                    .await;
                return Err(e);
            }
        }

        match self.apply_action(trail, sandbox, op).await {
            Ok(detail) => Ok(OperationOutcome::success(index, &op.action, detail)),
            Err(message) => {
                warn!(index, action = %op.action, %message, "operation failed, batch continues");
                Ok(OperationOutcome::failed(index, &op.action, message))
            }
        }
    }

    /// Run one handler against the sandbox. Errors are strings because
    /// every one of them is a local, recorded, batch-continues failure.
    async fn apply_action(
        &self,
        trail: &AuditTrail,
        sandbox: &Sandbox,
        op: &Operation,
    ) -> Result<serde_json::Value, String> {
        let require_str = |key: &str| -> Result<&str, String> {
            op.str_param(key)
                .ok_or_else(|| format!("missing `{key}` param for {}", op.action))
        };
        let resolve = |raw: &str| -> Result<PathBuf, String> {
            match sandbox_path(sandbox.path(), raw) {
                Ok(path) => Ok(path),
                Err(message) => Err(message),
            }
        };

        match op.action.as_str() {
            "write_file" => {
                let raw = require_str("path")?;
                let content = require_str("content")?;
                let path = match resolve(raw) {
                    Ok(p) => p,
                    Err(message) => {
                        trail
                            .record(
                                AuditLevel::Critical,
                                "sandbox_escape_attempt",
                                serde_json::json!({ "action": op.action, "path": raw }),
                            )
                            .await;
                        return Err(message);
                    }
                };
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({ "path": raw, "size": content.len() }))
            }
            "update_file" => {
                let raw = require_str("path")?;
                let content = require_str("content")?;
                let path = resolve(raw)?;
                if !path.exists() {
                    return Err(format!("update_file target `{raw}` does not exist"));
                }
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({ "path": raw, "size": content.len() }))
            }
            "mkdir" => {
                let raw = require_str("path")?;
                let path = resolve(raw)?;
                tokio::fs::create_dir_all(&path)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({ "path": raw }))
            }
            "git_add" => {
                let paths: Vec<String> = op
                    .params
                    .get("paths")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|i| i.as_str().map(str::to_owned))
                            .collect()
                    })
                    .unwrap_or_default();
                if paths.is_empty() {
                    self.git
                        .add_all(sandbox.path())
                        .await
                        .map_err(|e| e.to_string())?;
                } else {
                    self.git
                        .add(sandbox.path(), &paths)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                Ok(serde_json::json!({ "staged": if paths.is_empty() { serde_json::json!("all") } else { serde_json::json!(paths) } }))
            }
            "git_commit" => {
                let message = require_str("message")?;
                let commit = self
                    .git
                    .commit(sandbox.path(), message)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::json!({ "commit": commit }))
            }
            other => Err(format!("unsupported action `{other}`")),
        }
    }

    /// Extract sandbox commits and replay them into the real repository,
    /// one patch per commit, every patch through the diff gate.
    async fn bring_back(
        &self,
        trail: &AuditTrail,
        request: &ExecutionRequest,
        result: &mut ExecutionResult,
        state: &mut RunState,
        sandbox: &Sandbox,
    ) -> Result<(), ExecError> {
        let base = sandbox.base_commit();
        let head = self.git.head(sandbox.path()).await?;
        let commits = self.git.commit_range(sandbox.path(), base, &head).await?;
        trail
            .record_info(
                "sandbox_commits",
                serde_json::json!({ "count": commits.len(), "commits": commits }),
            )
            .await;
        if commits.is_empty() {
            trail
                .record_info("bring_back_skipped", serde_json::json!({ "reason": "no commits" }))
                .await;
            return Ok(());
        }

        // No policy means no path allow-list, and there is no implicit
        // allow-everything: the bring-back dies before generating patches.
        let policy = state.policy.as_ref().ok_or(ExecError::PolicyMissing)?;
        let scope = policy.allowlist.clone();

        let patch_files = self
            .git
            .format_patches(sandbox.path(), base, &head, &trail.patches_dir())
            .await?;
        for patch in &patch_files {
            let name = patch
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| patch.display().to_string());
            result.patches_generated.push(name);
        }

        let mut proof = SandboxProof {
            worktree_commits: commits.clone(),
            ..SandboxProof::default()
        };
        for (commit, patch) in commits.iter().zip(patch_files.iter()) {
            let name = patch
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| patch.display().to_string());
            proof
                .patch_sha256
                .insert(name.clone(), patch_digest(patch).await?);

            // From here the working tree and index of the real repository
            // can be dirty even when no commit landed yet.
            state.repo_touched = true;
            self.diff_gate
                .apply_diff_or_raise(
                    trail,
                    &request.repo_root,
                    patch,
                    &scope,
                    &state.mode_id,
                )
                .await?;
            self.git.add_all(&request.repo_root).await?;
            let new_commit = self
                .git
                .commit(&request.repo_root, &format!("Apply {name}"))
                .await?;
            proof.main_repo_commits_after_merge.push(new_commit);
            result.commits_brought_back.push(commit.clone());
        }

        proof.brought_back_at = Some(chrono::Utc::now());
        trail.write_sandbox_proof(&proof).await?;
        trail
            .record_info(
                "bring_back_complete",
                serde_json::json!({
                    "commits": result.commits_brought_back.len(),
                    "patches": result.patches_generated.len(),
                }),
            )
            .await;
        Ok(())
    }

    /// Always runs: rollback when the real repository was touched by a
    /// failed run, task status update where a legal edge exists, artifact
    /// writes, sandbox teardown, lock release.
    async fn finalize(
        &self,
        trail: &AuditTrail,
        mut result: ExecutionResult,
        state: RunState,
        outcome: Result<ExecutionStatus, ExecError>,
    ) -> ExecutionResult {
        let status = match &outcome {
            Ok(status) => *status,
            Err(e) => {
                trail
                    .record_error(
                        "run_failed",
                        serde_json::json!({
                            "category": e.category(),
                            "error": e.to_string(),
                        }),
                    )
                    .await;

                // The single unexpected-failure path: once a patch started
                // touching the real repository, restore the checkpoint. A
                // patch can dirty the tree and index without any commit
                // landing, so the flag gates this, not the commit list.
                if state.repo_touched {
                    match state.rollback.restore_latest(&state.repo_root).await {
                        Ok(Some(point)) => {
                            trail
                                .record_info(
                                    "rollback_performed",
                                    serde_json::json!({ "base_commit": point.base_commit }),
                                )
                                .await;
                        }
                        Ok(None) => {}
                        Err(rollback_err) => {
                            error!(error = %rollback_err, "best-effort rollback failed");
                            trail
                                .record_error(
                                    "rollback_failed",
                                    serde_json::json!({ "error": rollback_err.to_string() }),
                                )
                                .await;
                        }
                    }
                }
                status_for(e)
            }
        };
        let error_text = outcome.as_ref().err().map(ToString::to_string);
        result.finish(status, error_text.clone());

        // Task status follows the run outcome when the lifecycle allows it.
        if let Some(task) = &state.task {
            if let Some(err) = outcome.as_ref().err() {
                let audit = TaskAudit::new(task.id, AuditLevel::Error, "execution_failed")
                    .with_payload(serde_json::json!({
                        "execution_request_id": result.execution_request_id,
                        "category": err.category(),
                        "error": err.to_string(),
                    }));
                if let Err(e) = self.store.append_audit(&audit).await {
                    error!(error = %e, "failed to append execution_failed audit row");
                }
            }

            let (target, patch) = match status {
                ExecutionStatus::Success => (TaskStatus::Verifying, None),
                ExecutionStatus::Blocked => (TaskStatus::Blocked, None),
                ExecutionStatus::Denied | ExecutionStatus::Failed => {
                    let reason = outcome
                        .as_ref()
                        .err()
                        .map_or(ExitReason::Error, exit_reason_for);
                    (
                        TaskStatus::Failed,
                        Some(TaskMetadata::new().with_exit_reason(reason.as_str())),
                    )
                }
            };
            if task.status.can_transition_to(target) {
                match self.state_machine.transition(task.id, target, patch).await {
                    Ok(updated) => {
                        trail
                            .record_info(
                                "task_status_finalized",
                                serde_json::json!({
                                    "task_id": task.id,
                                    "status": updated.status.as_str(),
                                }),
                            )
                            .await;
                    }
                    Err(e) => {
                        warn!(error = %e, "finalize transition failed");
                        trail
                            .record_error(
                                "finalize_transition_failed",
                                serde_json::json!({ "target": target.as_str(), "error": e.to_string() }),
                            )
                            .await;
                    }
                }
            } else {
                trail
                    .record(
                        AuditLevel::Warning,
                        "finalize_transition_skipped",
                        serde_json::json!({
                            "from": task.status.as_str(),
                            "target": target.as_str(),
                            "reason": "no legal edge",
                        }),
                    )
                    .await;
            }
        }

        // Teardown: sandbox first, then the lock.
        if let Some(sandbox) = &state.sandbox {
            match self.sandboxes.destroy(sandbox).await {
                Ok(()) => {
                    trail
                        .record_info("sandbox_destroyed", serde_json::json!({}))
                        .await;
                }
                Err(e) => {
                    trail
                        .record_error(
                            "sandbox_destroy_failed",
                            serde_json::json!({ "error": e.to_string() }),
                        )
                        .await;
                }
            }
        }
        if let Some(guard) = state.lock {
            let repo_hash = guard.repo_hash().to_string();
            match guard.release().await {
                Ok(()) => {
                    trail
                        .record_info(
                            "lock_released",
                            serde_json::json!({ "repo_hash": repo_hash }),
                        )
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "lock release failed");
                    trail
                        .record_error(
                            "lock_release_failed",
                            serde_json::json!({ "repo_hash": repo_hash, "error": e.to_string() }),
                        )
                        .await;
                }
            }
        }

        // Artifacts, then the integrity manifest over all of them.
        if let Err(e) = trail.write_result(&result).await {
            error!(error = %e, "failed to write execution result artifact");
        }
        let summary = ExecutionSummary::from_result(&result, state.sandbox_used);
        if let Err(e) = trail.write_summary(&summary).await {
            error!(error = %e, "failed to write execution summary artifact");
        }
        if let Err(e) = trail.flush().await {
            error!(error = %e, "failed to flush run tape");
        }
        if let Err(e) = trail.write_checksums().await {
            error!(error = %e, "failed to write checksum manifest");
        }

        info!(
            status = status.as_str(),
            operations = result.operations_executed.len(),
            commits = result.commits_brought_back.len(),
            "run finalized"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_actions() {
        assert_eq!(
            classify_action("write_file"),
            ("file".to_string(), "write".to_string(), RiskLevel::Medium)
        );
        assert_eq!(
            classify_action("mkdir"),
            ("file".to_string(), "mkdir".to_string(), RiskLevel::Low)
        );
        assert_eq!(
            classify_action("git_push"),
            ("git".to_string(), "push".to_string(), RiskLevel::Critical)
        );
    }

    #[test]
    fn test_classify_unknown_is_high_risk() {
        let (op_type, op_name, risk) = classify_action("drop_database");
        assert_eq!(op_type, "unknown");
        assert_eq!(op_name, "drop_database");
        assert_eq!(risk, RiskLevel::High);
    }

    #[test]
    fn test_sandbox_path_containment() {
        let root = Path::new("/runs/r1/sandbox");
        assert_eq!(
            sandbox_path(root, "src/lib.rs").unwrap(),
            root.join("src/lib.rs")
        );
        assert!(sandbox_path(root, "/etc/passwd").is_err());
        assert!(sandbox_path(root, "../outside").is_err());
        assert!(sandbox_path(root, "src/../../outside").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ExecError::PolicyDenied {
                operation: "x".into(),
                reason: "y".into(),
                rule_id: None
            }),
            ExecutionStatus::Denied
        );
        assert_eq!(
            status_for(&ExecError::RiskBlocked {
                operation: "x".into(),
                risk_level: "high".into()
            }),
            ExecutionStatus::Blocked
        );
        assert_eq!(
            status_for(&ExecError::PolicyMissing),
            ExecutionStatus::Failed
        );
        assert_eq!(
            status_for(&ExecError::LockHeld {
                repo_hash: "h".into()
            }),
            ExecutionStatus::Failed
        );
    }

    #[test]
    fn test_exit_reason_mapping() {
        assert_eq!(
            exit_reason_for(&ExecError::PolicyMissing),
            ExitReason::PolicyDenied
        );
        assert_eq!(
            exit_reason_for(&ExecError::LockHeld {
                repo_hash: "h".into()
            }),
            ExitReason::LockUnavailable
        );
        assert_eq!(
            exit_reason_for(&ExecError::Store("db".into())),
            ExitReason::Infrastructure
        );
        assert_eq!(
            exit_reason_for(&ExecError::TaskNotFound(uuid::Uuid::new_v4())),
            ExitReason::Error
        );
    }
}
