//! Implementation of the `warden run` command.
//!
//! Reads an execution request from a file, wires the full engine stack,
//! and runs the request under the task-runner caller identity. Chat
//! surfaces have no path into this command.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{CallerSource, ExecutionRequest, ExecutionStatus, OperationStatus};
use crate::domain::ports::{AlertSink, GitClient, ModeGateway, ModeRegistry, TaskStore};
use crate::infrastructure::alerts::TracingAlertSink;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::database::{DatabaseConnection, SqliteTaskStore};
use crate::infrastructure::git::GitCli;
use crate::infrastructure::modes::{BuiltinModeRegistry, RegistryModeGateway};
use crate::services::{ExecutorConfig, ExecutorEngine, StateMachineConfig, TaskStateMachine};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Execution request file (JSON, or YAML by extension)
    pub request: PathBuf,

    /// Sandbox policy file gating operations and bring-back paths
    #[arg(short, long)]
    pub policy: Option<PathBuf>,
}

pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let db = DatabaseConnection::initialize(Path::new(&config.database.path))
        .await
        .context("Failed to open database. Run 'warden init' first.")?;

    let mut request = read_request(&args.request).await?;
    if request.mode_id.is_none() {
        request = request.with_mode(config.execution.default_mode.clone());
    }
    let run_id = request.execution_request_id.clone();

    let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::with_write_timeout(
        db.pool().clone(),
        Duration::from_millis(config.execution.write_timeout_ms),
    ));
    let git: Arc<dyn GitClient> = Arc::new(GitCli::new());
    let registry_impl = BuiltinModeRegistry::new();
    let registry: Arc<dyn ModeRegistry> = Arc::new(registry_impl.clone());
    let gateway: Arc<dyn ModeGateway> = Arc::new(RegistryModeGateway::new(registry_impl));
    let alerts: Arc<dyn AlertSink> = Arc::new(TracingAlertSink::new());

    let state_machine = Arc::new(TaskStateMachine::new(
        store.clone(),
        gateway.clone(),
        alerts.clone(),
        StateMachineConfig {
            min_audit_events_for_done: config.execution.min_audit_events_for_done,
        },
    ));

    let engine = ExecutorEngine::new(
        store,
        git,
        registry,
        gateway,
        alerts,
        state_machine,
        ExecutorConfig {
            runs_root: PathBuf::from(&config.execution.runs_root),
            locks_dir: PathBuf::from(&config.execution.locks_dir),
        },
    );

    let result = engine
        .execute(request, args.policy.as_deref(), CallerSource::TaskRunner)
        .await?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let headline = match result.status {
            ExecutionStatus::Success => {
                format!("{} run {run_id} succeeded", style("✓").green().bold())
            }
            ExecutionStatus::Denied => {
                format!("{} run {run_id} denied", style("✗").red().bold())
            }
            ExecutionStatus::Blocked => {
                format!("{} run {run_id} blocked", style("⊗").yellow().bold())
            }
            ExecutionStatus::Failed => {
                format!("{} run {run_id} failed", style("✗").red().bold())
            }
        };
        println!("{headline}");

        if let Some(error) = &result.error {
            println!("  Error: {error}");
        }
        if let Some(task_id) = result.task_id {
            println!("  Task: {task_id}");
        }

        let ok = count_by(&result, OperationStatus::Success);
        let failed = count_by(&result, OperationStatus::Failed);
        let forbidden = count_by(&result, OperationStatus::Forbidden);
        println!(
            "  Operations: {} total ({ok} ok, {failed} failed, {forbidden} forbidden)",
            result.operations_executed.len()
        );

        if !result.commits_brought_back.is_empty() {
            println!(
                "  Commits brought back: {}",
                result.commits_brought_back.len()
            );
        }
        for patch in &result.patches_generated {
            println!("  Patch: {patch}");
        }

        let run_dir = Path::new(&config.execution.runs_root).join(&run_id);
        println!("  Artifacts: {}", run_dir.display());
    }

    db.close().await;
    Ok(())
}

fn count_by(result: &crate::domain::models::ExecutionResult, status: OperationStatus) -> usize {
    result
        .operations_executed
        .iter()
        .filter(|op| op.status == status)
        .count()
}

async fn read_request(path: &Path) -> Result<ExecutionRequest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read request file {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let request = if is_yaml {
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse YAML request {}", path.display()))?
    } else {
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse JSON request {}", path.display()))?
    };
    Ok(request)
}
