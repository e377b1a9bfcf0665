//! Task lifecycle CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::id_resolver::resolve_task_id;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, Task, TaskMetadata, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskStore};
use crate::infrastructure::alerts::TracingAlertSink;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::database::{DatabaseConnection, SqliteTaskStore};
use crate::infrastructure::modes::{BuiltinModeRegistry, RegistryModeGateway};
use crate::services::{StateMachineConfig, TaskStateMachine};

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new task in draft
    Create {
        /// Task title
        title: String,
        /// Governance mode recorded in task metadata
        #[arg(short, long)]
        mode: Option<String>,
        /// Who is creating the task
        #[arg(long)]
        created_by: Option<String>,
    },
    /// List tasks
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Show task details
    Show {
        /// Task ID (any unique prefix)
        id: String,
    },
    /// Freeze the task's spec, making it eligible for execution
    Freeze {
        /// Task ID (any unique prefix)
        id: String,
    },
    /// Move a task through the lifecycle state machine
    Transition {
        /// Task ID (any unique prefix)
        id: String,
        /// Target status
        status: String,
        /// Exit reason (required when entering failed)
        #[arg(long)]
        exit_reason: Option<String>,
        /// Cleanup summary (recorded when canceling)
        #[arg(long)]
        cleanup_summary: Option<String>,
        /// Pipeline stage label
        #[arg(long)]
        stage: Option<String>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TaskActionOutput {
    pub success: bool,
    pub message: String,
    pub task: Option<Task>,
}

impl CommandOutput for TaskActionOutput {
    fn to_human(&self) -> String {
        match &self.task {
            Some(task) => format!(
                "{}\n  ID: {}\n  Status: {}\n  Spec frozen: {}",
                self.message, task.id, task.status, task.spec_frozen
            ),
            None => self.message.clone(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: TaskArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let db = DatabaseConnection::initialize(Path::new(&config.database.path))
        .await
        .context("Failed to open database. Run 'warden init' first.")?;
    let pool = db.pool().clone();
    let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::with_write_timeout(
        pool.clone(),
        Duration::from_millis(config.execution.write_timeout_ms),
    ));

    match args.command {
        TaskCommands::Create { title, mode, created_by } => {
            let mut task = Task::new(title);
            if let Some(mode_id) = mode {
                task.metadata = task.metadata.with_mode(mode_id);
            }
            if let Some(creator) = created_by {
                task = task.with_created_by(creator);
            }
            task.validate().map_err(|reason| anyhow::anyhow!(reason))?;
            store.insert(&task).await?;

            let out = TaskActionOutput {
                success: true,
                message: format!("Task created: {}", task.id),
                task: Some(task),
            };
            output(&out, json_mode);
        }

        TaskCommands::List { status, limit } => {
            let status = match status {
                Some(raw) => Some(
                    TaskStatus::from_str(&raw)
                        .ok_or_else(|| anyhow::anyhow!("Invalid status: {}", raw))?,
                ),
                None => None,
            };
            let tasks = store
                .list(TaskFilter {
                    status,
                    limit: Some(limit),
                })
                .await?;

            if json_mode {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                let formatter = TableFormatter::new();
                println!("{}", formatter.format_tasks(&tasks));
                println!("\nShowing {} task(s)", tasks.len());
            }
        }

        TaskCommands::Show { id } => {
            let uuid = resolve_task_id(&pool, &id).await?;
            let task = store
                .get(uuid)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;
            let audit_count = store.count_audit(uuid).await?;

            if json_mode {
                let body = serde_json::json!({
                    "task": task,
                    "audit_count": audit_count,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("Task Details:");
                println!("  ID: {}", task.id);
                println!("  Title: {}", task.title);
                println!("  Status: {}", task.status);
                println!("  Spec frozen: {}", task.spec_frozen);
                if let Some(mode) = &task.metadata.mode_id {
                    println!("  Mode: {mode}");
                }
                if let Some(stage) = &task.metadata.current_stage {
                    println!("  Stage: {stage}");
                }
                if let Some(reason) = &task.metadata.exit_reason {
                    println!("  Exit reason: {reason}");
                }
                if let Some(summary) = &task.metadata.cleanup_summary {
                    println!("  Cleanup: {summary}");
                }
                if let Some(creator) = &task.created_by {
                    println!("  Created by: {creator}");
                }
                println!(
                    "  Created at: {}",
                    task.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!(
                    "  Updated at: {}",
                    task.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!("  Audit rows: {audit_count}");
            }
        }

        TaskCommands::Freeze { id } => {
            let uuid = resolve_task_id(&pool, &id).await?;
            store.set_spec_frozen(uuid, true).await?;
            let task = store.get(uuid).await?;

            let out = TaskActionOutput {
                success: true,
                message: format!("Spec frozen for task {uuid}"),
                task,
            };
            output(&out, json_mode);
        }

        TaskCommands::Transition {
            id,
            status,
            exit_reason,
            cleanup_summary,
            stage,
        } => {
            let uuid = resolve_task_id(&pool, &id).await?;
            let target = TaskStatus::from_str(&status)
                .ok_or_else(|| anyhow::anyhow!("Invalid status: {}", status))?;

            let machine = build_state_machine(store.clone(), &config);

            let mut patch = TaskMetadata::new();
            patch.exit_reason = exit_reason;
            patch.cleanup_summary = cleanup_summary;
            patch.current_stage = stage;
            let patch = if patch == TaskMetadata::new() {
                None
            } else {
                Some(patch)
            };

            let task = machine.transition(uuid, target, patch).await?;

            let out = TaskActionOutput {
                success: true,
                message: format!("Task {} moved to {}", uuid, task.status),
                task: Some(task),
            };
            output(&out, json_mode);
        }
    }

    db.close().await;
    Ok(())
}

fn build_state_machine(store: Arc<dyn TaskStore>, config: &Config) -> TaskStateMachine {
    let gateway = Arc::new(RegistryModeGateway::new(BuiltinModeRegistry::new()));
    let alerts = Arc::new(TracingAlertSink::new());
    TaskStateMachine::new(
        store,
        gateway,
        alerts,
        StateMachineConfig {
            min_audit_events_for_done: config.execution.min_audit_events_for_done,
        },
    )
}
