//! Audit trail CLI command.
//!
//! Reads the append-only audit rows for a task. There is deliberately no
//! write surface here; rows are only produced by the state machine and the
//! executor.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::id_resolver::resolve_task_id;
use crate::cli::output::TableFormatter;
use crate::domain::models::AuditLevel;
use crate::domain::ports::TaskStore;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::database::{DatabaseConnection, SqliteTaskStore};

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Task ID (any unique prefix)
    pub id: String,

    /// Only show rows at this level (debug, info, decision, warning, error, critical)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Maximum number of rows to display, newest kept
    #[arg(long)]
    pub limit: Option<usize>,
}

pub async fn execute(args: AuditArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let db = DatabaseConnection::initialize(Path::new(&config.database.path))
        .await
        .context("Failed to open database. Run 'warden init' first.")?;
    let pool = db.pool().clone();
    let store: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::with_write_timeout(
        pool.clone(),
        Duration::from_millis(config.execution.write_timeout_ms),
    ));

    let level = match &args.level {
        Some(raw) => Some(
            AuditLevel::from_str(raw).ok_or_else(|| anyhow::anyhow!("Invalid level: {}", raw))?,
        ),
        None => None,
    };

    let uuid = resolve_task_id(&pool, &args.id).await?;
    let mut rows = store.list_audit(uuid).await?;

    if let Some(level) = level {
        rows.retain(|row| row.level == level);
    }
    if let Some(limit) = args.limit {
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
    }

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No audit rows for task {uuid}.");
    } else {
        let formatter = TableFormatter::new();
        println!("{}", formatter.format_audit(&rows));
        println!("\n{} audit row(s) for task {uuid}", rows.len());
    }

    db.close().await;
    Ok(())
}
