//! Command-line interface.
//!
//! Thin shell over the domain services: parse arguments with clap, wire the
//! SQLite store and governance adapters, and render either human or JSON
//! output per the global `--json` flag.

pub mod commands;
pub mod id_resolver;
pub mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - Task Execution Safety Core", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize warden configuration and database
    Init(commands::init::InitArgs),

    /// Task lifecycle commands
    Task(commands::task::TaskArgs),

    /// Execute a request file inside a sandboxed run
    Run(commands::run::RunArgs),

    /// Inspect a task's audit trail
    Audit(commands::audit::AuditArgs),
}

/// Report a command failure and exit non-zero, honoring `--json`.
pub fn handle_error(err: anyhow::Error, json_mode: bool) {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
