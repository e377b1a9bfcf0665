//! Warden - Task Execution Safety Core
//!
//! Warden governs how tasks move through their lifecycle and how approved
//! work actually touches a repository. Every status change passes one
//! validated state machine, every repository mutation passes one sandboxed
//! executor, and both leave a tamper-evident audit trail.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure business logic and domain models
//! - **Service Layer** (`services`): State machine, gates, and the executor
//! - **Infrastructure Layer** (`infrastructure`): SQLite, git, config, alerts
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use warden::services::TaskStateMachine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire a store, gateway, and alert sink, then drive transitions
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::error::ExecError;
pub use domain::models::{
    AuditLevel, CallerSource, Config, DatabaseConfig, ExecutionConfig, ExecutionRequest,
    ExecutionResult, ExecutionStatus, LoggingConfig, SandboxPolicy, Task, TaskAudit, TaskMetadata,
    TaskStatus,
};
pub use domain::ports::{
    AlertSink, GitClient, ModeGateway, ModeRegistry, TaskFilter, TaskStore,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ExecutorEngine, TaskStateMachine};
