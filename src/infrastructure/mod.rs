//! Infrastructure layer module
//!
//! Production adapters behind the domain ports:
//! - SQLite task store with the serialized writer (sqlx)
//! - Git CLI client
//! - Builtin mode registry and gateway
//! - Tracing-backed alert sink
//! - Configuration management (figment)
//!
//! Infrastructure implementations satisfy the port traits defined in the
//! domain layer.

pub mod alerts;
pub mod config;
pub mod database;
pub mod git;
pub mod modes;

pub use alerts::TracingAlertSink;
pub use config::{ConfigError, ConfigLoader};
pub use database::{DatabaseConnection, SqliteTaskStore};
pub use git::GitCli;
pub use modes::{BuiltinModeRegistry, RegistryModeGateway};
