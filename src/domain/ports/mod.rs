//! Port trait definitions (Hexagonal Architecture)
//!
//! Narrow interfaces through which the safety core consumes its
//! collaborators:
//! - GitClient: version-control operations against an explicit repository
//! - ModeRegistry: governance mode resolution
//! - ModeGateway: pluggable transition/operation review
//! - AlertSink: fire-and-forget governance notifications
//! - TaskStore: task and audit persistence behind the serialized writer
//!
//! Production adapters live under `infrastructure/`; tests substitute
//! in-memory implementations.

pub mod alert_sink;
pub mod git_client;
pub mod mode_gateway;
pub mod mode_registry;
pub mod task_store;

pub use alert_sink::AlertSink;
pub use git_client::GitClient;
pub use mode_gateway::ModeGateway;
pub use mode_registry::ModeRegistry;
pub use task_store::{TaskFilter, TaskStore};
