pub mod alert;
pub mod audit;
pub mod config;
pub mod diff;
pub mod execution;
pub mod mode;
pub mod policy;
pub mod risk;
pub mod rollback;
pub mod task;

pub use alert::{Alert, AlertSeverity};
pub use audit::{AuditLevel, TaskAudit};
pub use config::{Config, DatabaseConfig, ExecutionConfig, LoggingConfig};
pub use diff::DiffValidationResult;
pub use execution::{
    CallerSource, ExecutionRequest, ExecutionResult, ExecutionStatus, ExitReason, Operation,
    OperationOutcome, OperationStatus, PatchPlan, PatchStep,
};
pub use mode::{GateContext, GateDecision, GateVerdict, Mode};
pub use policy::{OperationRule, PolicyAllowlist, SandboxPolicy};
pub use risk::{RiskDecision, RiskLevel};
pub use rollback::RollbackPoint;
pub use task::{Task, TaskMetadata, TaskStatus};
