//! Service layer for the execution safety core.
//!
//! Leaf-to-root: audit trail and checksums at the bottom, then the lock,
//! rollback, sandbox, and the guard/gate stack, with the state machine and
//! the executor composing everything at the top.

pub mod audit_trail;
pub mod checksum;
pub mod diff_gate;
pub mod execution_lock;
pub mod executor;
pub mod planning_guard;
pub mod risk_gate;
pub mod rollback;
pub mod sandbox;
pub mod state_machine;

pub use audit_trail::{AuditTrail, ChecksumManifest, ExecutionSummary, SandboxProof, TapeEvent};
pub use diff_gate::DiffGate;
pub use execution_lock::{ExecutionLock, ExecutionLockGuard};
pub use executor::{ExecutorConfig, ExecutorEngine};
pub use planning_guard::PlanningGuard;
pub use risk_gate::RiskGate;
pub use rollback::RollbackManager;
pub use sandbox::{Sandbox, SandboxManager};
pub use state_machine::{StateMachineConfig, TaskStateMachine};
