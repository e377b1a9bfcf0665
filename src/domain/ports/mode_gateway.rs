use async_trait::async_trait;

use crate::domain::error::ExecError;
use crate::domain::models::{GateContext, GateDecision};

/// Port for the pluggable governance decision function.
///
/// Consulted on every governed state transition and on diff application.
/// An `Err` means the gateway infrastructure itself failed, which is
/// distinct from a non-approved decision; callers decide whether that
/// fails open (lifecycle transitions) or closed (diff application).
#[async_trait]
pub trait ModeGateway: Send + Sync {
    /// Review a transition or operation under the active mode.
    async fn review(&self, ctx: &GateContext) -> Result<GateDecision, ExecError>;
}
