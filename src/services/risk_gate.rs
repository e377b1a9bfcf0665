//! Unconditional block on unapproved high-risk operations.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::error::ExecError;
use crate::domain::models::{RiskDecision, RiskLevel};

/// Stateless risk evaluator.
///
/// High and Critical operations proceed only against an explicit approval
/// reference. There is no configuration flag that bypasses this; the hard
/// stop is independent of every other policy layer.
pub struct RiskGate;

impl RiskGate {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        risk_level: RiskLevel,
        operation: &str,
        task_id: Option<Uuid>,
        approval_ref: Option<&str>,
    ) -> RiskDecision {
        if !risk_level.requires_approval() {
            debug!(?task_id, operation, %risk_level, "risk below approval threshold");
            return RiskDecision {
                allowed: true,
                requires_approval: false,
                reason: format!("{risk_level} risk is below the approval threshold"),
            };
        }

        match approval_ref {
            Some(approval) => {
                debug!(?task_id, operation, %risk_level, approval, "high risk approved");
                RiskDecision {
                    allowed: true,
                    requires_approval: true,
                    reason: format!("{risk_level} risk allowed under approval `{approval}`"),
                }
            }
            None => {
                warn!(?task_id, operation, %risk_level, "high risk blocked, no approval reference");
                RiskDecision {
                    allowed: false,
                    requires_approval: true,
                    reason: format!("{risk_level} risk requires an approval reference"),
                }
            }
        }
    }

    /// Evaluate and convert a block into a hard error.
    pub fn check_or_raise(
        &self,
        risk_level: RiskLevel,
        operation: &str,
        task_id: Option<Uuid>,
        approval_ref: Option<&str>,
    ) -> Result<RiskDecision, ExecError> {
        let decision = self.evaluate(risk_level, operation, task_id, approval_ref);
        if !decision.allowed {
            return Err(ExecError::RiskBlocked {
                operation: operation.to_string(),
                risk_level: risk_level.as_str().to_string(),
            });
        }
        Ok(decision)
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new()
    }
}
