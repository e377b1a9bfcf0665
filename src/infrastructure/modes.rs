//! Builtin governance modes and the registry-backed gateway.
//!
//! Three modes ship by default: `implementation` may commit and apply
//! diffs, `review` may apply diffs but never commit, `planning` may do
//! neither. Custom modes register through `with_mode`; nothing here ever
//! falls back to a permissive default.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::error::ExecError;
use crate::domain::models::{GateContext, GateDecision, Mode, TaskStatus};
use crate::domain::ports::{ModeGateway, ModeRegistry};

/// In-memory mode registry seeded with the builtin modes.
#[derive(Debug, Clone)]
pub struct BuiltinModeRegistry {
    modes: HashMap<String, Mode>,
}

impl BuiltinModeRegistry {
    pub fn new() -> Self {
        let mut modes = HashMap::new();
        for mode in [
            Mode::new("implementation", true, true),
            Mode::new("review", false, true),
            Mode::new("planning", false, false),
        ] {
            modes.insert(mode.mode_id().to_string(), mode);
        }
        Self { modes }
    }

    /// Register or replace a mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.modes.insert(mode.mode_id().to_string(), mode);
        self
    }
}

impl Default for BuiltinModeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeRegistry for BuiltinModeRegistry {
    fn resolve(&self, mode_id: &str) -> Result<Mode, ExecError> {
        self.modes
            .get(mode_id)
            .cloned()
            .ok_or_else(|| ExecError::ModeResolution {
                mode_id: mode_id.to_string(),
                reason: "mode is not registered".to_string(),
            })
    }
}

/// Gateway whose rulings derive from the registered mode's capabilities.
///
/// Transitions into Running and diff application are the two governed
/// points; everything else is approved. Resolution failures propagate as
/// errors, and the caller decides whether that fails open or closed.
pub struct RegistryModeGateway<R: ModeRegistry> {
    registry: R,
}

impl<R: ModeRegistry> RegistryModeGateway<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl<R: ModeRegistry> ModeGateway for RegistryModeGateway<R> {
    async fn review(&self, ctx: &GateContext) -> Result<GateDecision, ExecError> {
        let mode = self.registry.resolve(&ctx.mode_id)?;

        if let Some(operation) = &ctx.operation {
            if operation == "apply_diff" {
                if !mode.allows_diff() {
                    return Ok(GateDecision::rejected(format!(
                        "mode `{}` does not permit diff application",
                        ctx.mode_id
                    )));
                }
                return Ok(GateDecision::approved("diff application permitted"));
            }
            return Ok(GateDecision::approved(format!(
                "operation `{operation}` is not gateway-governed"
            )));
        }

        if ctx.to_state == Some(TaskStatus::Running) && !mode.allows_commit() {
            return Ok(GateDecision::rejected(format!(
                "mode `{}` does not permit execution",
                ctx.mode_id
            )));
        }

        Ok(GateDecision::approved("transition permitted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_builtin_modes_resolve() {
        let registry = BuiltinModeRegistry::new();

        let implementation = registry.resolve("implementation").unwrap();
        assert!(implementation.allows_commit());
        assert!(implementation.allows_diff());

        let review = registry.resolve("review").unwrap();
        assert!(!review.allows_commit());
        assert!(review.allows_diff());

        let planning = registry.resolve("planning").unwrap();
        assert!(!planning.allows_commit());
        assert!(!planning.allows_diff());
    }

    #[test]
    fn test_unknown_mode_is_resolution_error() {
        let registry = BuiltinModeRegistry::new();
        assert!(matches!(
            registry.resolve("ghost"),
            Err(ExecError::ModeResolution { .. })
        ));
    }

    #[test]
    fn test_custom_mode_registration() {
        let registry =
            BuiltinModeRegistry::new().with_mode(Mode::new("hotfix", true, true));
        assert!(registry.resolve("hotfix").is_ok());
    }

    #[tokio::test]
    async fn test_gateway_rejects_running_under_planning() {
        let gateway = RegistryModeGateway::new(BuiltinModeRegistry::new());
        let ctx = GateContext::transition(
            Uuid::new_v4(),
            "planning",
            TaskStatus::Queued,
            TaskStatus::Running,
        );
        let decision = gateway.review(&ctx).await.unwrap();
        assert!(!decision.is_approved());
        assert!(decision.reason.contains("does not permit execution"));
    }

    #[tokio::test]
    async fn test_gateway_approves_running_under_implementation() {
        let gateway = RegistryModeGateway::new(BuiltinModeRegistry::new());
        let ctx = GateContext::transition(
            Uuid::new_v4(),
            "implementation",
            TaskStatus::Queued,
            TaskStatus::Running,
        );
        assert!(gateway.review(&ctx).await.unwrap().is_approved());
    }

    #[tokio::test]
    async fn test_gateway_rejects_diff_under_planning() {
        let gateway = RegistryModeGateway::new(BuiltinModeRegistry::new());
        let ctx = GateContext::operation("planning", "apply_diff");
        let decision = gateway.review(&ctx).await.unwrap();
        assert!(!decision.is_approved());
    }

    #[tokio::test]
    async fn test_gateway_approves_ungoverned_transition() {
        let gateway = RegistryModeGateway::new(BuiltinModeRegistry::new());
        let ctx = GateContext::transition(
            Uuid::new_v4(),
            "planning",
            TaskStatus::Draft,
            TaskStatus::Approved,
        );
        assert!(gateway.review(&ctx).await.unwrap().is_approved());
    }

    #[tokio::test]
    async fn test_gateway_propagates_resolution_error() {
        let gateway = RegistryModeGateway::new(BuiltinModeRegistry::new());
        let ctx = GateContext::operation("ghost", "apply_diff");
        assert!(matches!(
            gateway.review(&ctx).await,
            Err(ExecError::ModeResolution { .. })
        ));
    }
}
