use crate::domain::error::ExecError;
use crate::domain::models::Mode;

/// Port for resolving governance modes.
///
/// There is no default permissive mode anywhere in the core. An unknown
/// `mode_id` resolves to `ExecError::ModeResolution`, and how that error is
/// handled depends on the call site: the state machine fails open, the diff
/// gate fails the application.
pub trait ModeRegistry: Send + Sync {
    /// Resolve a mode by id.
    fn resolve(&self, mode_id: &str) -> Result<Mode, ExecError>;
}
