use crate::domain::models::Alert;

/// Port for emitting governance alerts.
///
/// Fire-and-forget: implementations swallow their own delivery failures,
/// so emitting can never abort the calling operation.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: Alert);
}
