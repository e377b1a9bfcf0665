//! Tracing-backed alert sink.

use tracing::{error, info, warn};

use crate::domain::models::{Alert, AlertSeverity};
use crate::domain::ports::AlertSink;

/// Production `AlertSink` that logs through `tracing`.
///
/// Delivery cannot fail, which satisfies the fire-and-forget contract
/// without any swallowing logic.
#[derive(Debug, Clone, Default)]
pub struct TracingAlertSink;

impl TracingAlertSink {
    pub fn new() -> Self {
        Self
    }
}

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: Alert) {
        let mode = alert.mode_id.as_deref().unwrap_or("-");
        let operation = alert.operation.as_deref().unwrap_or("-");
        match alert.severity {
            AlertSeverity::Info => {
                info!(mode, operation, context = %alert.context, "alert: {}", alert.message);
            }
            AlertSeverity::Warning => {
                warn!(mode, operation, context = %alert.context, "alert: {}", alert.message);
            }
            AlertSeverity::Error | AlertSeverity::Critical => {
                error!(
                    mode,
                    operation,
                    severity = alert.severity.as_str(),
                    context = %alert.context,
                    "alert: {}",
                    alert.message
                );
            }
        }
    }
}
