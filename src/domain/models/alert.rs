//! Alert model for governance notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a governance alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// A fire-and-forget governance notification.
///
/// Emission must never fail the calling operation; sinks swallow their own
/// delivery errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            mode_id: None,
            operation: None,
            message: message.into(),
            context: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_mode(mut self, mode_id: impl Into<String>) -> Self {
        self.mode_id = Some(mode_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}
