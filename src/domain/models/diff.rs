//! Diff validation model.

use serde::{Deserialize, Serialize};

/// Output of path-scope verification over one unified diff.
///
/// Consumed by the diff gate: an invalid result means the diff is never
/// applied, and the result rides along in the rejection error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Every path the diff touches, as parsed from its headers
    pub files_touched: Vec<String>,
}

impl DiffValidationResult {
    pub fn valid(files_touched: Vec<String>) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            files_touched,
        }
    }

    pub fn invalid(errors: Vec<String>, files_touched: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
            warnings: Vec::new(),
            files_touched,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}
