//! The single legal path for a unified diff into the real repository.
//!
//! Every call site routes through `apply_diff_or_raise`: direct diff
//! application and the commit bring-back both. This is an architectural
//! invariant, not a convention; nothing else in the crate calls
//! `GitClient::apply_patch` against the real repository.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::domain::error::ExecError;
use crate::domain::models::{
    Alert, AlertSeverity, DiffValidationResult, GateContext, PolicyAllowlist,
};
use crate::domain::ports::{AlertSink, GitClient, ModeGateway, ModeRegistry};
use crate::services::audit_trail::AuditTrail;

/// Path patterns are truncated to this many characters before they are
/// recorded, bounding audit payloads against oversized or hostile input.
const MAX_RECORDED_PATTERN_LEN: usize = 80;

fn truncate_pattern(pattern: &str) -> String {
    pattern.chars().take(MAX_RECORDED_PATTERN_LEN).collect()
}

fn compile_globs(patterns: &[String]) -> Result<GlobSet, ExecError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ExecError::PolicyInvalid {
            reason: format!("bad path pattern `{}`: {e}", truncate_pattern(pattern)),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ExecError::PolicyInvalid {
        reason: format!("cannot compile path scope: {e}"),
    })
}

/// Pull every touched path out of a unified diff's headers.
///
/// Handles `diff --git` lines and `---`/`+++` file markers, strips the
/// `a/`/`b/` prefixes, and ignores `/dev/null` sides of adds and deletes.
pub fn files_touched(diff_text: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let path = raw
            .strip_prefix("a/")
            .or_else(|| raw.strip_prefix("b/"))
            .unwrap_or(raw);
        if path.is_empty() || path == "/dev/null" {
            return;
        }
        if !files.iter().any(|f| f == path) {
            files.push(path.to_string());
        }
    };

    for line in diff_text.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            for token in rest.split_whitespace() {
                push(token);
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            push(rest.trim());
        } else if let Some(rest) = line.strip_prefix("--- ") {
            push(rest.trim());
        }
    }
    files
}

/// Check every file a diff touches against the allow/forbid scope.
///
/// Deny wins over allow, and an empty allow-list permits nothing; there is
/// no implicit allow-everything anywhere in this gate.
pub fn verify_path_scope(
    diff_text: &str,
    scope: &PolicyAllowlist,
) -> Result<DiffValidationResult, ExecError> {
    let allowed = compile_globs(&scope.paths)?;
    let forbidden = compile_globs(&scope.forbidden_paths)?;

    let files = files_touched(diff_text);
    if files.is_empty() {
        return Ok(DiffValidationResult::invalid(
            vec!["diff contains no recognizable file headers".to_string()],
            Vec::new(),
        ));
    }

    let mut errors = Vec::new();
    for file in &files {
        if forbidden.is_match(file) {
            errors.push(format!("path `{file}` matches a forbidden pattern"));
        } else if !allowed.is_match(file) {
            errors.push(format!("path `{file}` is outside the allowed scope"));
        }
    }

    let mut result = if errors.is_empty() {
        DiffValidationResult::valid(files)
    } else {
        DiffValidationResult::invalid(errors, files)
    };
    if scope.paths.iter().any(|p| p == "**") && scope.forbidden_paths.is_empty() {
        result = result.with_warning("scope allows every path and forbids none".to_string());
    }
    Ok(result)
}

/// Verified chokepoint composing mode capability, gateway review, and
/// path-scope verification ahead of the actual apply.
pub struct DiffGate {
    registry: Arc<dyn ModeRegistry>,
    gateway: Arc<dyn ModeGateway>,
    alerts: Arc<dyn AlertSink>,
    git: Arc<dyn GitClient>,
}

impl DiffGate {
    pub fn new(
        registry: Arc<dyn ModeRegistry>,
        gateway: Arc<dyn ModeGateway>,
        alerts: Arc<dyn AlertSink>,
        git: Arc<dyn GitClient>,
    ) -> Self {
        Self {
            registry,
            gateway,
            alerts,
            git,
        }
    }

    /// Apply one patch file to the real repository, or refuse.
    ///
    /// All-or-nothing per diff: the patch is applied only after the mode
    /// allows commits, the gateway approves, and every touched path passes
    /// the scope check. Gateway infrastructure errors fail the application;
    /// the fail-open rule is a lifecycle-transition rule and stops here.
    #[instrument(
        skip(self, trail, scope),
        fields(patch = %patch_file.display(), mode_id)
    )]
    pub async fn apply_diff_or_raise(
        &self,
        trail: &AuditTrail,
        repo_root: &Path,
        patch_file: &Path,
        scope: &PolicyAllowlist,
        mode_id: &str,
    ) -> Result<DiffValidationResult, ExecError> {
        // Step 1: the active mode must resolve. No default, no fallback.
        let mode = self.registry.resolve(mode_id)?;

        // Step 2: capability check, then gateway review.
        if !mode.allows_commit() {
            let reason = format!("mode `{mode_id}` does not allow commits");
            self.alerts.emit(
                Alert::new(AlertSeverity::Critical, reason.clone())
                    .with_mode(mode_id)
                    .with_operation("apply_diff"),
            );
            trail
                .record_error(
                    "diff_mode_violation",
                    serde_json::json!({ "mode_id": mode_id, "reason": reason }),
                )
                .await;
            return Err(ExecError::ModeViolation {
                mode_id: mode_id.to_string(),
                operation: "apply_diff".to_string(),
                reason,
            });
        }

        let decision = self
            .gateway
            .review(&GateContext::operation(mode_id, "apply_diff"))
            .await?;
        trail
            .record_decision(
                "diff_gateway_decision",
                serde_json::json!({
                    "mode_id": mode_id,
                    "verdict": decision.verdict.as_str(),
                    "reason": decision.reason,
                }),
            )
            .await;
        if !decision.is_approved() {
            self.alerts.emit(
                Alert::new(
                    AlertSeverity::Error,
                    format!("gateway {} diff application: {}", decision.verdict.as_str(), decision.reason),
                )
                .with_mode(mode_id)
                .with_operation("apply_diff"),
            );
            return Err(ExecError::ModeViolation {
                mode_id: mode_id.to_string(),
                operation: "apply_diff".to_string(),
                reason: decision.reason,
            });
        }

        // Step 3: record the scope the diff will be judged against.
        trail
            .record_info(
                "diff_scope",
                serde_json::json!({
                    "allowed": scope.paths.iter().map(|p| truncate_pattern(p)).collect::<Vec<_>>(),
                    "forbidden": scope
                        .forbidden_paths
                        .iter()
                        .map(|p| truncate_pattern(p))
                        .collect::<Vec<_>>(),
                }),
            )
            .await;

        // Steps 4 and 5: verify, record, refuse invalid diffs unapplied.
        let diff_text = tokio::fs::read_to_string(patch_file).await?;
        let validation = verify_path_scope(&diff_text, scope)?;
        trail
            .record_decision(
                "diff_validation",
                serde_json::json!({
                    "is_valid": validation.is_valid,
                    "errors": validation.errors,
                    "warnings": validation.warnings,
                    "files_touched": validation.files_touched,
                }),
            )
            .await;
        if !validation.is_valid {
            warn!(errors = ?validation.errors, "diff rejected by path scope");
            return Err(ExecError::DiffRejected { validation });
        }

        // Step 6: the one apply call against the real repository.
        self.git.apply_patch(repo_root, patch_file).await?;
        trail
            .record_info(
                "diff_applied",
                serde_json::json!({
                    "patch": patch_file.display().to_string(),
                    "files_touched": validation.files_touched,
                }),
            )
            .await;
        Ok(validation)
    }
}
