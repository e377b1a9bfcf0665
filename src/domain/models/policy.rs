//! Sandbox policy model.
//!
//! A policy arrives from outside the core as JSON or YAML. It carries an
//! operation allow-list consulted per operation, and a path allow-list
//! consulted at bring-back time. The path allow-list historically shipped in
//! several shapes; `PolicyAllowlist::normalize` is the one adapter that
//! collapses them all, so nothing downstream ever inspects raw values.

use serde::{Deserialize, Serialize};

use crate::domain::error::ExecError;

/// Concrete path scope for bring-back verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyAllowlist {
    /// Glob patterns a diff may touch
    #[serde(default)]
    pub paths: Vec<String>,
    /// Glob patterns a diff must never touch; deny wins over allow
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
}

impl PolicyAllowlist {
    /// Collapse any accepted allow-list shape into the concrete form.
    ///
    /// Accepted shapes:
    /// - plain mapping: `{"paths": [...], "forbidden_paths": [...]}`
    /// - versioned object: `{"schema_version": ..., "allowed_paths": [...],
    ///   "forbidden_paths": [...]}`
    ///
    /// Anything else is a malformed policy, not an empty scope.
    pub fn normalize(value: &serde_json::Value) -> Result<Self, ExecError> {
        let obj = value.as_object().ok_or_else(|| ExecError::PolicyInvalid {
            reason: format!("allowlist must be an object, got {value}"),
        })?;

        let list_field = |key: &str| -> Result<Vec<String>, ExecError> {
            match obj.get(key) {
                None => Ok(Vec::new()),
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_owned).ok_or_else(|| {
                            ExecError::PolicyInvalid {
                                reason: format!("allowlist `{key}` entries must be strings"),
                            }
                        })
                    })
                    .collect(),
                Some(other) => Err(ExecError::PolicyInvalid {
                    reason: format!("allowlist `{key}` must be an array, got {other}"),
                }),
            }
        };

        if obj.contains_key("paths") {
            return Ok(Self {
                paths: list_field("paths")?,
                forbidden_paths: list_field("forbidden_paths")?,
            });
        }
        if obj.contains_key("allowed_paths") {
            return Ok(Self {
                paths: list_field("allowed_paths")?,
                forbidden_paths: list_field("forbidden_paths")?,
            });
        }

        Err(ExecError::PolicyInvalid {
            reason: "allowlist has neither `paths` nor `allowed_paths`".to_string(),
        })
    }
}

/// One entry in the operation allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRule {
    /// Action this rule permits
    pub action: String,
    /// Stable id surfaced in denial errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Exact-match constraints on operation params; absent means any params
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl OperationRule {
    /// Whether this rule's param constraints hold for `params`.
    fn params_match(&self, params: &serde_json::Value) -> bool {
        match &self.params {
            None => true,
            Some(constraints) => constraints.as_object().is_some_and(|wanted| {
                wanted
                    .iter()
                    .all(|(key, expected)| params.get(key) == Some(expected))
            }),
        }
    }
}

/// External execution policy, loaded from JSON or YAML.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SandboxPolicy {
    pub policy_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Operations the policy permits; empty means nothing is permitted
    pub allowed_operations: Vec<OperationRule>,
    /// Normalized path scope for bring-back
    pub allowlist: PolicyAllowlist,
}

/// Wire shape before allowlist normalization.
#[derive(Debug, Deserialize)]
struct RawSandboxPolicy {
    policy_id: String,
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    allowed_operations: Vec<OperationRule>,
    #[serde(default)]
    allowlist: serde_json::Value,
}

impl SandboxPolicy {
    /// Parse a policy document. JSON is tried first, then YAML.
    pub fn parse(text: &str) -> Result<Self, ExecError> {
        let raw: RawSandboxPolicy = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(json_err) => {
                serde_yaml::from_str(text).map_err(|yaml_err| ExecError::PolicyInvalid {
                    reason: format!("not valid JSON ({json_err}) nor YAML ({yaml_err})"),
                })?
            }
        };
        Self::from_raw(raw)
    }

    /// Build from an already-deserialized JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ExecError> {
        let raw: RawSandboxPolicy =
            serde_json::from_value(value).map_err(|e| ExecError::PolicyInvalid {
                reason: format!("malformed policy: {e}"),
            })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSandboxPolicy) -> Result<Self, ExecError> {
        let allowlist = PolicyAllowlist::normalize(&raw.allowlist)?;
        Ok(Self {
            policy_id: raw.policy_id,
            schema_version: raw.schema_version,
            allowed_operations: raw.allowed_operations,
            allowlist,
        })
    }

    /// Fail unless the operation allow-list permits `action` with `params`.
    ///
    /// Denials carry the denying rule id when one rule matched the action
    /// but its param constraints refused the call.
    pub fn assert_operation_allowed(
        &self,
        action: &str,
        params: &serde_json::Value,
    ) -> Result<(), ExecError> {
        let rules: Vec<&OperationRule> = self
            .allowed_operations
            .iter()
            .filter(|rule| rule.action == action)
            .collect();

        if rules.is_empty() {
            return Err(ExecError::PolicyDenied {
                operation: action.to_string(),
                reason: format!("action `{action}` is not in the policy allow-list"),
                rule_id: None,
            });
        }

        if rules.iter().any(|rule| rule.params_match(params)) {
            return Ok(());
        }

        Err(ExecError::PolicyDenied {
            operation: action.to_string(),
            reason: format!("params for `{action}` violate rule constraints"),
            rule_id: rules[0].rule_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with_rules(rules: Vec<OperationRule>) -> SandboxPolicy {
        SandboxPolicy {
            policy_id: "test".into(),
            schema_version: None,
            allowed_operations: rules,
            allowlist: PolicyAllowlist::default(),
        }
    }

    #[test]
    fn test_normalize_plain_mapping() {
        let value = serde_json::json!({
            "paths": ["src/**"],
            "forbidden_paths": ["secrets/**"],
        });
        let allowlist = PolicyAllowlist::normalize(&value).unwrap();
        assert_eq!(allowlist.paths, vec!["src/**"]);
        assert_eq!(allowlist.forbidden_paths, vec!["secrets/**"]);
    }

    #[test]
    fn test_normalize_versioned_object() {
        let value = serde_json::json!({
            "schema_version": 2,
            "allowed_paths": ["docs/**", "src/**"],
        });
        let allowlist = PolicyAllowlist::normalize(&value).unwrap();
        assert_eq!(allowlist.paths.len(), 2);
        assert!(allowlist.forbidden_paths.is_empty());
    }

    #[test]
    fn test_normalize_rejects_unknown_shape() {
        assert!(PolicyAllowlist::normalize(&serde_json::json!({})).is_err());
        assert!(PolicyAllowlist::normalize(&serde_json::json!(null)).is_err());
        assert!(PolicyAllowlist::normalize(&serde_json::json!({"paths": "src"})).is_err());
        assert!(PolicyAllowlist::normalize(&serde_json::json!({"paths": [1, 2]})).is_err());
    }

    #[test]
    fn test_parse_json_policy() {
        let text = r#"{
            "policy_id": "default",
            "allowed_operations": [{"action": "write_file"}],
            "allowlist": {"paths": ["src/**"]}
        }"#;
        let policy = SandboxPolicy::parse(text).unwrap();
        assert_eq!(policy.policy_id, "default");
        assert!(policy.assert_operation_allowed("write_file", &serde_json::json!({})).is_ok());
    }

    #[test]
    fn test_parse_yaml_policy() {
        let text = "
policy_id: default
schema_version: '1'
allowed_operations:
  - action: git_commit
    rule_id: vcs.commit
allowlist:
  allowed_paths:
    - 'src/**'
";
        let policy = SandboxPolicy::parse(text).unwrap();
        assert_eq!(policy.schema_version.as_deref(), Some("1"));
        assert_eq!(policy.allowlist.paths, vec!["src/**"]);
    }

    #[test]
    fn test_unlisted_action_denied() {
        let policy = policy_with_rules(vec![OperationRule {
            action: "write_file".into(),
            rule_id: None,
            params: None,
        }]);
        let err = policy
            .assert_operation_allowed("git_commit", &serde_json::json!({}))
            .unwrap_err();
        match err {
            ExecError::PolicyDenied { operation, rule_id, .. } => {
                assert_eq!(operation, "git_commit");
                assert!(rule_id.is_none());
            }
            other => panic!("expected PolicyDenied, got {other:?}"),
        }
    }

    #[test]
    fn test_param_constraints_enforced() {
        let policy = policy_with_rules(vec![OperationRule {
            action: "write_file".into(),
            rule_id: Some("fs.docs_only".into()),
            params: Some(serde_json::json!({"path": "docs/README.md"})),
        }]);

        assert!(policy
            .assert_operation_allowed(
                "write_file",
                &serde_json::json!({"path": "docs/README.md", "content": "x"}),
            )
            .is_ok());

        let err = policy
            .assert_operation_allowed("write_file", &serde_json::json!({"path": "src/main.rs"}))
            .unwrap_err();
        match err {
            ExecError::PolicyDenied { rule_id, .. } => {
                assert_eq!(rule_id.as_deref(), Some("fs.docs_only"));
            }
            other => panic!("expected PolicyDenied, got {other:?}"),
        }
    }

    #[test]
    fn test_any_matching_rule_allows() {
        let policy = policy_with_rules(vec![
            OperationRule {
                action: "mkdir".into(),
                rule_id: Some("fs.docs".into()),
                params: Some(serde_json::json!({"path": "docs"})),
            },
            OperationRule {
                action: "mkdir".into(),
                rule_id: Some("fs.any".into()),
                params: None,
            },
        ]);
        assert!(policy
            .assert_operation_allowed("mkdir", &serde_json::json!({"path": "src"}))
            .is_ok());
    }
}
