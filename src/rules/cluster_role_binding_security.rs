//! ClusterRoleBindings must not grant roles to overly broad groups

use crate::document::{type_name, Document, DocumentError};
use crate::finding::{Finding, Severity};
use crate::rule::{apply_settings, ConfigureError, LintContext, LintError, Rule, Settings};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NAME: &str = "cluster-role-binding-security";
const DESCRIPTION: &str = "Validates ClusterRoleBindings for overly permissive group assignments";

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const SERVICE_ACCOUNTS_PREFIX: &str = "system:serviceaccounts:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClusterRoleBindingSecurityConfig {
    pub disallowed_groups: Vec<String>,
    pub warn_namespace_groups: bool,
    /// Roles that only earn a warning when bound to a disallowed group
    pub allowed_roles_for_broad_groups: Vec<String>,
    /// Roles that turn a namespace-wide binding into an error
    pub critical_roles: Vec<String>,
}

impl Default for ClusterRoleBindingSecurityConfig {
    fn default() -> Self {
        Self {
            disallowed_groups: vec![
                "system:authenticated".to_string(),
                "system:unauthenticated".to_string(),
                "system:serviceaccounts".to_string(),
            ],
            warn_namespace_groups: true,
            allowed_roles_for_broad_groups: Vec::new(),
            critical_roles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterRoleBindingSecurity {
    config: ClusterRoleBindingSecurityConfig,
}

/// Names of the `Group` subjects of a binding
fn group_subjects(document: &Document) -> Result<Vec<&str>, LintError> {
    let subjects = match document.lookup("subjects")? {
        None => return Ok(Vec::new()),
        Some(Value::Array(subjects)) => subjects,
        Some(other) => {
            return Err(DocumentError::UnexpectedShape {
                kind: document.kind().to_string(),
                name: document.name().to_string(),
                path: "subjects".to_string(),
                expected: "array",
                found: type_name(other),
            }
            .into())
        }
    };

    Ok(subjects
        .iter()
        .filter(|s| s.get("kind").and_then(Value::as_str) == Some("Group"))
        .filter_map(|s| s.get("name").and_then(Value::as_str))
        .collect())
}

impl Rule for ClusterRoleBindingSecurity {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn configure(&mut self, settings: &Settings) -> Result<(), ConfigureError> {
        self.config = apply_settings(&self.config, settings)?;
        Ok(())
    }

    fn lint(&self, document: &Document, _context: &LintContext<'_>) -> Result<Vec<Finding>, LintError> {
        if !document.is(RBAC_GROUP, "ClusterRoleBinding") {
            return Ok(Vec::new());
        }

        let role = document
            .lookup("roleRef.name")?
            .and_then(Value::as_str)
            .unwrap_or("");
        let finding = |severity, message: String, suggestion: &str| {
            Finding::new(NAME, severity, &message, document.resource_ref())
                .with_field("subjects")
                .with_suggestion(suggestion)
        };

        let mut findings = Vec::new();
        for group in group_subjects(document)? {
            if self.config.disallowed_groups.iter().any(|g| g == group) {
                let allowed = self.config.allowed_roles_for_broad_groups.iter().any(|r| r == role);
                findings.push(finding(
                    if allowed { Severity::Warning } else { Severity::Error },
                    format!("Binds to dangerous group {:?} (role: {})", group, role),
                    "Use specific ServiceAccounts or Users instead of broad groups",
                ));
            }

            if !self.config.warn_namespace_groups {
                continue;
            }
            if let Some(namespace) = group.strip_prefix(SERVICE_ACCOUNTS_PREFIX) {
                let critical = self.config.critical_roles.iter().any(|r| r == role);
                findings.push(finding(
                    if critical { Severity::Error } else { Severity::Warning },
                    format!(
                        "Binds to all ServiceAccounts in namespace {:?} (role: {})",
                        namespace, role
                    ),
                    "Use specific ServiceAccount instead of namespace-wide group",
                ));
            }
        }
        Ok(findings)
    }
}
