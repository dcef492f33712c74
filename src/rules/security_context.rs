//! Container security contexts

use crate::document::{Container, Document};
use crate::finding::{Finding, Severity};
use crate::rule::{apply_settings, ConfigureError, LintContext, LintError, Rule, Settings};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NAME: &str = "security-context";
const DESCRIPTION: &str = "Validates pod and container security contexts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SecurityContextConfig {
    pub require_run_as_non_root: bool,
    pub require_read_only_root_filesystem: bool,
    pub disallow_privilege_escalation: bool,
    pub required_dropped_capabilities: Vec<String>,
}

impl Default for SecurityContextConfig {
    fn default() -> Self {
        Self {
            require_run_as_non_root: true,
            require_read_only_root_filesystem: false,
            disallow_privilege_escalation: true,
            required_dropped_capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    config: SecurityContextConfig,
}

impl SecurityContext {
    fn check(&self, document: &Document, container: &Container<'_>) -> Vec<Finding> {
        let name = container.name();
        let context = container.get("securityContext");
        let flag = |key: &str| context.and_then(|c| c.get(key)).and_then(Value::as_bool);
        let finding = |severity, message: String, key: &str, suggestion: String| {
            Finding::new(NAME, severity, &message, document.resource_ref())
                .with_field(container.field(&format!("securityContext.{}", key)))
                .with_suggestion(suggestion)
        };

        let mut findings = Vec::new();

        if self.config.require_run_as_non_root && flag("runAsNonRoot") != Some(true) {
            findings.push(finding(
                Severity::Error,
                format!("Container {:?} must set runAsNonRoot to true", name),
                "runAsNonRoot",
                "Add: securityContext.runAsNonRoot: true".to_string(),
            ));
        }

        if self.config.require_read_only_root_filesystem
            && flag("readOnlyRootFilesystem") != Some(true)
        {
            findings.push(finding(
                Severity::Warning,
                format!("Container {:?} should set readOnlyRootFilesystem to true", name),
                "readOnlyRootFilesystem",
                "Add: securityContext.readOnlyRootFilesystem: true".to_string(),
            ));
        }

        // unset counts as allowed
        if self.config.disallow_privilege_escalation
            && flag("allowPrivilegeEscalation") != Some(false)
        {
            findings.push(finding(
                Severity::Error,
                format!("Container {:?} must set allowPrivilegeEscalation to false", name),
                "allowPrivilegeEscalation",
                "Add: securityContext.allowPrivilegeEscalation: false".to_string(),
            ));
        }

        if !self.config.required_dropped_capabilities.is_empty() {
            let dropped: Vec<&str> = context
                .and_then(|c| c.get("capabilities"))
                .and_then(|c| c.get("drop"))
                .and_then(Value::as_array)
                .map(|drop| drop.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            for capability in &self.config.required_dropped_capabilities {
                if dropped.contains(&capability.as_str()) {
                    continue;
                }
                findings.push(finding(
                    Severity::Warning,
                    format!("Container {:?} should drop capability {:?}", name, capability),
                    "capabilities.drop",
                    format!("Add {:?} to capabilities.drop", capability),
                ));
            }
        }

        findings
    }
}

impl Rule for SecurityContext {
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
        if !document.is_workload_or_pod() {
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        for container in document.containers()? {
            findings.extend(self.check(document, &container));
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{lint, messages, settings};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const HARDENED: &str = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: agent
spec:
  template:
    spec:
      containers:
        - name: agent
          securityContext:
            runAsNonRoot: true
            allowPrivilegeEscalation: false
            readOnlyRootFilesystem: true
            capabilities:
              drop: [ALL]
"#;

    const BARE: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: p
spec:
  containers:
    - name: app
"#;

    #[test]
    fn test_hardened_container_passes() {
        let mut rule = SecurityContext::default();
        rule.configure(&settings(json!({
            "require-read-only-root-filesystem": true,
            "required-dropped-capabilities": ["ALL"],
        })))
        .unwrap();
        assert!(lint(&rule, HARDENED).is_empty());
    }

    #[test]
    fn test_defaults_on_bare_container() {
        let findings = lint(&SecurityContext::default(), BARE);
        assert_eq!(
            messages(&findings),
            vec![
                "Container \"app\" must set runAsNonRoot to true",
                "Container \"app\" must set allowPrivilegeEscalation to false",
            ]
        );
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
        assert_eq!(
            findings[0].field.as_deref(),
            Some("spec.containers[0].securityContext.runAsNonRoot")
        );
    }

    #[test]
    fn test_optional_checks() {
        let mut rule = SecurityContext::default();
        rule.configure(&settings(json!({
            "require-run-as-non-root": false,
            "disallow-privilege-escalation": false,
            "require-read-only-root-filesystem": true,
            "required-dropped-capabilities": ["NET_RAW", "ALL"],
        })))
        .unwrap();
        let findings = lint(&rule, BARE);
        assert_eq!(
            messages(&findings),
            vec![
                "Container \"app\" should set readOnlyRootFilesystem to true",
                "Container \"app\" should drop capability \"NET_RAW\"",
                "Container \"app\" should drop capability \"ALL\"",
            ]
        );
        assert!(findings.iter().all(|f| f.severity == Severity::Warning));
        assert_eq!(findings[1].suggestion.as_deref(), Some("Add \"NET_RAW\" to capabilities.drop"));
    }

    #[test]
    fn test_explicit_escalation_is_flagged() {
        let yaml = HARDENED.replace("allowPrivilegeEscalation: false", "allowPrivilegeEscalation: true");
        let findings = lint(&SecurityContext::default(), &yaml);
        assert_eq!(
            messages(&findings),
            vec!["Container \"agent\" must set allowPrivilegeEscalation to false"]
        );
    }
}
