//! The `jq` rule kind: checks written as jq expressions
//!
//! ```yaml
//! linters:
//!   custom:
//!     - name: configmap-exists
//!       type: jq
//!       settings:
//!         rules:
//!           - expression: >
//!               [.spec.template.spec.volumes[]?.configMap.name // empty]
//!               | any(. as $ref | $objects | any(.[]; .kind == "ConfigMap" and .metadata.name == $ref) | not)
//!             message: Referenced ConfigMap does not exist
//!             severity: error
//! ```
//!
//! Each entry is a predicate. The first truthy output of an expression emits
//! one finding carrying that entry's message, severity, field and suggestion.

use crate::document::Document;
use crate::expr::{self, Program};
use crate::finding::{Finding, Severity};
use crate::rule::{ConfigureError, LintContext, LintError, Rule, RuleFactory, Settings};
use serde::Deserialize;
use serde_json::Value;

/// Rule kind name used in custom rule declarations
pub const KIND: &str = "jq";

const DEFAULT_NAME: &str = "jq";
const DEFAULT_DESCRIPTION: &str = "Evaluates custom jq expressions against Kubernetes resources";

/// One declared check
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JqEntry {
    pub expression: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

#[derive(Clone)]
struct CompiledEntry {
    entry: JqEntry,
    program: Program,
}

#[derive(Clone)]
pub struct JqRule {
    name: String,
    description: String,
    entries: Vec<CompiledEntry>,
}

impl JqRule {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            entries: Vec::new(),
        }
    }

    /// The instance registered as `jq`, with no checks until configured
    pub fn default_instance() -> Self {
        Self::new(DEFAULT_NAME, DEFAULT_DESCRIPTION)
    }

    pub fn entries(&self) -> impl Iterator<Item = &JqEntry> {
        self.entries.iter().map(|c| &c.entry)
    }
}

fn parse_entries(settings: &Settings) -> Result<Vec<CompiledEntry>, ConfigureError> {
    let rules = settings.get("rules").ok_or(ConfigureError::Missing("rules"))?;
    let Value::Array(rules) = rules else {
        return Err(ConfigureError::InvalidValue {
            key: "rules".to_string(),
            message: "must be an array".to_string(),
        });
    };

    let mut entries = Vec::with_capacity(rules.len());
    for (index, raw) in rules.iter().enumerate() {
        let entry = JqEntry::deserialize(raw).map_err(|e| ConfigureError::InvalidValue {
            key: format!("rules[{}]", index),
            message: e.to_string(),
        })?;
        let program = expr::compile(&entry.expression)
            .map_err(|source| ConfigureError::Expression { index, source })?;
        entries.push(CompiledEntry { entry, program });
    }
    Ok(entries)
}

impl Rule for JqRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    /// Replaces the whole list of checks. Every expression is compiled here,
    /// so a malformed one fails the run before any document is evaluated.
    fn configure(&mut self, settings: &Settings) -> Result<(), ConfigureError> {
        if let Some(unknown) = settings.keys().find(|k| k.as_str() != "rules") {
            return Err(ConfigureError::InvalidValue {
                key: unknown.clone(),
                message: "unknown setting".to_string(),
            });
        }
        self.entries = parse_entries(settings)?;
        Ok(())
    }

    fn lint(&self, document: &Document, context: &LintContext<'_>) -> Result<Vec<Finding>, LintError> {
        let mut findings = Vec::new();
        for (index, compiled) in self.entries.iter().enumerate() {
            let fired = compiled
                .program
                .evaluate(document.value(), context.values())
                .map_err(|source| LintError::Expression {
                    index,
                    expression: compiled.entry.expression.clone(),
                    source,
                })?;
            if fired.is_none() {
                continue;
            }

            let entry = &compiled.entry;
            let mut finding =
                Finding::new(&self.name, entry.severity, &entry.message, document.resource_ref());
            if let Some(field) = &entry.field {
                finding = finding.with_field(field.as_str());
            }
            if let Some(suggestion) = &entry.suggestion {
                finding = finding.with_suggestion(suggestion.as_str());
            }
            findings.push(finding);
        }
        Ok(findings)
    }
}

/// Builds [`JqRule`]s for `type: jq` custom declarations
pub struct JqFactory;

impl RuleFactory for JqFactory {
    fn create(&self, name: &str, description: &str) -> Box<dyn Rule> {
        Box::new(JqRule::new(name, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprError;
    use crate::rules::testing::{doc, settings};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: prod
spec:
  replicas: 1
  template:
    spec:
      volumes:
        - name: config
          configMap:
            name: cfg-a
      containers:
        - name: app
          image: nginx:latest
"#;

    const CONFIGMAP: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg-a
  namespace: prod
"#;

    fn configured(rules: serde_json::Value) -> JqRule {
        let mut rule = JqRule::new("custom", "custom checks");
        rule.configure(&settings(json!({ "rules": rules }))).unwrap();
        rule
    }

    fn run(rule: &JqRule, yamls: &[&str]) -> Vec<Finding> {
        let docs: Vec<Document> = yamls.iter().map(|y| doc(y)).collect();
        let context = LintContext::new(&docs);
        let mut findings = Vec::new();
        for document in &docs {
            findings.extend(rule.lint(document, &context).unwrap());
        }
        findings
    }

    #[test]
    fn test_truthy_result_fires_once() {
        let rule = configured(json!([{
            "expression": ".spec.template.spec.containers[] | .image | endswith(\":latest\")",
            "message": "latest tag",
            "severity": "warning",
            "field": "spec.template.spec.containers",
            "suggestion": "pin the tag",
        }]));
        let findings = run(&rule, &[DEPLOYMENT]);
        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.rule, "custom");
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.message, "latest tag");
        assert_eq!(finding.field.as_deref(), Some("spec.template.spec.containers"));
        assert_eq!(finding.suggestion.as_deref(), Some("pin the tag"));
        assert_eq!(finding.resource.to_string(), "prod/Deployment/web");
    }

    #[test]
    fn test_multiple_matches_emit_one_finding() {
        let rule = configured(json!([{
            "expression": ".. | strings",
            "message": "has strings",
        }]));
        assert_eq!(run(&rule, &[DEPLOYMENT]).len(), 1);
    }

    #[test]
    fn test_null_and_false_never_fire() {
        let rule = configured(json!([
            {"expression": ".spec.missing", "message": "null"},
            {"expression": "false", "message": "false"},
            {"expression": "empty", "message": "empty"},
        ]));
        assert!(run(&rule, &[DEPLOYMENT, CONFIGMAP]).is_empty());
    }

    #[test]
    fn test_default_severity_is_error() {
        let rule = configured(json!([{"expression": "true", "message": "always"}]));
        assert_eq!(run(&rule, &[CONFIGMAP])[0].severity, Severity::Error);
    }

    #[test]
    fn test_cross_document_reference() {
        let rule = configured(json!([{
            "expression": r#"
                .kind == "Deployment" and
                ([.spec.template.spec.volumes[]?.configMap.name // empty]
                 | any(. as $ref | $objects | any(.[]; .kind == "ConfigMap" and .metadata.name == $ref) | not))
            "#,
            "message": "Referenced ConfigMap does not exist",
        }]));

        let findings = run(&rule, &[DEPLOYMENT]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].resource.kind, "Deployment");

        assert!(run(&rule, &[DEPLOYMENT, CONFIGMAP]).is_empty());
    }

    #[test]
    fn test_runtime_error_names_the_entry() {
        let rule = configured(json!([
            {"expression": "false", "message": "ok"},
            {"expression": ".metadata.name + 1", "message": "broken"},
        ]));
        let docs = vec![doc(CONFIGMAP)];
        let context = LintContext::new(&docs);
        let err = rule.lint(&docs[0], &context).unwrap_err();
        match err {
            LintError::Expression {
                index,
                expression,
                source,
            } => {
                assert_eq!(index, 1);
                assert_eq!(expression, ".metadata.name + 1");
                assert!(matches!(source, ExprError::Type(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_configure_errors() {
        let mut rule = JqRule::default_instance();
        assert!(matches!(
            rule.configure(&settings(json!({}))),
            Err(ConfigureError::Missing("rules"))
        ));
        assert!(matches!(
            rule.configure(&settings(json!({"rules": "nope"}))),
            Err(ConfigureError::InvalidValue { .. })
        ));
        assert!(matches!(
            rule.configure(&settings(json!({"rules": [{"expression": "."}]}))),
            Err(ConfigureError::InvalidValue { .. })
        ));
        assert!(matches!(
            rule.configure(&settings(json!({"rules": [], "extra": 1}))),
            Err(ConfigureError::InvalidValue { .. })
        ));

        let err = rule
            .configure(&settings(json!({"rules": [
                {"expression": ".", "message": "fine"},
                {"expression": ".a |", "message": "broken"},
            ]})))
            .unwrap_err();
        assert!(matches!(err, ConfigureError::Expression { index: 1, .. }));
        assert!(err.to_string().starts_with("rules[1]: syntax error"));
    }

    #[test]
    fn test_reconfigure_replaces_entries() {
        let mut rule = configured(json!([{"expression": "true", "message": "a"}]));
        rule.configure(&settings(json!({"rules": [
            {"expression": "true", "message": "b"},
            {"expression": "true", "message": "c"},
        ]})))
        .unwrap();
        let messages: Vec<_> = rule.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["b", "c"]);
    }

    #[test]
    fn test_factory() {
        let rule = JqFactory.create("no-default-namespace", "desc");
        assert_eq!(rule.name(), "no-default-namespace");
        assert_eq!(rule.description(), "desc");
        assert!(run_boxed(rule.as_ref()).is_empty());
    }

    fn run_boxed(rule: &dyn Rule) -> Vec<Finding> {
        let docs = vec![doc(CONFIGMAP)];
        let context = LintContext::new(&docs);
        rule.lint(&docs[0], &context).unwrap()
    }
}
