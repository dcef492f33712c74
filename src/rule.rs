//! Rule and rule-factory interfaces

use crate::document::{Document, DocumentError, PathError};
use crate::expr::ExprError;
use crate::finding::Finding;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// A per-rule settings block, as found under `linters.settings.<name>`
pub type Settings = serde_json::Map<String, Value>;

/// Errors raised by [`Rule::configure`]
#[derive(Error, Debug)]
pub enum ConfigureError {
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("rules[{index}]: {source}")]
    Expression {
        index: usize,
        #[source]
        source: ExprError,
    },
}

/// Errors raised while a rule evaluates one document
#[derive(Error, Debug)]
pub enum LintError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("rules[{index}] `{expression}`: {source}")]
    Expression {
        index: usize,
        expression: String,
        #[source]
        source: ExprError,
    },
}

/// A named, configurable unit of validation logic.
///
/// `configure` takes `&mut self` and `lint` takes `&self`: the engine
/// finishes configuring every rule before it shares them across worker
/// threads, so configuration is frozen for the whole evaluation.
pub trait Rule: Send + Sync + RuleClone {
    /// Unique name, used for selection and in findings
    fn name(&self) -> &str;

    /// One-line description for listings
    fn description(&self) -> &str;

    /// Overlay a settings block onto the current configuration.
    ///
    /// Keys absent from `settings` keep whatever value they already had,
    /// including values set by an earlier run.
    fn configure(&mut self, settings: &Settings) -> Result<(), ConfigureError>;

    /// Evaluate one document. Documents the rule does not apply to yield
    /// an empty list.
    fn lint(&self, document: &Document, context: &LintContext<'_>)
        -> Result<Vec<Finding>, LintError>;
}

/// Boxed copies of rules, so setup can configure a copy and commit it
/// only once every step has succeeded
pub trait RuleClone {
    fn clone_box(&self) -> Box<dyn Rule>;
}

impl<T> RuleClone for T
where
    T: Rule + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Rule> {
        Box::new(self.clone())
    }
}

/// Creates rules of a parameterized kind (e.g. `jq`)
pub trait RuleFactory: Send + Sync {
    fn create(&self, name: &str, description: &str) -> Box<dyn Rule>;
}

/// Read-only view of every document in the run, shared by all units
pub struct LintContext<'a> {
    documents: &'a [Document],
    values: OnceLock<Value>,
}

impl<'a> LintContext<'a> {
    pub fn new(documents: &'a [Document]) -> Self {
        Self {
            documents,
            values: OnceLock::new(),
        }
    }

    pub fn documents(&self) -> &'a [Document] {
        self.documents
    }

    /// All documents as one JSON array, built on first use
    pub fn values(&self) -> &Value {
        self.values.get_or_init(|| {
            Value::Array(self.documents.iter().map(|d| d.value().clone()).collect())
        })
    }

    /// Find a document by kind, name and namespace
    pub fn find(&self, kind: &str, name: &str, namespace: &str) -> Option<&'a Document> {
        self.documents
            .iter()
            .find(|d| d.kind() == kind && d.name() == name && d.namespace() == namespace)
    }
}

/// Overlay `settings` onto `current` and return the merged configuration.
///
/// The current configuration is serialized, the keys present in `settings`
/// replace their counterparts, and the result is deserialized again. Target
/// types use `deny_unknown_fields`, so a misspelled key is reported.
pub fn apply_settings<T>(current: &T, settings: &Settings) -> Result<T, ConfigureError>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(current)?;
    if let Value::Object(map) = &mut merged {
        for (key, value) in settings {
            map.insert(key.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(merged)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case", deny_unknown_fields)]
    struct Sample {
        require_limit: bool,
        exclude_namespaces: Vec<String>,
    }

    fn settings(value: Value) -> Settings {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_apply_settings_overlays_present_keys() {
        let current = Sample {
            require_limit: true,
            exclude_namespaces: vec!["kube-system".to_string()],
        };
        let merged = apply_settings(&current, &settings(json!({"require-limit": false}))).unwrap();
        assert!(!merged.require_limit);
        assert_eq!(merged.exclude_namespaces, vec!["kube-system"]);
    }

    #[test]
    fn test_apply_settings_keeps_previous_values() {
        let first = apply_settings(
            &Sample {
                require_limit: true,
                exclude_namespaces: vec![],
            },
            &settings(json!({"exclude-namespaces": ["dev"]})),
        )
        .unwrap();
        let second = apply_settings(&first, &settings(json!({"require-limit": false}))).unwrap();
        assert_eq!(second.exclude_namespaces, vec!["dev"]);
    }

    #[test]
    fn test_apply_settings_rejects_unknown_key() {
        let current = Sample {
            require_limit: true,
            exclude_namespaces: vec![],
        };
        let err = apply_settings(&current, &settings(json!({"requre-limit": false}))).unwrap_err();
        assert!(err.to_string().contains("requre-limit"));
    }

    #[test]
    fn test_apply_settings_rejects_wrong_type() {
        let current = Sample {
            require_limit: true,
            exclude_namespaces: vec![],
        };
        assert!(apply_settings(&current, &settings(json!({"require-limit": "yes"}))).is_err());
    }

    #[test]
    fn test_context_lookup() {
        let docs = vec![
            Document::from_value(json!({
                "apiVersion": "v1", "kind": "ConfigMap",
                "metadata": {"name": "cfg-a", "namespace": "default"}
            }))
            .unwrap(),
            Document::from_value(json!({
                "apiVersion": "v1", "kind": "Secret",
                "metadata": {"name": "cfg-a", "namespace": "default"}
            }))
            .unwrap(),
        ];
        let ctx = LintContext::new(&docs);
        assert_eq!(ctx.documents().len(), 2);
        assert_eq!(ctx.find("Secret", "cfg-a", "default").map(|d| d.kind()), Some("Secret"));
        assert!(ctx.find("ConfigMap", "cfg-b", "default").is_none());
        assert_eq!(ctx.values().as_array().map(Vec::len), Some(2));
    }
}
