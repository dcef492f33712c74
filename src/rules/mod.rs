//! Built-in rules
//!
//! Every built-in rule is listed in [`builtin_rules`]; [`register_builtins`]
//! seeds a registry with them and with the `jq` rule kind factory.

pub mod cluster_role_binding_security;
pub mod health_probes;
pub mod image_tags;
pub mod jq;
pub mod required_labels;
pub mod resource_limits;
pub mod security_context;

pub use cluster_role_binding_security::ClusterRoleBindingSecurity;
pub use health_probes::HealthProbes;
pub use image_tags::ImageTags;
pub use jq::{JqFactory, JqRule};
pub use required_labels::RequiredLabels;
pub use resource_limits::ResourceLimits;
pub use security_context::SecurityContext;

use crate::registry::Registry;
use crate::rule::Rule;

/// Get all built-in rules, freshly constructed with their defaults
pub fn builtin_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ClusterRoleBindingSecurity::default()),
        Box::new(HealthProbes::default()),
        Box::new(ImageTags::default()),
        Box::new(JqRule::default_instance()),
        Box::new(RequiredLabels::default()),
        Box::new(ResourceLimits::default()),
        Box::new(SecurityContext::default()),
    ]
}

/// Register every built-in rule and rule kind
pub fn register_builtins(registry: &mut Registry) {
    for rule in builtin_rules() {
        registry.register(rule);
    }
    registry.register_factory(jq::KIND, Box::new(JqFactory));
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::document::Document;
    use crate::finding::Finding;
    use crate::rule::{LintContext, Rule, Settings};
    use serde_json::Value;

    pub fn doc(yaml: &str) -> Document {
        Document::from_yaml(yaml).unwrap()
    }

    pub fn lint(rule: &dyn Rule, yaml: &str) -> Vec<Finding> {
        let docs = vec![doc(yaml)];
        let context = LintContext::new(&docs);
        rule.lint(&docs[0], &context).unwrap()
    }

    pub fn settings(value: Value) -> Settings {
        value.as_object().cloned().unwrap()
    }

    pub fn messages(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.message.as_str()).collect()
    }
}
