//! Containers must declare resource requests and limits

use crate::document::{Container, Document};
use crate::finding::{Finding, Severity};
use crate::rule::{apply_settings, ConfigureError, LintContext, LintError, Rule, Settings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NAME: &str = "resource-limits";
const DESCRIPTION: &str = "Ensures containers have resource requests and limits defined";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResourceLimitsConfig {
    pub require_cpu_limit: bool,
    pub require_memory_limit: bool,
    pub require_cpu_request: bool,
    pub require_memory_request: bool,
    pub exclude_namespaces: Vec<String>,
}

impl Default for ResourceLimitsConfig {
    fn default() -> Self {
        Self {
            require_cpu_limit: true,
            require_memory_limit: true,
            require_cpu_request: true,
            require_memory_request: true,
            exclude_namespaces: Vec::new(),
        }
    }
}

/// A field the `resources` block must carry
struct Requirement {
    section: &'static str,
    resource: &'static str,
    label: &'static str,
    example: &'static str,
    /// Whether the configuration asks for this field
    enabled: fn(&ResourceLimitsConfig) -> bool,
}

const REQUIREMENTS: [Requirement; 4] = [
    Requirement {
        section: "limits",
        resource: "cpu",
        label: "CPU limit",
        example: "1000m",
        enabled: |c| c.require_cpu_limit,
    },
    Requirement {
        section: "limits",
        resource: "memory",
        label: "memory limit",
        example: "512Mi",
        enabled: |c| c.require_memory_limit,
    },
    Requirement {
        section: "requests",
        resource: "cpu",
        label: "CPU request",
        example: "100m",
        enabled: |c| c.require_cpu_request,
    },
    Requirement {
        section: "requests",
        resource: "memory",
        label: "memory request",
        example: "256Mi",
        enabled: |c| c.require_memory_request,
    },
];

#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    config: ResourceLimitsConfig,
}

impl ResourceLimits {
    pub fn config(&self) -> &ResourceLimitsConfig {
        &self.config
    }

    fn check(&self, document: &Document, container: &Container<'_>, findings: &mut Vec<Finding>) {
        let name = container.name();
        let resources = container
            .get("resources")
            .and_then(Value::as_object)
            .filter(|r| !r.is_empty());

        let Some(resources) = resources else {
            findings.push(
                Finding::new(
                    NAME,
                    Severity::Error,
                    &format!("Container {:?} has no resource requirements", name),
                    document.resource_ref(),
                )
                .with_field(container.field("resources"))
                .with_suggestion("Add resources.requests and resources.limits"),
            );
            return;
        };

        for requirement in REQUIREMENTS.iter().filter(|r| (r.enabled)(&self.config)) {
            if section_has(resources, requirement.section, requirement.resource) {
                continue;
            }
            let path = format!("resources.{}.{}", requirement.section, requirement.resource);
            findings.push(
                Finding::new(
                    NAME,
                    Severity::Error,
                    &format!("Container {:?} missing {}", name, requirement.label),
                    document.resource_ref(),
                )
                .with_field(container.field(&path))
                .with_suggestion(format!("Add: {}: \"{}\"", path, requirement.example)),
            );
        }
    }
}

fn section_has(resources: &Map<String, Value>, section: &str, resource: &str) -> bool {
    resources
        .get(section)
        .and_then(Value::as_object)
        .is_some_and(|s| s.contains_key(resource))
}

impl Rule for ResourceLimits {
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
        if !document.is_workload() {
            return Ok(Vec::new());
        }
        if self.config.exclude_namespaces.iter().any(|ns| ns == document.namespace()) {
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        for container in document.containers()? {
            self.check(document, &container, &mut findings);
        }
        Ok(findings)
    }
}
