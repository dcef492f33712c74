//! Finding types produced by rules

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Severity level for findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,
    /// Warning - potential issue
    Warning,
    /// Error - definite problem
    #[default]
    Error,
    /// Fatal - must never be deployed
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "notice" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            "fatal" | "critical" => Ok(Severity::Fatal),
            other => Err(format!("Unknown severity: {}", other)),
        }
    }
}

/// Identity of the resource a finding points at
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceRef {
    /// `namespace/Kind/name`, or `Kind/name` for cluster-scoped resources
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
        }
    }
}

/// One reported issue, produced by a rule against a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Severity level
    pub severity: Severity,
    /// Name of the rule that produced this finding
    pub rule: String,
    /// Human-readable message
    pub message: String,
    /// The offending resource
    pub resource: ResourceRef,
    /// Dotted path of the offending field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// How to fix it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    /// Create a new finding
    pub fn new(rule: &str, severity: Severity, message: &str, resource: ResourceRef) -> Self {
        Self {
            severity,
            rule: rule.to_string(),
            message: message.to_string(),
            resource,
            field: None,
            suggestion: None,
        }
    }

    /// Attach the offending field path
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.field = if field.is_empty() { None } else { Some(field) };
        self
    }

    /// Attach a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        self.suggestion = if suggestion.is_empty() {
            None
        } else {
            Some(suggestion)
        };
        self
    }

    /// Ordering used for the final, output-stable list:
    /// kind, then name, then namespace, then rule name
    pub fn report_order(&self, other: &Self) -> Ordering {
        self.resource
            .kind
            .cmp(&other.resource.kind)
            .then_with(|| self.resource.name.cmp(&other.resource.name))
            .then_with(|| self.resource.namespace.cmp(&other.resource.namespace))
            .then_with(|| self.rule.cmp(&other.rule))
    }
}

/// Counts of findings by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub fatal: usize,
    pub error: usize,
    pub warning: usize,
    pub info: usize,
}

impl Summary {
    /// Count the findings of a run
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Fatal => summary.fatal += 1,
                Severity::Error => summary.error += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.fatal + self.error + self.warning + self.info
    }

    /// Check if the run produced anything that blocks a deployment
    pub fn has_blocking(&self, fail_on_warning: bool) -> bool {
        self.fatal > 0 || self.error > 0 || (fail_on_warning && self.warning > 0)
    }

    /// Get exit code (0 = clean, 2 = fatal, 1 = errors, 4 = warnings in strict mode)
    pub fn exit_code(&self, fail_on_warning: bool) -> i32 {
        if self.fatal > 0 {
            2
        } else if self.error > 0 {
            1
        } else if fail_on_warning && self.warning > 0 {
            4
        } else {
            0
        }
    }
}
