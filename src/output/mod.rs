//! Output formatters for findings

mod github;
mod json;
mod sarif;
mod text;
mod yaml;

pub use github::GithubActionsFormatter;
pub use json::JsonFormatter;
pub use sarif::SarifFormatter;
pub use text::TextFormatter;
pub use yaml::YamlFormatter;

use crate::config::OutputFormat;
use crate::finding::Finding;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Output formatter trait
pub trait OutputFormatter: Send + Sync {
    /// Render every finding of a run
    fn format(&self, findings: &[Finding]) -> Result<String, OutputError>;
}

/// Document shape shared by the structured formats
#[derive(Serialize)]
struct Report<'a> {
    issues: &'a [Finding],
    count: usize,
}

impl<'a> Report<'a> {
    fn new(issues: &'a [Finding]) -> Self {
        Self {
            issues,
            count: issues.len(),
        }
    }
}

/// Build the formatter for `format`
pub fn formatter(format: OutputFormat, colored: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => {
            let text = TextFormatter::new();
            Box::new(if colored { text } else { text.without_color() })
        }
        OutputFormat::Json => Box::new(JsonFormatter::new()),
        OutputFormat::Yaml => Box::new(YamlFormatter),
        OutputFormat::GithubActions => Box::new(GithubActionsFormatter),
        OutputFormat::Sarif => Box::new(SarifFormatter::default()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::finding::{Finding, ResourceRef, Severity};

    pub fn findings() -> Vec<Finding> {
        vec![
            Finding::new(
                "resource-limits",
                Severity::Error,
                "Container \"app\" missing CPU limit",
                ResourceRef::new("apps/v1", "Deployment", "prod", "web"),
            )
            .with_field("spec.template.spec.containers[0].resources.limits.cpu")
            .with_suggestion("Add: resources.limits.cpu: \"1000m\""),
            Finding::new(
                "required-labels",
                Severity::Warning,
                "Missing required label \"team\"",
                ResourceRef::new("rbac.authorization.k8s.io/v1", "ClusterRole", "", "reader"),
            ),
        ]
    }
}
