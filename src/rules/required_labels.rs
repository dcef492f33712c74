//! Resources must carry a configured set of labels

use crate::document::Document;
use crate::finding::{Finding, Severity};
use crate::rule::{apply_settings, ConfigureError, LintContext, LintError, Rule, Settings};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "required-labels";
const DESCRIPTION: &str = "Ensures resources have required labels";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RequiredLabelsConfig {
    pub labels: Vec<String>,
    pub exclude_kinds: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequiredLabels {
    config: RequiredLabelsConfig,
}

impl Rule for RequiredLabels {
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
        if self.config.exclude_kinds.iter().any(|k| k == document.kind()) {
            return Ok(Vec::new());
        }

        let labels = document.labels();
        let findings = self
            .config
            .labels
            .iter()
            .filter(|label| !labels.is_some_and(|l| l.contains_key(label.as_str())))
            .map(|label| {
                Finding::new(
                    NAME,
                    Severity::Warning,
                    &format!("Missing required label {:?}", label),
                    document.resource_ref(),
                )
                .with_field("metadata.labels")
                .with_suggestion(format!("Add label: {}: <value>", label))
            })
            .collect();
        Ok(findings)
    }
}
