//! Containers should declare liveness and readiness probes

use crate::document::Document;
use crate::finding::{Finding, Severity};
use crate::rule::{apply_settings, ConfigureError, LintContext, LintError, Rule, Settings};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "health-probes";
const DESCRIPTION: &str = "Ensures pods have liveness and readiness probes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HealthProbesConfig {
    pub require_liveness: bool,
    pub require_readiness: bool,
    pub exclude_kinds: Vec<String>,
}

impl Default for HealthProbesConfig {
    fn default() -> Self {
        Self {
            require_liveness: true,
            require_readiness: true,
            exclude_kinds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthProbes {
    config: HealthProbesConfig,
}

impl Rule for HealthProbes {
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
        if !document.is_workload_or_pod() {
            return Ok(Vec::new());
        }

        let probes = [
            (
                self.config.require_liveness,
                "livenessProbe",
                "Add a livenessProbe to detect and recover from failures",
            ),
            (
                self.config.require_readiness,
                "readinessProbe",
                "Add a readinessProbe to control traffic routing",
            ),
        ];

        let mut findings = Vec::new();
        for container in document.containers()? {
            for (required, probe, suggestion) in probes {
                if !required || container.get(probe).is_some() {
                    continue;
                }
                findings.push(
                    Finding::new(
                        NAME,
                        Severity::Warning,
                        &format!("Container {:?} missing {}", container.name(), probe),
                        document.resource_ref(),
                    )
                    .with_field(container.field(probe))
                    .with_suggestion(suggestion),
                );
            }
        }
        Ok(findings)
    }
}
