//! SARIF (Static Analysis Results Interchange Format) output formatter
//!
//! Code scanning services ingest SARIF 2.1.0. Manifests have no line
//! information here, so every result points at its resource: the artifact
//! URI is `namespace/Kind/name` and a logical location carries the API
//! version and the offending field.

use super::{OutputError, OutputFormatter};
use crate::finding::{Finding, Severity};
use serde::Serialize;
use std::collections::BTreeMap;

const SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";

/// SARIF formatter for code scanning integrations
pub struct SarifFormatter {
    /// Tool name
    pub tool_name: String,

    /// Tool version
    pub tool_version: String,
}

impl Default for SarifFormatter {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl SarifFormatter {
    pub fn new(tool_name: &str, tool_version: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            tool_version: tool_version.to_string(),
        }
    }
}

#[derive(Serialize)]
struct SarifReport {
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    runs: Vec<SarifRun>,
}

#[derive(Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
}

#[derive(Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Serialize)]
struct SarifDriver {
    name: String,
    version: String,
    rules: Vec<SarifRule>,
}

#[derive(Serialize)]
struct SarifRule {
    id: String,
    name: String,
    #[serde(rename = "shortDescription")]
    short_description: SarifMessage,
}

#[derive(Serialize)]
struct SarifResult {
    #[serde(rename = "ruleId")]
    rule_id: String,
    level: &'static str,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
}

#[derive(Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Serialize)]
struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    physical_location: SarifPhysicalLocation,
    #[serde(rename = "logicalLocations")]
    logical_locations: Vec<SarifLogicalLocation>,
}

#[derive(Serialize)]
struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    artifact_location: SarifArtifactLocation,
    region: SarifRegion,
}

#[derive(Serialize)]
struct SarifArtifactLocation {
    uri: String,
}

#[derive(Serialize)]
struct SarifRegion {
    #[serde(rename = "startLine")]
    start_line: usize,
}

#[derive(Serialize)]
struct SarifLogicalLocation {
    name: String,
    #[serde(rename = "fullyQualifiedName")]
    fully_qualified_name: String,
    kind: &'static str,
}

fn severity_to_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Fatal | Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "note",
    }
}

fn result(finding: &Finding) -> SarifResult {
    let resource = finding.resource.to_string();
    let mut qualified = format!("{}.{}", finding.resource.api_version, resource);
    if let Some(field) = &finding.field {
        qualified.push('.');
        qualified.push_str(field);
    }

    let text = match &finding.suggestion {
        Some(suggestion) => format!("{}\nSuggestion: {}", finding.message, suggestion),
        None => finding.message.clone(),
    };

    SarifResult {
        rule_id: finding.rule.clone(),
        level: severity_to_level(finding.severity),
        message: SarifMessage { text },
        locations: vec![SarifLocation {
            physical_location: SarifPhysicalLocation {
                artifact_location: SarifArtifactLocation {
                    uri: resource.clone(),
                },
                region: SarifRegion { start_line: 1 },
            },
            logical_locations: vec![SarifLogicalLocation {
                name: resource,
                fully_qualified_name: qualified,
                kind: "resource",
            }],
        }],
    }
}

impl OutputFormatter for SarifFormatter {
    fn format(&self, findings: &[Finding]) -> Result<String, OutputError> {
        // one descriptor per rule that reported something, sorted by id
        let rules: BTreeMap<&str, SarifRule> = findings
            .iter()
            .map(|f| {
                let rule = SarifRule {
                    id: f.rule.clone(),
                    name: f.rule.clone(),
                    short_description: SarifMessage {
                        text: format!("Linter: {}", f.rule),
                    },
                };
                (f.rule.as_str(), rule)
            })
            .collect();

        let report = SarifReport {
            schema: SCHEMA,
            version: "2.1.0",
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: self.tool_name.clone(),
                        version: self.tool_version.clone(),
                        rules: rules.into_values().collect(),
                    },
                },
                results: findings.iter().map(result).collect(),
            }],
        };

        let mut output = serde_json::to_string_pretty(&report)?;
        output.push('\n');
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::findings;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn render(findings: &[Finding]) -> Value {
        let output = SarifFormatter::new("kubelint", "1.2.3").format(findings).unwrap();
        serde_json::from_str(&output).unwrap()
    }

    #[test]
    fn test_sarif_envelope() {
        let value = render(&findings());
        assert_eq!(value["version"], json!("2.1.0"));
        assert_eq!(value["$schema"], json!(SCHEMA));

        let driver = &value["runs"][0]["tool"]["driver"];
        assert_eq!(driver["name"], json!("kubelint"));
        assert_eq!(driver["version"], json!("1.2.3"));
        // sorted by id
        assert_eq!(
            driver["rules"],
            json!([
                {"id": "required-labels", "name": "required-labels", "shortDescription": {"text": "Linter: required-labels"}},
                {"id": "resource-limits", "name": "resource-limits", "shortDescription": {"text": "Linter: resource-limits"}},
            ])
        );
    }

    #[test]
    fn test_sarif_results() {
        let value = render(&findings());
        let results = value["runs"][0]["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(
            results[0],
            json!({
                "ruleId": "resource-limits",
                "level": "error",
                "message": {
                    "text": "Container \"app\" missing CPU limit\nSuggestion: Add: resources.limits.cpu: \"1000m\""
                },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": {"uri": "prod/Deployment/web"},
                        "region": {"startLine": 1},
                    },
                    "logicalLocations": [{
                        "name": "prod/Deployment/web",
                        "fullyQualifiedName": "apps/v1.prod/Deployment/web.spec.template.spec.containers[0].resources.limits.cpu",
                        "kind": "resource",
                    }],
                }],
            })
        );

        // cluster-scoped, no field, no suggestion
        assert_eq!(results[1]["level"], json!("warning"));
        assert_eq!(results[1]["message"]["text"], json!("Missing required label \"team\""));
        assert_eq!(
            results[1]["locations"][0]["logicalLocations"][0]["fullyQualifiedName"],
            json!("rbac.authorization.k8s.io/v1.ClusterRole/reader")
        );
    }

    #[test]
    fn test_sarif_empty_run() {
        let value = render(&[]);
        assert_eq!(value["runs"][0]["results"], json!([]));
        assert_eq!(value["runs"][0]["tool"]["driver"]["rules"], json!([]));
    }

    #[test]
    fn test_sarif_severity_mapping() {
        assert_eq!(severity_to_level(Severity::Fatal), "error");
        assert_eq!(severity_to_level(Severity::Error), "error");
        assert_eq!(severity_to_level(Severity::Warning), "warning");
        assert_eq!(severity_to_level(Severity::Info), "note");
    }
}
