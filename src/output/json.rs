//! JSON output formatter

use super::{OutputError, OutputFormatter, Report};
use crate::finding::Finding;

/// JSON formatter for machine-readable output
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-line output
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, findings: &[Finding]) -> Result<String, OutputError> {
        let report = Report::new(findings);
        let mut output = if self.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
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

    #[test]
    fn test_json_shape() {
        let output = JsonFormatter::new().format(&findings()).unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["count"], json!(2));
        assert_eq!(
            value["issues"][0],
            json!({
                "severity": "error",
                "rule": "resource-limits",
                "message": "Container \"app\" missing CPU limit",
                "resource": {
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "namespace": "prod",
                    "name": "web",
                },
                "field": "spec.template.spec.containers[0].resources.limits.cpu",
                "suggestion": "Add: resources.limits.cpu: \"1000m\"",
            })
        );
        // cluster-scoped resources and findings without details omit the keys
        assert!(value["issues"][1]["resource"].get("namespace").is_none());
        assert!(value["issues"][1].get("field").is_none());
    }

    #[test]
    fn test_json_compact() {
        let output = JsonFormatter::new().compact().format(&[]).unwrap();
        assert_eq!(output, "{\"issues\":[],\"count\":0}\n");
    }
}
