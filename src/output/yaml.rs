//! YAML output formatter

use super::{OutputError, OutputFormatter, Report};
use crate::finding::Finding;

pub struct YamlFormatter;

impl OutputFormatter for YamlFormatter {
    fn format(&self, findings: &[Finding]) -> Result<String, OutputError> {
        Ok(serde_yaml::to_string(&Report::new(findings))?)
    }
}
