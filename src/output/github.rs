//! GitHub Actions output formatter
//!
//! Outputs findings as workflow commands:
//! `::warning title=[rule] namespace/Kind/name::message`

use super::{OutputError, OutputFormatter};
use crate::finding::{Finding, Severity};

/// Formatter for GitHub Actions annotations
pub struct GithubActionsFormatter;

impl GithubActionsFormatter {
    /// Format a single finding
    pub fn format_finding(&self, finding: &Finding) -> String {
        let level = match finding.severity {
            Severity::Fatal | Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "notice",
        };

        let title = format!("[{}] {}", finding.rule, finding.resource);
        let mut message = finding.message.clone();
        if let Some(suggestion) = &finding.suggestion {
            message.push_str(&format!(" (Suggestion: {})", suggestion));
        }

        format!(
            "::{} title={}::{}",
            level,
            escape_property(&title),
            escape_data(&message)
        )
    }
}

fn escape_data(s: &str) -> String {
    s.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

fn escape_property(s: &str) -> String {
    escape_data(s).replace(':', "%3A").replace(',', "%2C")
}

impl OutputFormatter for GithubActionsFormatter {
    fn format(&self, findings: &[Finding]) -> Result<String, OutputError> {
        let mut output = String::new();
        for finding in findings {
            output.push_str(&self.format_finding(finding));
            output.push('\n');
        }
        Ok(output)
    }
}
