//! Human-readable text output formatter

use super::{OutputError, OutputFormatter};
use crate::finding::{Finding, Severity};
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show field paths and suggestions
    pub show_details: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_details: true,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    fn severity_str(&self, severity: Severity) -> ColoredString {
        let s = severity.to_string();
        if !self.colored {
            return s.normal();
        }
        match severity {
            Severity::Fatal => s.red().bold(),
            Severity::Error => s.red(),
            Severity::Warning => s.yellow(),
            Severity::Info => s.cyan(),
        }
    }

    /// Format a single finding
    pub fn format_finding(&self, finding: &Finding) -> String {
        let mut output = format!(
            "[{}] {}: {} ({})\n",
            self.severity_str(finding.severity),
            finding.resource,
            finding.message,
            if self.colored {
                finding.rule.dimmed().to_string()
            } else {
                finding.rule.clone()
            }
        );

        if self.show_details {
            if let Some(field) = &finding.field {
                output.push_str(&format!("  Field: {}\n", field));
            }
            if let Some(suggestion) = &finding.suggestion {
                output.push_str(&format!("  Suggestion: {}\n", suggestion));
            }
        }
        output
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, findings: &[Finding]) -> Result<String, OutputError> {
        let mut sorted: Vec<&Finding> = findings.iter().collect();
        sorted.sort_by(|a, b| a.report_order(b));

        let mut output = String::new();
        for finding in sorted {
            output.push_str(&self.format_finding(finding));
        }

        if !findings.is_empty() {
            output.push_str(&format!("\nFound {} issue(s)\n", findings.len()));
        }
        Ok(output)
    }
}
