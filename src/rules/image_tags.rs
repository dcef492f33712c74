//! Container image references: tags, digests and registries

use crate::document::{Container, Document};
use crate::finding::{Finding, Severity};
use crate::rule::{apply_settings, ConfigureError, LintContext, LintError, Rule, Settings};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NAME: &str = "image-tags";
const DESCRIPTION: &str = "Validates container image tags";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ImageTagsConfig {
    pub disallow_latest: bool,
    pub require_digest: bool,
    pub allowed_registries: Vec<String>,
    pub require_version_pattern: String,
}

impl Default for ImageTagsConfig {
    fn default() -> Self {
        Self {
            disallow_latest: true,
            require_digest: false,
            allowed_registries: Vec::new(),
            require_version_pattern: String::new(),
        }
    }
}

/// A parsed image reference such as `registry.io:5000/team/app:1.2@sha256:..`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRef<'a> {
    /// Only set when the first path segment looks like a host (has `.` or `:`)
    pub registry: Option<&'a str>,
    pub repository: &'a str,
    pub tag: Option<&'a str>,
    pub digest: Option<&'a str>,
}

impl<'a> ImageRef<'a> {
    pub fn parse(image: &'a str) -> Self {
        let (reference, digest) = match image.split_once('@') {
            Some((reference, digest)) => (reference, Some(digest)),
            None => (image, None),
        };

        let (registry, rest) = match reference.split_once('/') {
            Some((host, rest)) if host.contains('.') || host.contains(':') => (Some(host), rest),
            _ => (None, reference),
        };

        let (repository, tag) = match rest.split_once(':') {
            Some((repository, tag)) => (repository, Some(tag)),
            None => (rest, None),
        };

        Self {
            registry,
            repository,
            tag,
            digest,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageTags {
    config: ImageTagsConfig,
    version_pattern: Option<Regex>,
}

impl ImageTags {
    fn registry_allowed(&self, registry: &str) -> bool {
        self.config.allowed_registries.iter().any(|allowed| {
            registry == allowed
                || registry
                    .strip_prefix(allowed.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    fn check(&self, document: &Document, container: &Container<'_>, image: &str) -> Vec<Finding> {
        let name = container.name();
        let field = container.field("image");
        let finding = |severity, message: String, suggestion: String| {
            Finding::new(NAME, severity, &message, document.resource_ref())
                .with_field(field.clone())
                .with_suggestion(suggestion)
        };

        let image = ImageRef::parse(image);
        let mut findings = Vec::new();

        if self.config.require_digest && image.digest.is_none() {
            findings.push(finding(
                Severity::Warning,
                format!("Container {:?} image should use digest", name),
                "Use image with SHA256 digest: image@sha256:...".to_string(),
            ));
        }

        if let Some(registry) = image.registry {
            if !self.config.allowed_registries.is_empty() && !self.registry_allowed(registry) {
                findings.push(finding(
                    Severity::Error,
                    format!("Container {:?} uses disallowed registry {:?}", name, registry),
                    format!(
                        "Use one of the allowed registries: {}",
                        self.config.allowed_registries.join(", ")
                    ),
                ));
            }
        }

        if let Some(tag) = image.tag {
            if self.config.disallow_latest && tag == "latest" {
                findings.push(finding(
                    Severity::Error,
                    format!("Container {:?} uses 'latest' tag", name),
                    "Specify an explicit version tag".to_string(),
                ));
            }
            if let Some(pattern) = &self.version_pattern {
                if !pattern.is_match(tag) {
                    findings.push(finding(
                        Severity::Warning,
                        format!("Container {:?} tag {:?} doesn't match required pattern", name, tag),
                        format!("Use tag matching pattern: {}", self.config.require_version_pattern),
                    ));
                }
            }
        }

        findings
    }
}

impl Rule for ImageTags {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn configure(&mut self, settings: &Settings) -> Result<(), ConfigureError> {
        let config: ImageTagsConfig = apply_settings(&self.config, settings)?;
        let version_pattern = if config.require_version_pattern.is_empty() {
            None
        } else {
            let pattern = Regex::new(&config.require_version_pattern).map_err(|e| {
                ConfigureError::InvalidValue {
                    key: "require-version-pattern".to_string(),
                    message: e.to_string(),
                }
            })?;
            Some(pattern)
        };
        self.config = config;
        self.version_pattern = version_pattern;
        Ok(())
    }

    fn lint(&self, document: &Document, _context: &LintContext<'_>) -> Result<Vec<Finding>, LintError> {
        if !document.is_workload_or_pod() {
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        for container in document.containers()? {
            if let Some(image) = container.image() {
                findings.extend(self.check(document, &container, image));
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::{lint, messages, settings};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pod(image: &str) -> String {
        format!(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: p
spec:
  containers:
    - name: app
      image: "{}"
"#,
            image
        )
    }

    #[test]
    fn test_parse_image_ref() {
        assert_eq!(
            ImageRef::parse("nginx"),
            ImageRef {
                registry: None,
                repository: "nginx",
                tag: None,
                digest: None,
            }
        );
        assert_eq!(
            ImageRef::parse("library/nginx:1.25"),
            ImageRef {
                registry: None,
                repository: "library/nginx",
                tag: Some("1.25"),
                digest: None,
            }
        );
        assert_eq!(
            ImageRef::parse("localhost:5000/app:v1@sha256:abc"),
            ImageRef {
                registry: Some("localhost:5000"),
                repository: "app",
                tag: Some("v1"),
                digest: Some("sha256:abc"),
            }
        );
        assert_eq!(ImageRef::parse("ghcr.io/org/app").registry, Some("ghcr.io"));
    }

    #[test]
    fn test_latest_tag() {
        let findings = lint(&ImageTags::default(), &pod("nginx:latest"));
        assert_eq!(messages(&findings), vec!["Container \"app\" uses 'latest' tag"]);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].field.as_deref(), Some("spec.containers[0].image"));

        // an untagged image is not flagged
        assert!(lint(&ImageTags::default(), &pod("nginx")).is_empty());
    }

    #[test]
    fn test_require_digest() {
        let mut rule = ImageTags::default();
        rule.configure(&settings(json!({"require-digest": true}))).unwrap();
        let findings = lint(&rule, &pod("nginx:1.25"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert!(lint(&rule, &pod("nginx:1.25@sha256:abc")).is_empty());
    }

    #[test]
    fn test_allowed_registries() {
        let mut rule = ImageTags::default();
        rule.configure(&settings(json!({"allowed-registries": ["ghcr.io"]})))
            .unwrap();
        let findings = lint(&rule, &pod("quay.io/org/app:1.0"));
        assert_eq!(
            messages(&findings),
            vec!["Container \"app\" uses disallowed registry \"quay.io\""]
        );
        assert!(lint(&rule, &pod("ghcr.io/org/app:1.0")).is_empty());
        // images without a registry host are not checked
        assert!(lint(&rule, &pod("org/app:1.0")).is_empty());
    }

    #[test]
    fn test_version_pattern() {
        let mut rule = ImageTags::default();
        rule.configure(&settings(json!({"require-version-pattern": "^v[0-9]+\\.[0-9]+$"})))
            .unwrap();
        assert!(lint(&rule, &pod("app:v1.2")).is_empty());
        let findings = lint(&rule, &pod("app:1.2"));
        assert_eq!(
            messages(&findings),
            vec!["Container \"app\" tag \"1.2\" doesn't match required pattern"]
        );
    }

    #[test]
    fn test_invalid_version_pattern_is_rejected() {
        let mut rule = ImageTags::default();
        let err = rule
            .configure(&settings(json!({"require-version-pattern": "("})))
            .unwrap_err();
        assert!(matches!(err, ConfigureError::InvalidValue { .. }));
        // a failed configure leaves the previous configuration in place
        assert!(rule.config.require_version_pattern.is_empty());
    }

    #[test]
    fn test_non_workloads_are_skipped() {
        let svc = "apiVersion: v1\nkind: Service\nmetadata:\n  name: s\n";
        assert!(lint(&ImageTags::default(), svc).is_empty());
    }
}
