//! Kubelint - Kubernetes Manifest Linter
//!
//! A fast, pluggable linter for Kubernetes resource manifests. Every document
//! is checked against every active rule in parallel, and the findings come
//! back in a stable order.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> Loader -> [Document] -> Engine (Registry -> Rule) -> [Finding] -> OutputFormatter
//! ```
//!
//! The engine registers declared custom rules, selects and configures the
//! active rules, then evaluates every (document, rule) pair on a bounded
//! worker pool.
//!
//! # Custom rules
//!
//! Rules of the `jq` kind are declared in `.kubelint.yaml` and written as jq
//! expressions. `$objects` holds every document of the run, which allows
//! cross-resource checks:
//!
//! ```yaml
//! linters:
//!   custom:
//!     - name: service-has-selector
//!       type: jq
//!       settings:
//!         rules:
//!           - expression: '.kind == "Service" and (.spec.selector | length) == 0'
//!             message: Service selects no pods
//!             severity: warning
//! ```
//!
//! # Library use
//!
//! ```
//! use kubelint::{Document, Engine, RunOptions};
//!
//! let documents = vec![Document::from_yaml(
//!     "apiVersion: v1\nkind: Pod\nmetadata:\n  name: web\nspec:\n  containers:\n    - name: app\n      image: nginx:latest\n",
//! )
//! .unwrap()];
//!
//! let mut engine = Engine::with_builtins();
//! let options = RunOptions {
//!     enabled: vec!["image-tags".to_string()],
//!     ..Default::default()
//! };
//! let report = engine.run(&documents, &options).unwrap();
//! assert_eq!(report.findings.len(), 1);
//! assert_eq!(report.findings[0].message, "Container \"app\" uses 'latest' tag");
//! ```

pub mod config;
pub mod document;
pub mod engine;
pub mod expr;
pub mod finding;
pub mod output;
pub mod registry;
pub mod rule;
pub mod rules;
pub mod source;

// Re-export main types
pub use config::{Config, ConfigError, OutputFormat};
pub use document::{Container, Document, DocumentError};
pub use engine::{
    CancellationToken, Engine, EvaluationFailure, RuleTiming, RunError, RunOptions, RunReport,
    SetupError,
};
pub use finding::{Finding, ResourceRef, Severity, Summary};
pub use output::OutputFormatter;
pub use registry::{Registry, RegistryError};
pub use rule::{ConfigureError, LintContext, LintError, Rule, RuleClone, RuleFactory, Settings};
pub use source::{Loader, SourceError};
