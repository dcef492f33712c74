//! Integration tests for the kubelint library and CLI

use kubelint::engine::{CustomRuleDeclaration, RunOptions};
use kubelint::{
    Config, ConfigureError, Document, Engine, Finding, LintContext, LintError, Registry, Rule,
    RunError, SetupError, Severity, Settings,
};
use kubelint::source::Loader;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn load(names: &[&str]) -> Vec<Document> {
    let inputs: Vec<String> = names.iter().map(|n| fixture(n)).collect();
    Loader::new().load(&inputs).unwrap()
}

fn only(rules: &[&str]) -> RunOptions {
    RunOptions {
        enabled: rules.iter().map(|r| r.to_string()).collect(),
        ..Default::default()
    }
}

fn summary(findings: &[Finding]) -> Vec<String> {
    findings
        .iter()
        .map(|f| format!("{} {} {}", f.resource, f.rule, f.severity))
        .collect()
}

#[test]
fn test_configmap_exists_across_documents() {
    let config = Config::load(fixture("configmap-exists.kubelint.yaml").as_ref()).unwrap();
    config.validate().unwrap();
    let options = config.run_options();

    let mut engine = Engine::with_builtins();
    let report = engine.run(&load(&["web-with-volume.yaml"]), &options).unwrap();
    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.rule, "configmap-exists");
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.resource.kind, "Deployment");
    assert_eq!(finding.resource.name, "web");
    assert_eq!(finding.field.as_deref(), Some("spec.template.spec.volumes"));

    let report = engine
        .run(&load(&["web-with-volume.yaml", "configmap.yaml"]), &options)
        .unwrap();
    assert!(report.findings.is_empty());
}

#[test]
fn test_missing_resources_is_one_finding() {
    let mut engine = Engine::with_builtins();
    let report = engine
        .run(&load(&["no-resources.yaml"]), &only(&["resource-limits"]))
        .unwrap();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(
        report.findings[0].message,
        "Container \"report\" has no resource requirements"
    );
    assert_eq!(
        report.findings[0].field.as_deref(),
        Some("spec.jobTemplate.spec.template.spec.containers[0].resources")
    );
}

#[test]
fn test_hardened_deployment_is_clean() {
    let mut engine = Engine::with_builtins();
    let report = engine.run(&load(&["hardened.yaml"]), &RunOptions::default()).unwrap();
    assert!(report.findings.is_empty(), "{:?}", summary(&report.findings));
    assert_eq!(report.rules.len(), 7);
    assert_eq!(report.summary.exit_code(true), 0);
}

#[test]
fn test_mixed_stream_with_defaults() {
    let mut engine = Engine::with_builtins();
    let documents = load(&["mixed.yaml"]);
    assert_eq!(documents.len(), 3);

    let report = engine.run(&documents, &RunOptions::default()).unwrap();
    assert_eq!(
        summary(&report.findings),
        vec![
            "ClusterRoleBinding/everyone-can-view cluster-role-binding-security error",
            "default/Pod/debug health-probes warning",
            "default/Pod/debug health-probes warning",
            "default/Pod/debug image-tags error",
            "default/Pod/debug security-context error",
            "default/Pod/debug security-context error",
        ]
    );
    assert_eq!(report.findings[1].message, "Container \"shell\" missing livenessProbe");
    assert_eq!(report.findings[2].message, "Container \"shell\" missing readinessProbe");
    assert_eq!(report.summary.error, 4);
    assert_eq!(report.summary.warning, 2);
    assert_eq!(report.summary.exit_code(false), 1);
}

#[test]
fn test_repeated_runs_are_identical() {
    let documents = load(&["mixed.yaml", "no-resources.yaml", "web-with-volume.yaml", "hardened.yaml"]);
    let options = RunOptions {
        concurrency: 8,
        ..Default::default()
    };

    let mut engine = Engine::with_builtins();
    let first = engine.run(&documents, &options).unwrap().findings;
    assert!(!first.is_empty());
    for _ in 0..10 {
        assert_eq!(engine.run(&documents, &options).unwrap().findings, first);
    }

    let serial = RunOptions {
        concurrency: 1,
        ..Default::default()
    };
    assert_eq!(engine.run(&documents, &serial).unwrap().findings, first);
}

#[test]
fn test_disable_wins_over_enable() {
    let mut engine = Engine::with_builtins();
    let options = RunOptions {
        enabled: vec!["image-tags".to_string(), "health-probes".to_string()],
        disabled: vec!["image-tags".to_string()],
        ..Default::default()
    };
    let report = engine.run(&load(&["mixed.yaml"]), &options).unwrap();
    assert_eq!(report.rules, vec!["health-probes".to_string()]);
    assert!(report.findings.iter().all(|f| f.rule == "health-probes"));
}

#[test]
fn test_null_expression_never_fires() {
    let mut engine = Engine::with_builtins();
    let options = RunOptions {
        enabled: vec!["annotations".to_string()],
        custom_rules: vec![CustomRuleDeclaration {
            name: "annotations".to_string(),
            kind: "jq".to_string(),
            description: String::new(),
            settings: json!({"rules": [{
                "expression": ".metadata.annotations",
                "message": "has annotations",
            }]})
            .as_object()
            .cloned(),
        }],
        ..Default::default()
    };
    let report = engine.run(&load(&["mixed.yaml"]), &options).unwrap();
    assert!(report.findings.is_empty());
}

#[test]
fn test_unknown_rule_kind_fails_setup() {
    let mut engine = Engine::with_builtins();
    let options = RunOptions {
        custom_rules: vec![CustomRuleDeclaration {
            name: "policy".to_string(),
            kind: "rego".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let err = engine.run(&load(&["mixed.yaml"]), &options).unwrap_err();
    assert!(matches!(err, RunError::Setup(SetupError::CustomRule { .. })));
    assert!(err.to_string().contains("rego"));
    assert!(err.partial_report().is_none());
}

#[test]
fn test_runtime_expression_error_fails_run() {
    let mut engine = Engine::with_builtins();
    let options = RunOptions {
        enabled: vec!["broken".to_string(), "image-tags".to_string()],
        custom_rules: vec![CustomRuleDeclaration {
            name: "broken".to_string(),
            kind: "jq".to_string(),
            settings: json!({"rules": [{"expression": ".metadata.name + 1", "message": "m"}]})
                .as_object()
                .cloned(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let err = engine.run(&load(&["mixed.yaml"]), &options).unwrap_err();
    let report = err.partial_report().unwrap();
    // image-tags still ran on every document
    assert_eq!(summary(&report.findings), vec!["default/Pod/debug image-tags error"]);

    let RunError::Evaluation(failure) = err else {
        panic!("expected an evaluation failure");
    };
    assert_eq!(failure.errors.len(), 3);
    assert!(failure.errors.iter().all(|e| e.rule == "broken"));
    assert_eq!(failure.errors[0].kind, "Service");
}

#[test]
fn test_configuration_persists_within_an_engine() {
    let documents = load(&["configmap.yaml"]);
    let mut settings = std::collections::BTreeMap::new();
    settings.insert(
        "required-labels".to_string(),
        json!({"labels": ["team"]}).as_object().cloned().unwrap(),
    );
    let configured = RunOptions {
        enabled: vec!["required-labels".to_string()],
        settings,
        ..Default::default()
    };

    let mut engine = Engine::with_builtins();
    assert_eq!(engine.run(&documents, &configured).unwrap().findings.len(), 1);
    // no settings this time, the previous configuration is kept
    let report = engine.run(&documents, &only(&["required-labels"])).unwrap();
    assert_eq!(report.findings.len(), 1);

    let mut fresh = Engine::with_builtins();
    let report = fresh.run(&documents, &only(&["required-labels"])).unwrap();
    assert!(report.findings.is_empty());
}

/// Records how many evaluations overlap
#[derive(Clone)]
struct Gauge {
    name: String,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Rule for Gauge {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "counts concurrent evaluations"
    }

    fn configure(&mut self, _settings: &Settings) -> Result<(), ConfigureError> {
        Ok(())
    }

    fn lint(&self, _document: &Document, _context: &LintContext<'_>) -> Result<Vec<Finding>, LintError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[test]
fn test_concurrency_limit_is_respected() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new();
    for name in ["gauge-a", "gauge-b"] {
        registry.register(Box::new(Gauge {
            name: name.to_string(),
            in_flight: Arc::clone(&in_flight),
            peak: Arc::clone(&peak),
        }));
    }

    let documents: Vec<Document> = (0..20)
        .map(|i| {
            Document::from_value(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": format!("cm-{i}")},
            }))
            .unwrap()
        })
        .collect();

    let mut engine = Engine::new(registry);
    let options = RunOptions {
        concurrency: 3,
        ..Default::default()
    };
    let report = engine.run(&documents, &options).unwrap();
    assert_eq!(report.rule_timings.iter().map(|t| t.evaluation_count).sum::<usize>(), 40);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 3, "peak concurrency was {peak}");
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

// CLI

fn kubelint(dir: &TempDir, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_kubelint"))
        .current_dir(dir.path())
        .args(args)
        .output()
        .expect("Failed to run command")
}

#[test]
fn test_cli_json_output_and_exit_code() {
    let dir = TempDir::new().unwrap();
    let output = kubelint(&dir, &["run", "--format", "json", &fixture("mixed.yaml")]);
    assert_eq!(output.status.code(), Some(1));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["count"], 6);
    assert_eq!(value["issues"][0]["rule"], "cluster-role-binding-security");
}

#[test]
fn test_cli_fail_on_warning() {
    let dir = TempDir::new().unwrap();
    let path = fixture("mixed.yaml");
    let args = ["run", "--no-color", "--enable-linter", "health-probes", path.as_str()];

    let output = kubelint(&dir, &args);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[warning] default/Pod/debug: Container \"shell\" missing livenessProbe (health-probes)"));
    assert!(stdout.contains("Found 2 issue(s)"));

    let mut strict = args.to_vec();
    strict.insert(1, "--fail-on-warning");
    assert_eq!(kubelint(&dir, &strict).status.code(), Some(4));
}

#[test]
fn test_cli_github_actions_format() {
    let dir = TempDir::new().unwrap();
    let output = kubelint(
        &dir,
        &["run", "-f", "github-actions", "--enable-linter", "image-tags", &fixture("mixed.yaml")],
    );
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("::error title=[image-tags] default/Pod/debug::"));
}

#[test]
fn test_cli_sarif_format() {
    let dir = TempDir::new().unwrap();
    let output = kubelint(
        &dir,
        &["run", "-f", "sarif", "--enable-linter", "image-tags", &fixture("mixed.yaml")],
    );
    assert_eq!(output.status.code(), Some(1));
    let log: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(log["version"], json!("2.1.0"));
    assert_eq!(log["runs"][0]["tool"]["driver"]["name"], json!("kubelint"));
    let results = log["runs"][0]["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r["ruleId"] == json!("image-tags")));
    assert_eq!(
        results[0]["locations"][0]["physicalLocation"]["artifactLocation"]["uri"],
        json!("default/Pod/debug")
    );
}

#[test]
fn test_cli_unknown_linter_is_setup_failure() {
    let dir = TempDir::new().unwrap();
    let output = kubelint(&dir, &["run", "--enable-linter", "nope", &fixture("hardened.yaml")]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown rule 'nope'"));
}

#[test]
fn test_cli_evaluation_failure() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join(".kubelint.yaml");
    std::fs::write(
        &config,
        "linters:\n  enable: [broken]\n  custom:\n    - name: broken\n      type: jq\n      settings:\n        rules:\n          - expression: .metadata.name + 1\n            message: never\n",
    )
    .unwrap();

    // picked up from the working directory
    let output = kubelint(&dir, &["run", &fixture("configmap.yaml")]);
    assert_eq!(output.status.code(), Some(5));
    assert!(String::from_utf8_lossy(&output.stderr).contains("rule 'broken' failed on ConfigMap/cfg-a"));
}

#[test]
fn test_cli_config_init_and_validate() {
    let dir = TempDir::new().unwrap();
    let output = kubelint(&dir, &["config", "init"]);
    assert!(output.status.success());
    assert!(dir.path().join(".kubelint.yaml").exists());

    // refuses to overwrite
    assert_eq!(kubelint(&dir, &["config", "init"]).status.code(), Some(3));

    let output = kubelint(&dir, &["config", "validate"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let broken = dir.path().join("broken.yaml");
    std::fs::write(&broken, "linters:\n  settings:\n    image-tags:\n      require-version-pattern: '('\n").unwrap();
    let output = kubelint(&dir, &["config", "validate", "--config", broken.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_cli_linters_and_version() {
    let dir = TempDir::new().unwrap();
    let output = kubelint(&dir, &["linters"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for rule in [
        "cluster-role-binding-security",
        "health-probes",
        "image-tags",
        "jq",
        "required-labels",
        "resource-limits",
        "security-context",
    ] {
        assert!(stdout.contains(rule), "missing {rule}");
    }

    let output = kubelint(&dir, &["version"]);
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("kubelint "));
}
