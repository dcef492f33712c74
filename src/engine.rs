//! Core linter engine
//!
//! A run has two phases:
//!
//! 1. **Setup** (sequential, needs `&mut Engine`): custom rules are created
//!    through their kind's factory, unknown rule names are rejected, the
//!    active set is selected and per-rule settings are applied. Any failure
//!    aborts the run before evaluation and leaves the registry untouched.
//! 2. **Evaluation** (parallel, only `&Engine`): every (document, rule) pair
//!    is one unit of work, run on a dedicated thread pool whose size is the
//!    concurrency limit. Unit failures are collected; every other unit still
//!    runs and the run as a whole is reported as failed.
//!
//! Findings are sorted by kind, name, namespace and rule before they are
//! returned, with ties kept in unit order, so repeated runs over the same
//! input produce the same list.

use crate::document::Document;
use crate::finding::{Finding, Summary};
use crate::registry::{Registry, RegistryError};
use crate::rule::{ConfigureError, LintContext, LintError, Rule, RuleClone, Settings};
use globset::{Glob, GlobMatcher};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Concurrency used when none is configured
pub const DEFAULT_CONCURRENCY: usize = 4;

/// A rule declared in configuration and built by a rule-kind factory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomRuleDeclaration {
    #[serde(default)]
    pub name: String,
    /// Rule kind, e.g. `jq`
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
}

/// Documents to leave out of a run. Fields are glob patterns; an empty
/// field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceFilter {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// Everything a run needs besides the documents
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only these rules run (empty = all registered)
    pub enabled: Vec<String>,
    /// These rules never run, even when enabled
    pub disabled: Vec<String>,
    /// Settings blocks by rule name
    pub settings: BTreeMap<String, Settings>,
    /// Rules to create and register before selection
    pub custom_rules: Vec<CustomRuleDeclaration>,
    /// Maximum units in flight (0 = [`DEFAULT_CONCURRENCY`])
    pub concurrency: usize,
    /// Cancel the run once this much time has passed
    pub timeout: Option<Duration>,
    pub exclude: Vec<ResourceFilter>,
}

impl RunOptions {
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency
        }
    }
}

/// Cooperative cancellation, observed between units
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also cancels itself after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child(Some(timeout))
    }

    /// Shares the cancellation flag; the deadline is the earlier of the two
    fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Errors that abort a run before evaluation starts
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("custom rule #{index}: missing '{field}'")]
    IncompleteCustomRule { index: usize, field: &'static str },

    #[error("custom rule '{name}': {source}")]
    CustomRule {
        name: String,
        #[source]
        source: RegistryError,
    },

    #[error("unknown rule '{0}'")]
    UnknownRule(String),

    #[error("failed to configure rule '{name}': {source}")]
    Configure {
        name: String,
        #[source]
        source: ConfigureError,
    },

    #[error("invalid exclude pattern '{pattern}': {source}")]
    ExcludePattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// One failed (document, rule) unit
#[derive(Error, Debug)]
#[error("rule '{rule}' failed on {kind}/{name}: {source}")]
pub struct UnitError {
    pub rule: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    #[source]
    pub source: LintError,
}

/// Evaluation errors plus everything the run did produce
#[derive(Debug)]
pub struct EvaluationFailure {
    pub errors: Vec<UnitError>,
    pub report: RunReport,
}

impl fmt::Display for EvaluationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} evaluation error(s)", self.errors.len())?;
        if let Some(first) = self.errors.first() {
            write!(f, "; first: {}", first)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvaluationFailure {}

/// The single failure type of a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),

    #[error("evaluation failed: {0}")]
    Evaluation(Box<EvaluationFailure>),
}

impl RunError {
    /// Findings produced before the run failed, if evaluation started
    pub fn partial_report(&self) -> Option<&RunReport> {
        match self {
            RunError::Setup(_) => None,
            RunError::Evaluation(failure) => Some(&failure.report),
        }
    }
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTiming {
    /// Rule name
    pub rule: String,
    /// Total time spent on this rule
    pub total_time: Duration,
    /// Number of documents the rule evaluated
    pub evaluation_count: usize,
    /// Number of findings produced
    pub finding_count: usize,
}

impl RuleTiming {
    pub fn new(rule: &str) -> Self {
        Self {
            rule: rule.to_string(),
            ..Default::default()
        }
    }

    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }
}

/// Result of a run
#[derive(Debug, Default)]
pub struct RunReport {
    /// All findings, in report order
    pub findings: Vec<Finding>,
    pub summary: Summary,
    /// Names of the rules that ran, sorted
    pub rules: Vec<String>,
    /// Documents evaluated
    pub documents: usize,
    /// Documents dropped by exclude filters
    pub excluded: usize,
    /// Units never started because the run was cancelled
    pub skipped_units: usize,
    pub cancelled: bool,
    /// Per-rule timing statistics, sorted by rule name
    pub rule_timings: Vec<RuleTiming>,
    pub duration: Duration,
}

impl RunReport {
    /// Get rule timings sorted by total time (descending)
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.rule_timings.iter().collect();
        timings.sort_by(|a, b| b.total_time.cmp(&a.total_time));
        timings
    }

    /// Format timing statistics as a string
    pub fn format_timings(&self) -> String {
        let timings = self.sorted_timings();
        if timings.is_empty() {
            return "No timing data available".to_string();
        }

        let mut output = String::new();
        output.push_str("Rule Timing Statistics:\n");
        output.push_str(&format!(
            "{:<40} {:>12} {:>12} {:>10} {:>10}\n",
            "Rule", "Total", "Avg", "Evals", "Findings"
        ));
        output.push_str(&"-".repeat(88));
        output.push('\n');

        for timing in timings {
            let total_ms = timing.total_time.as_secs_f64() * 1000.0;
            let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;
            output.push_str(&format!(
                "{:<40} {:>10.2}ms {:>10.2}µs {:>10} {:>10}\n",
                timing.rule, total_ms, avg_us, timing.evaluation_count, timing.finding_count
            ));
        }

        output
    }
}

struct CompiledFilter {
    kind: Option<GlobMatcher>,
    name: Option<GlobMatcher>,
    namespace: Option<GlobMatcher>,
}

impl CompiledFilter {
    fn compile(filter: &ResourceFilter) -> Result<Self, SetupError> {
        let matcher = |pattern: &str| -> Result<Option<GlobMatcher>, SetupError> {
            if pattern.is_empty() {
                return Ok(None);
            }
            Glob::new(pattern)
                .map(|g| Some(g.compile_matcher()))
                .map_err(|source| SetupError::ExcludePattern {
                    pattern: pattern.to_string(),
                    source,
                })
        };
        Ok(Self {
            kind: matcher(&filter.kind)?,
            name: matcher(&filter.name)?,
            namespace: matcher(&filter.namespace)?,
        })
    }

    fn matches(&self, document: &Document) -> bool {
        let field = |matcher: &Option<GlobMatcher>, value: &str| {
            matcher.as_ref().map_or(true, |m| m.is_match(value))
        };
        field(&self.kind, document.kind())
            && field(&self.name, document.name())
            && field(&self.namespace, document.namespace())
    }
}

/// Shared state of the evaluation phase
#[derive(Default)]
struct Accumulator {
    findings: Vec<(usize, Vec<Finding>)>,
    errors: Vec<(usize, UnitError)>,
    timings: BTreeMap<String, RuleTiming>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking rule must not hide the findings of the others
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The main linter engine
pub struct Engine {
    registry: Registry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// An engine over a fresh registry of built-in rules
    pub fn with_builtins() -> Self {
        Self::new(Registry::with_builtins())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Run every active rule over every document
    pub fn run(&mut self, documents: &[Document], options: &RunOptions) -> Result<RunReport, RunError> {
        self.run_with_cancellation(documents, options, &CancellationToken::new())
    }

    /// [`run`](Self::run), stopping early once `token` is cancelled.
    /// Findings produced before that point are still returned.
    pub fn run_with_cancellation(
        &mut self,
        documents: &[Document],
        options: &RunOptions,
        token: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let start = Instant::now();
        let token = token.child(options.timeout);

        let filters = options
            .exclude
            .iter()
            .map(CompiledFilter::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.effective_concurrency())
            .build()
            .map_err(SetupError::from)?;
        let active = self.setup(options)?;

        let selected: Vec<&Document> = documents
            .iter()
            .filter(|d| !filters.iter().any(|f| f.matches(d)))
            .collect();
        let rules: Vec<&dyn Rule> = active
            .iter()
            .filter_map(|name| self.registry.get(name))
            .collect();

        info!(
            "Running {} rule(s) over {} document(s) with concurrency {}",
            rules.len(),
            selected.len(),
            options.effective_concurrency()
        );

        let context = LintContext::new(documents);
        let (mut report, errors) = pool.install(|| evaluate(&selected, &rules, &context, &token));

        report.rules = active;
        report.excluded = documents.len() - selected.len();
        report.duration = start.elapsed();

        if errors.is_empty() {
            Ok(report)
        } else {
            Err(RunError::Evaluation(Box::new(EvaluationFailure { errors, report })))
        }
    }

    /// Register custom rules, select the active set and configure it.
    /// Returns the active rule names, sorted.
    ///
    /// New and reconfigured rules are staged and only committed to the
    /// registry once every step has succeeded, so a failed setup leaves
    /// the registry as it was.
    fn setup(&mut self, options: &RunOptions) -> Result<Vec<String>, SetupError> {
        let mut staged: BTreeMap<String, Box<dyn Rule>> = BTreeMap::new();

        for (index, declaration) in options.custom_rules.iter().enumerate() {
            if declaration.name.is_empty() {
                return Err(SetupError::IncompleteCustomRule { index, field: "name" });
            }
            if declaration.kind.is_empty() {
                return Err(SetupError::IncompleteCustomRule { index, field: "type" });
            }

            let mut rule = self
                .registry
                .create_rule(&declaration.kind, &declaration.name, &declaration.description)
                .map_err(|source| SetupError::CustomRule {
                    name: declaration.name.clone(),
                    source,
                })?;
            if let Some(settings) = &declaration.settings {
                rule.configure(settings).map_err(|source| SetupError::Configure {
                    name: declaration.name.clone(),
                    source,
                })?;
            }
            debug!("Prepared custom {} rule '{}'", declaration.kind, declaration.name);
            staged.insert(declaration.name.clone(), rule);
        }

        let referenced = options
            .enabled
            .iter()
            .chain(&options.disabled)
            .chain(options.settings.keys());
        for name in referenced {
            if !staged.contains_key(name) && !self.registry.contains(name) {
                return Err(SetupError::UnknownRule(name.clone()));
            }
        }

        let enabled: BTreeSet<&str> = options.enabled.iter().map(String::as_str).collect();
        let disabled: BTreeSet<&str> = options.disabled.iter().map(String::as_str).collect();
        let mut known: BTreeSet<&str> = self.registry.names().into_iter().collect();
        known.extend(staged.keys().map(String::as_str));
        let active: Vec<String> = known
            .into_iter()
            .filter(|name| enabled.is_empty() || enabled.contains(name))
            .filter(|name| !disabled.contains(name))
            .map(str::to_string)
            .collect();

        for name in &active {
            let Some(settings) = options.settings.get(name) else {
                continue;
            };
            if !staged.contains_key(name) {
                let Some(rule) = self.registry.get(name) else {
                    continue;
                };
                staged.insert(name.clone(), rule.clone_box());
            }
            if let Some(rule) = staged.get_mut(name) {
                rule.configure(settings).map_err(|source| SetupError::Configure {
                    name: name.clone(),
                    source,
                })?;
            }
        }

        debug!("Committing {} new or reconfigured rule(s)", staged.len());
        for rule in staged.into_values() {
            self.registry.register(rule);
        }

        debug!("Active rules: {}", active.join(", "));
        Ok(active)
    }
}

/// Evaluate every unit on the current pool
fn evaluate(
    documents: &[&Document],
    rules: &[&dyn Rule],
    context: &LintContext<'_>,
    token: &CancellationToken,
) -> (RunReport, Vec<UnitError>) {
    let accumulator = Mutex::new(Accumulator::default());
    let skipped = AtomicUsize::new(0);
    let units = documents.len() * rules.len();

    (0..units).into_par_iter().for_each(|unit| {
        if token.is_cancelled() {
            skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let document = documents[unit / rules.len()];
        let rule = rules[unit % rules.len()];

        let started = Instant::now();
        let result = rule.lint(document, context);
        let elapsed = started.elapsed();

        let mut guard = lock(&accumulator);
        let acc = &mut *guard;
        let timing = acc
            .timings
            .entry(rule.name().to_string())
            .or_insert_with(|| RuleTiming::new(rule.name()));
        timing.total_time += elapsed;
        timing.evaluation_count += 1;

        match result {
            Ok(findings) => {
                timing.finding_count += findings.len();
                if !findings.is_empty() {
                    acc.findings.push((unit, findings));
                }
            }
            Err(source) => {
                warn!("Rule '{}' failed on {}: {}", rule.name(), document, source);
                acc.errors.push((
                    unit,
                    UnitError {
                        rule: rule.name().to_string(),
                        kind: document.kind().to_string(),
                        name: document.name().to_string(),
                        namespace: document.namespace().to_string(),
                        source,
                    },
                ));
            }
        }
    });

    let acc = accumulator.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    let skipped_units = skipped.into_inner();
    if skipped_units > 0 {
        warn!("Run cancelled, {} of {} unit(s) skipped", skipped_units, units);
    }

    let mut batches = acc.findings;
    batches.sort_by_key(|(unit, _)| *unit);
    let mut findings: Vec<Finding> = batches.into_iter().flat_map(|(_, f)| f).collect();
    findings.sort_by(Finding::report_order);

    let mut errors = acc.errors;
    errors.sort_by_key(|(unit, _)| *unit);

    let report = RunReport {
        summary: Summary::from_findings(&findings),
        findings,
        documents: documents.len(),
        skipped_units,
        cancelled: skipped_units > 0,
        rule_timings: acc.timings.into_values().collect(),
        ..RunReport::default()
    };
    (report, errors.into_iter().map(|(_, e)| e).collect())
}
