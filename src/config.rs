//! Configuration system
//!
//! Reads configuration from `.kubelint.yaml`, `.kubelint.yml` or
//! `.kubelint.json`, looked up in the working directory and then in
//! `./.config/`. A path given on the command line replaces the lookup.

use crate::engine::{CustomRuleDeclaration, ResourceFilter, RunOptions, DEFAULT_CONCURRENCY};
use crate::rule::Settings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File names searched for, in order
pub const CONFIG_FILE_NAMES: [&str; 3] = [".kubelint.yaml", ".kubelint.yml", ".kubelint.json"];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Rule selection and per-rule settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintersConfig {
    /// Rules to run (empty = all)
    pub enable: Vec<String>,

    /// Rules never to run; wins over `enable`
    pub disable: Vec<String>,

    /// Settings blocks by rule name
    pub settings: BTreeMap<String, Settings>,

    /// Dynamically declared rules
    pub custom: Vec<CustomRuleDeclaration>,
}

/// Output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,

    /// Color mode
    pub color: ColorMode,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
    GithubActions,
    Sarif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Text,
        OutputFormat::Json,
        OutputFormat::Yaml,
        OutputFormat::GithubActions,
        OutputFormat::Sarif,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::GithubActions => "github-actions",
            OutputFormat::Sarif => "sarif",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "github-actions" | "github" => Ok(OutputFormat::GithubActions),
            "sarif" => Ok(OutputFormat::Sarif),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Whether to emit colour on stdout
    pub fn enabled(&self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stdout().is_terminal(),
        }
    }
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorMode::Auto),
            "always" => Ok(ColorMode::Always),
            "never" => Ok(ColorMode::Never),
            _ => Err(format!("Unknown color mode: {}", s)),
        }
    }
}

/// Resources and files to leave out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExcludeConfig {
    /// Documents matching any filter are not linted
    pub resources: Vec<ResourceFilter>,

    /// Glob patterns of manifest files not to load
    pub paths: Vec<String>,
}

/// Run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum (document, rule) pairs evaluated at once
    pub concurrency: usize,

    /// Give up after this long (0 = never)
    #[serde(with = "duration")]
    pub timeout: Duration,

    /// Directory names never descended into
    pub skip_dirs: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(5 * 60),
            skip_dirs: Vec::new(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub linters: LintersConfig,
    pub output: OutputConfig,
    pub exclude: ExcludeConfig,
    pub run: RunConfig,
}

/// Command-line values that replace or extend file values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub format: Option<OutputFormat>,
    pub color: Option<ColorMode>,
    pub concurrency: Option<usize>,
    pub timeout: Option<Duration>,
    /// Replaces `linters.enable` when non-empty
    pub enable: Vec<String>,
    /// Added to `linters.disable`
    pub disable: Vec<String>,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };
        Ok(config)
    }

    /// First configuration file found under `dir`, then `dir/.config`
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        [dir.to_path_buf(), dir.join(".config")]
            .iter()
            .flat_map(|base| CONFIG_FILE_NAMES.iter().map(move |name| base.join(name)))
            .find(|path| path.is_file())
    }

    /// Load configuration from default locations, falling back to defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(|source| ConfigError::Read {
            path: PathBuf::from("."),
            source,
        })?;
        match Self::discover(&cwd) {
            Some(path) => {
                log::debug!("Using configuration file {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Check values that deserialize fine but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.concurrency < 1 {
            return Err(ConfigError::Invalid(
                "run.concurrency must be at least 1".to_string(),
            ));
        }

        for (index, custom) in self.linters.custom.iter().enumerate() {
            if custom.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "linters.custom[{}]: name is required",
                    index
                )));
            }
            if custom.kind.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "linters.custom[{}] ({}): type is required",
                    index, custom.name
                )));
            }
        }

        for pattern in &self.exclude.paths {
            globset::Glob::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("exclude.paths: invalid pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(&mut self, overrides: CliOverrides) {
        if let Some(f) = overrides.format {
            self.output.format = f;
        }
        if let Some(c) = overrides.color {
            self.output.color = c;
        }
        if let Some(c) = overrides.concurrency {
            self.run.concurrency = c;
        }
        if let Some(t) = overrides.timeout {
            self.run.timeout = t;
        }
        if !overrides.enable.is_empty() {
            self.linters.enable = overrides.enable;
        }
        self.linters.disable.extend(overrides.disable);
    }

    /// What the engine needs from this configuration
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            enabled: self.linters.enable.clone(),
            disabled: self.linters.disable.clone(),
            settings: self.linters.settings.clone(),
            custom_rules: self.linters.custom.clone(),
            concurrency: self.run.concurrency,
            timeout: (!self.run.timeout.is_zero()).then_some(self.run.timeout),
            exclude: self.exclude.resources.clone(),
        }
    }
}

/// Written by `kubelint config init`
pub const EXAMPLE_CONFIG: &str = r#"# kubelint configuration
linters:
  # Rules to run. Empty runs every registered rule.
  enable: []
  # Rules never to run, even when listed in enable.
  disable: []
  settings:
    resource-limits:
      require-cpu-limit: true
      require-memory-limit: true
      exclude-namespaces: [kube-system]
    image-tags:
      disallow-latest: true
      allowed-registries: []
    required-labels:
      labels: [app.kubernetes.io/name]
  custom:
    - name: configmap-exists
      type: jq
      description: Referenced ConfigMaps must be part of the manifests
      settings:
        rules:
          - expression: >
              [.spec.template.spec.volumes[]?.configMap.name // empty]
              | any(. as $ref | $objects | any(.[]; .kind == "ConfigMap" and .metadata.name == $ref) | not)
            message: Referenced ConfigMap does not exist
            severity: error
            field: spec.template.spec.volumes

output:
  format: text   # text, json, yaml, github-actions, sarif
  color: auto    # auto, always, never

exclude:
  resources:
    - kind: Secret
      namespace: kube-system
  paths: []

run:
  concurrency: 4
  timeout: 5m
"#;

/// Parse a duration such as `300ms`, `30s`, `5m`, `1h30m` or `1.5s`.
/// A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0.0_f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration '{}'", input));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration '{}'", input))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration '{}'", input)),
            unit => return Err(format!("unknown unit '{}' in duration '{}'", unit, input)),
        };
        rest = &rest[unit_len..];
        total += value * seconds;
    }

    Ok(Duration::from_secs_f64(total))
}

/// Render a duration the way [`parse_duration`] reads it
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let mut secs = duration.as_secs();
    let mut out = String::new();
    for (unit, size) in [("h", 3600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}

/// Serde adapter: durations as strings, or integer seconds
mod duration {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
