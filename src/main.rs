//! Kubelint CLI - Kubernetes Manifest Linter
//!
//! Exit codes: 0 clean, 1 errors found, 2 fatal findings, 4 warnings with
//! `--fail-on-warning`, 3 configuration or setup failure, 5 evaluation
//! failure or timeout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use kubelint::config::{parse_duration, CliOverrides, ColorMode, Config, OutputFormat, EXAMPLE_CONFIG};
use kubelint::engine::{Engine, RunError, RunReport};
use kubelint::output;
use kubelint::source::Loader;
use std::path::{Path, PathBuf};
use std::time::Duration;

const EXIT_SETUP: i32 = 3;
const EXIT_EVALUATION: i32 = 5;

#[derive(Parser)]
#[command(
    name = "kubelint",
    version,
    about = "Kubernetes Manifest Linter",
    long_about = "A fast, pluggable linter for Kubernetes manifests with built-in rules and jq-based custom rules."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint manifests
    Run(RunArgs),
    /// List available rules
    Linters,
    /// Work with configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Print version information
    Version,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Files, directories or glob patterns to lint
    #[arg(default_value = ".")]
    paths: Vec<String>,

    /// Only run these rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    enable_linter: Vec<String>,

    /// Never run these rules (comma-separated)
    #[arg(long, value_delimiter = ',')]
    disable_linter: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Maximum rule evaluations in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Give up after this long, e.g. 30s or 5m (0 = never)
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Exit with code 4 when warnings are found
    #[arg(long)]
    fail_on_warning: bool,

    /// Print per-rule timing statistics
    #[arg(long)]
    timing: bool,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Check a configuration file, including rule settings and expressions
    Validate,
    /// Write an example configuration file
    Init {
        /// Destination file
        #[arg(default_value = ".kubelint.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Yaml,
    GithubActions,
    Sarif,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
            Format::GithubActions => OutputFormat::GithubActions,
            Format::Sarif => OutputFormat::Sarif,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };
    Ok(config)
}

fn print_error(message: impl std::fmt::Display) {
    eprintln!("{}: {}", "error".red().bold(), message);
}

fn handle_run(cli: &Cli, args: &RunArgs) -> Result<i32> {
    let mut config = load_config(cli.config.as_deref())?;
    config.merge_cli(CliOverrides {
        format: args.format.map(OutputFormat::from),
        color: cli.no_color.then_some(ColorMode::Never),
        concurrency: args.concurrency,
        timeout: args.timeout,
        enable: args.enable_linter.clone(),
        disable: args.disable_linter.clone(),
    });
    config.validate()?;

    match config.output.color {
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Auto => {}
    }

    let loader = Loader::new()
        .exclude_paths(&config.exclude.paths)?
        .skip_dirs(&config.run.skip_dirs);
    let documents = loader.load(&args.paths)?;
    if cli.verbose {
        eprintln!("Linting {} document(s)...", documents.len());
    }

    let mut engine = Engine::with_builtins();
    let options = config.run_options();
    let formatter = output::formatter(config.output.format, config.output.color.enabled());

    let (report, code) = match engine.run(&documents, &options) {
        Ok(report) if report.cancelled => {
            print_error(format!(
                "run timed out, {} rule evaluation(s) skipped; results are incomplete",
                report.skipped_units
            ));
            (report, EXIT_EVALUATION)
        }
        Ok(report) => {
            let code = report.summary.exit_code(args.fail_on_warning);
            (report, code)
        }
        Err(RunError::Setup(e)) => {
            print_error(e);
            return Ok(EXIT_SETUP);
        }
        Err(RunError::Evaluation(failure)) => {
            for error in &failure.errors {
                print_error(error);
            }
            (failure.report, EXIT_EVALUATION)
        }
    };

    print!("{}", formatter.format(&report.findings)?);
    print_timings(args.timing, &report);
    Ok(code)
}

fn print_timings(enabled: bool, report: &RunReport) {
    if !enabled {
        return;
    }
    eprintln!();
    eprint!("{}", report.format_timings());
    eprintln!(
        "{} document(s), {} excluded, {} rule(s), finished in {:.2}s",
        report.documents,
        report.excluded,
        report.rules.len(),
        report.duration.as_secs_f64()
    );
}

fn handle_linters() {
    let engine = Engine::with_builtins();
    let registry = engine.registry();

    println!("{}", "Available rules:".bold());
    let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);
    for rule in registry.all() {
        println!("  {:<width$}  {}", rule.name().cyan(), rule.description(), width = width);
    }

    println!();
    println!("{}", "Custom rule types:".bold());
    for kind in registry.kinds() {
        println!("  {}", kind.cyan());
    }
}

fn handle_config_validate(cli: &Cli) -> Result<i32> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let cwd = std::env::current_dir()?;
            match Config::discover(&cwd) {
                Some(path) => path,
                None => bail!("No configuration file found (looked for .kubelint.yaml, .kubelint.yml, .kubelint.json)"),
            }
        }
    };

    let config = load_config(Some(&path))?;
    config.validate()?;

    // set rules up against an empty document set to surface bad settings
    let mut engine = Engine::with_builtins();
    if let Err(e) = engine.run(&[], &config.run_options()) {
        print_error(format!("{}: {}", path.display(), e));
        return Ok(EXIT_SETUP);
    }

    println!("{} {} is valid", "success".green().bold(), path.display());
    Ok(0)
}

fn handle_config_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} Created {}", "success".green().bold(), path.display());
    println!();
    println!("Next steps:");
    println!("  1. Review and customize the configuration");
    println!("  2. Run {} to lint your manifests", "kubelint run .".cyan());
    Ok(0)
}

fn main() {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    // Handle --no-color
    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match &cli.command {
        Commands::Run(args) => handle_run(&cli, args),
        Commands::Linters => {
            handle_linters();
            Ok(0)
        }
        Commands::Config { action } => match action {
            ConfigCommand::Validate => handle_config_validate(&cli),
            ConfigCommand::Init { path, force } => handle_config_init(path, *force),
        },
        Commands::Version => {
            println!("kubelint {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            print_error(format!("{:#}", e));
            std::process::exit(EXIT_SETUP);
        }
    }
}
