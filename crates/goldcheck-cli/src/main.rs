//! goldcheck - gold-baseline regression harness CLI
//!
//! ## Commands
//!
//! - `run`: build every model, run those with data, check or record golds
//! - `list`: show discovered models and their paired data files
//! - `compare`: compare two timing tables

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use goldcheck_ci::{GoldAction, Orchestrator, ProcessRunner};
use goldcheck_core::timings::render_comparison;
use goldcheck_core::{
    compare_timings, read_timings_csv, write_json, write_junit, write_timings_csv, ComparisonMode,
    HarnessConfig, ModelLocator, SuiteReport,
};

const SUITE_NAME: &str = "Performance Tests";

#[derive(Parser)]
#[command(name = "goldcheck")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run gold tests for compiled models and record performance", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "GOLDCHECK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run models, then check or record gold baselines
    Run(RunArgs),

    /// List discovered models with their data files
    List {
        /// Directories to scan for models
        #[arg(required = true)]
        directories: Vec<PathBuf>,
    },

    /// Compare two timing tables (baseline / candidate)
    Compare {
        /// Baseline timing table
        baseline: PathBuf,
        /// Candidate timing table
        candidate: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Directories to scan for models
    #[arg(required = true)]
    directories: Vec<PathBuf>,

    /// Run the gold tests and check output within loose boundaries
    #[arg(long)]
    check_golds: bool,

    /// Run the gold tests and check output to within the given tolerance
    #[arg(long, value_name = "TOL")]
    check_golds_exact: Option<f64>,

    /// Overwrite the gold test records
    #[arg(long)]
    overwrite_golds: bool,

    /// Number of runs per model
    #[arg(long)]
    runs: Option<u32>,

    /// Parallelism for the build tool and the run phase
    #[arg(short = 'j')]
    jobs: Option<usize>,

    /// Directory holding gold records
    #[arg(long)]
    gold_dir: Option<PathBuf>,

    /// Stop after building the models
    #[arg(long)]
    make_only: bool,

    /// JUnit XML report path
    #[arg(short, long, default_value = "performance.xml")]
    output: PathBuf,

    /// Also write the report as JSON
    #[arg(long)]
    json_report: Option<PathBuf>,

    /// Also write a `model,seconds` timing table
    #[arg(long)]
    timings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    goldcheck_core::init_tracing(cli.json_logs, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => cmd_run(config, args).await,
        Commands::List { directories } => cmd_list(config, &directories),
        Commands::Compare {
            baseline,
            candidate,
        } => cmd_compare(&baseline, &candidate),
    }
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    match path {
        Some(path) => HarnessConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(HarnessConfig::default()),
    }
}

/// Pick the gold action from the flags. Overwriting wins over checking.
fn gold_action(args: &RunArgs) -> Result<GoldAction> {
    if args.overwrite_golds {
        return Ok(GoldAction::Overwrite);
    }
    if let Some(tolerance) = args.check_golds_exact {
        if !tolerance.is_finite() || tolerance < 0.0 {
            bail!("--check-golds-exact must be a non-negative number, got {}", tolerance);
        }
        return Ok(GoldAction::Check {
            mode: ComparisonMode::Exact { tolerance },
        });
    }
    if args.check_golds {
        return Ok(GoldAction::Check {
            mode: ComparisonMode::Loose,
        });
    }
    Ok(GoldAction::TimeOnly)
}

fn apply_overrides(mut config: HarnessConfig, args: &RunArgs) -> Result<HarnessConfig> {
    if let Some(runs) = args.runs {
        config.run.runs = runs;
    }
    if let Some(jobs) = args.jobs {
        config.run.parallelism = jobs;
    }
    if let Some(dir) = &args.gold_dir {
        config.run.gold_dir = dir.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn cmd_run(config: HarnessConfig, args: RunArgs) -> Result<()> {
    let action = gold_action(&args)?;
    let config = apply_overrides(config, &args)?;

    let locator = ModelLocator::new(config.locator.clone())?;
    let discovered = locator.discover(&args.directories);
    if discovered.is_empty() {
        warn!("No models found under {:?}", args.directories);
    }
    info!(
        models = discovered.len(),
        with_data = discovered.iter().filter(|d| d.data.is_some()).count(),
        "Discovered models"
    );

    let orchestrator = Orchestrator::new(Arc::new(ProcessRunner), config, action);

    if args.make_only {
        let build = orchestrator
            .build_phase(&discovered)
            .await
            .context("Build phase failed")?;
        println!(
            "Built {} targets in {} batches ({:.1}s)",
            build.targets,
            build.batches,
            build.elapsed.as_secs_f64()
        );
        return Ok(());
    }

    let outcomes = orchestrator
        .execute(discovered)
        .await
        .context("Orchestration failed")?;

    let report = SuiteReport::from_outcomes(SUITE_NAME, &outcomes);
    write_junit(&args.output, &report)
        .with_context(|| format!("Failed to write {:?}", args.output))?;
    if let Some(path) = &args.json_report {
        write_json(path, &report).with_context(|| format!("Failed to write {:?}", path))?;
    }
    if let Some(path) = &args.timings {
        write_timings_csv(path, &outcomes)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }

    for case in &report.cases {
        let status = if case.skipped.is_some() {
            "-"
        } else if case.failures.is_empty() && case.errors.is_empty() {
            "✓"
        } else {
            "✗"
        };
        println!("  {} {} ({:.2}s)", status, case.name, case.time_secs);
        for failure in &case.failures {
            println!("      FAIL: {}", failure.message);
        }
        for error in &case.errors {
            println!("      ERROR: {}", error);
        }
    }
    println!();
    println!(
        "Summary: {}/{} passed, {} failed, {} errors, {} skipped ({:.2}s)",
        report.passed_count(),
        report.tests,
        report.failures,
        report.errors,
        report.skipped,
        report.time_secs
    );
    println!("Report: {}", args.output.display());

    Ok(())
}

fn cmd_list(config: HarnessConfig, directories: &[PathBuf]) -> Result<()> {
    let locator = ModelLocator::new(config.locator)?;
    for d in locator.discover(directories) {
        let data = d
            .data
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}", d.model.id, data);
    }
    Ok(())
}

fn cmd_compare(baseline: &Path, candidate: &Path) -> Result<()> {
    let a = read_timings_csv(baseline)
        .with_context(|| format!("Failed to read {:?}", baseline))?;
    let b = read_timings_csv(candidate)
        .with_context(|| format!("Failed to read {:?}", candidate))?;
    let comparison = compare_timings(&a, &b)?;
    print!("{}", render_comparison(&comparison));
    Ok(())
}
