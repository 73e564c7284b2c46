//! # Bundler Configuration Validator
//!
//! Command-line tool that resolves the effective bundle thresholds from a
//! configuration file, `BUNDLER_*` environment overrides or job parameters,
//! and reports any fallbacks to defaults. Fallbacks are warnings, never
//! failures: the exit code is non-zero only when configuration cannot be read.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use bundler_core::config::{BundleConfig, ThresholdPolicy, ThresholdWarning, ValidatedThresholds};

#[derive(Parser)]
#[command(name = "bundler-config-validator")]
#[command(about = "Validate bundling coordinator thresholds")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON); environment overrides still apply
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration file and environment (default)
    Config,

    /// Validate job parameters given as key=value pairs
    Params {
        /// Parameter such as bundle.max-size=500
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct Report {
    source: String,
    max_bundle_size: usize,
    max_bundle_time_millis: i64,
    check_period_millis: u64,
    warnings: Vec<ThresholdWarning>,
}

impl Report {
    fn new(source: String, validated: ValidatedThresholds) -> Self {
        Self {
            source,
            max_bundle_size: validated.policy.max_items(),
            max_bundle_time_millis: validated.policy.max_age_millis(),
            check_period_millis: validated.policy.check_period().as_millis() as u64,
            warnings: validated.warnings,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Params { params }) => validate_params(params),
        Some(Commands::Config) | None => validate_config(&cli),
    }
    .and_then(|report| print_report(&report, &cli.format));

    if let Err(e) = result {
        error!("Configuration validation failed: {e:#}");
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn validate_config(cli: &Cli) -> Result<Report> {
    let config = BundleConfig::load(cli.config.as_deref())
        .context("Failed to load bundle configuration")?;

    let source = match &cli.config {
        Some(path) => format!("{} + environment", path.display()),
        None => "environment".to_string(),
    };
    Ok(Report::new(source, config.threshold_policy()))
}

fn validate_params(params: &[String]) -> Result<Report> {
    let parsed = parse_params(params)?;
    Ok(Report::new(
        "job parameters".to_string(),
        ThresholdPolicy::from_job_parameters(&parsed),
    ))
}

fn parse_params(params: &[String]) -> Result<HashMap<String, String>> {
    params
        .iter()
        .map(|param| match param.split_once('=') {
            Some((key, value)) => Ok((key.trim().to_string(), value.trim().to_string())),
            None => bail!("Parameter '{param}' is not in KEY=VALUE form"),
        })
        .collect()
}

fn print_report(report: &Report, format: &str) -> Result<()> {
    match format.to_lowercase().as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(report)
                .context("Failed to serialize validation report")?;
            println!("{json}");
        }
        "table" => print_table(report),
        other => bail!("Unknown output format: {other} (expected table or json)"),
    }
    Ok(())
}

fn print_table(report: &Report) {
    println!("🔧 Bundle Thresholds ({})", report.source);
    println!();
    println!("  {:<26} {:>12}", "Setting", "Effective");
    println!("  {:<26} {:>12}", "-".repeat(26), "-".repeat(12));
    println!("  {:<26} {:>12}", "max_bundle_size", report.max_bundle_size);
    println!(
        "  {:<26} {:>12}",
        "max_bundle_time_millis", report.max_bundle_time_millis
    );
    println!(
        "  {:<26} {:>12}",
        "check_period_millis", report.check_period_millis
    );
    println!();

    if report.warnings.is_empty() {
        println!("✅ All thresholds valid");
    } else {
        for warning in &report.warnings {
            println!("⚠️  {warning}");
        }
    }
}
