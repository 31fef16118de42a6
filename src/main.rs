//! TurnJudge - LLM-as-judge comparison of two chat models
//!
//! A CLI tool that reads multi-turn conversations from spreadsheets,
//! scores a base and a finetuned model's replies with an LLM judge and
//! writes comparison reports.
//!
//! Exit codes:
//!   0 - Success (or no --fail-below set)
//!   1 - Runtime error (config, spreadsheet, API failure, etc.)
//!   2 - Model B's average score is below --fail-below

mod analysis;
mod cli;
mod config;
mod convert;
mod judge;
mod llm;
mod loader;
mod models;
mod report;
mod runner;
mod scanner;

use anyhow::{bail, Context, Result};
use chrono::Local;
use cli::{AnalyzeArgs, Args, Command, ConvertArgs, EvaluateArgs, FormatArgs};
use config::{Config, CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up API keys from .env before clap reads env defaults
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    let log_path = match init_logging(&args) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("TurnJudge v{}", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = log_path {
        info!("Logging to {}", path.display());
    }
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .turnjudge.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize models, judge, metrics, and directories.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` overrides the
/// level. Returns the log file path when `--log-file` is set.
fn init_logging(args: &Args) -> Result<Option<PathBuf>> {
    let level = LevelFilter::from_level(args.log_level());
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let (file_layer, log_path) = if args.log_file {
        let dir = Path::new("logs");
        std::fs::create_dir_all(dir).context("Failed to create logs directory")?;
        let path = dir.join(format!(
            "turnjudge_{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file));
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to set tracing subscriber")?;

    Ok(log_path)
}

/// Dispatch the subcommand. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let config = load_config(&args)?;
    let quiet = args.quiet;

    match args.command {
        Some(Command::Evaluate(evaluate)) => run_evaluate(config, &evaluate, quiet).await,
        Some(Command::Format(format)) => run_format(&config, &format),
        Some(Command::Analyze(analyze)) => run_analyze(&config, &analyze),
        Some(Command::Convert(convert)) => run_convert(&convert),
        None => bail!("No subcommand given"),
    }
}

/// Evaluate every requested spreadsheet. Returns exit code (0 or 2).
async fn run_evaluate(mut config: Config, args: &EvaluateArgs, quiet: bool) -> Result<i32> {
    config.merge_with_args(args);

    let input_scanner = scanner::InputScanner::new(scanner::ScanConfig::from(&config.general));
    let files = input_scanner.resolve(&args.files)?;
    if files.is_empty() {
        bail!(
            "No spreadsheets to evaluate (looked in {})",
            config.general.input_dir
        );
    }

    // Handle --dry-run: load files and exit
    if args.dry_run {
        println!("\n🔍 Dry run: loading spreadsheets (no LLM calls)...");
        for file in &files {
            if let Err(e) = runner::dry_run(file, args.mode) {
                warn!("Failed to load {}: {:#}", file.display(), e);
            }
        }
        println!("\n✅ Dry run complete. No LLM calls were made.");
        return Ok(0);
    }

    println!("🤖 Initializing models...");
    println!("   Model A: {}", config.base_model.name);
    println!("   Model B: {}", config.finetuned_model.name);
    println!("   Judge: {} (threshold {})", config.judge.model, config.judge.threshold);
    println!("   Timeout: {}s", config.judge.timeout_seconds);

    let models = runner::Models::from_config(&config)?;
    let evaluation_runner = runner::EvaluationRunner::new(&config, models, quiet);

    let mut model_b_scores = Vec::new();
    let mut failed = 0;
    for file in &files {
        match evaluation_runner.evaluate_file(file, args.mode).await {
            Ok(outcome) => {
                if let (_, Some(avg)) = analysis::run_averages(&outcome.run) {
                    model_b_scores.push(avg);
                }
            }
            Err(e) => {
                failed += 1;
                error!("Failed to evaluate {}: {:#}", file.display(), e);
            }
        }
    }

    ensure_some_evaluated(files.len(), failed)?;
    println!(
        "\n✅ Evaluation complete! Results saved to: {}",
        config.general.output_dir
    );

    // Check --fail-below threshold
    if let Some(minimum) = args.fail_below {
        if let Some(average) = below_threshold(&model_b_scores, minimum) {
            eprintln!(
                "\n⛔ Model B average score {:.4} is below {:.4}. Failing (exit code 2).",
                average, minimum
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Error when every one of `total` files failed.
fn ensure_some_evaluated(total: usize, failed: usize) -> Result<()> {
    if total > 0 && failed == total {
        bail!("All {} file(s) failed to evaluate", failed);
    }
    Ok(())
}

/// Mean of the per-file Model B averages when it falls below `minimum`.
/// No scores at all count as 0.
fn below_threshold(model_b_scores: &[f64], minimum: f64) -> Option<f64> {
    let average = if model_b_scores.is_empty() {
        0.0
    } else {
        model_b_scores.iter().sum::<f64>() / model_b_scores.len() as f64
    };
    (average < minimum).then_some(average)
}

fn run_format(config: &Config, args: &FormatArgs) -> Result<i32> {
    if args.files.is_empty() {
        let dir = args
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.general.output_dir));
        println!("📝 Formatting all results in {}", dir.display());
        for path in report::format_all(&dir)? {
            println!("   ✓ Created: {}", path.display());
        }
        return Ok(0);
    }

    for file in &args.files {
        let written = report::format_results(file, args.dir.as_deref())?;
        for path in written {
            println!("   ✓ Created: {}", path.display());
        }
    }
    Ok(0)
}

fn run_analyze(config: &Config, args: &AnalyzeArgs) -> Result<i32> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.general.analysis_dir));

    for file in &args.files {
        println!("\n🚀 Analyzing {}", file.display());
        let written = report::analyze_results(file, &output)?;
        for path in written {
            println!("   ✓ Created: {}", path.display());
        }
    }
    println!("\n📁 All outputs saved in: {}", output.display());
    Ok(0)
}

fn run_convert(args: &ConvertArgs) -> Result<i32> {
    println!("🔄 Converting {}", args.input.display());
    let output = convert::convert_file(&args.input, args.output.as_deref())?;
    println!("✅ Conversion complete! Output saved to: {}", output.display());
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_uses_mean_of_files() {
        assert_eq!(below_threshold(&[0.9, 0.5], 0.6), None);
        let average = below_threshold(&[0.6, 0.5], 0.6).unwrap();
        assert!((average - 0.55).abs() < 1e-9);
        assert_eq!(below_threshold(&[0.6], 0.6), None);
        assert_eq!(below_threshold(&[], 0.1), Some(0.0));
    }

    #[test]
    fn test_ensure_some_evaluated() {
        assert!(ensure_some_evaluated(3, 2).is_ok());
        assert!(ensure_some_evaluated(2, 0).is_ok());
        let err = ensure_some_evaluated(2, 2).unwrap_err();
        assert!(err.to_string().contains("All 2 file(s) failed"));
    }
}
