//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::EvaluationMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TurnJudge - compare a base and a finetuned chat model with an LLM judge
///
/// Reads multi-turn conversations from spreadsheets, obtains both models'
/// replies (recorded or generated), scores them with conversational
/// metrics and writes JSON, Markdown, Excel and SVG reports.
///
/// Examples:
///   turnjudge evaluate input/support.xlsx
///   turnjudge evaluate --mode generate --metrics builtin --arena
///   turnjudge evaluate --dry-run
///   turnjudge format evaluation_result/support_results.json
///   turnjudge analyze evaluation_result/support_results.json
///   turnjudge convert input/custom.xlsx
///   turnjudge --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .turnjudge.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write the log to logs/turnjudge_<timestamp>.log
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Generate a default .turnjudge.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Evaluate spreadsheets of conversations
    Evaluate(EvaluateArgs),
    /// Turn *_results.json files into condensed JSON and Markdown views
    Format(FormatArgs),
    /// Build Excel workbooks, charts and an insights report from a results file
    Analyze(AnalyzeArgs),
    /// Convert a custom spreadsheet layout into the standard columns
    Convert(ConvertArgs),
}

/// Which metrics the judge runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MetricSet {
    /// All seven metrics
    All,
    /// Only the four built-in conversational metrics
    Builtin,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct EvaluateArgs {
    /// Spreadsheets to evaluate
    ///
    /// Bare names are also looked up in the input directory. When none are
    /// given, every spreadsheet in the input directory is evaluated.
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Evaluation mode
    #[arg(short, long, default_value = "auto")]
    pub mode: EvaluationMode,

    /// System prompt file
    #[arg(short, long, value_name = "FILE")]
    pub system_prompt: Option<PathBuf>,

    /// Judge model
    #[arg(short, long, env = "JUDGE_MODEL")]
    pub judge: Option<String>,

    /// OpenAI-compatible API base URL for models and judge
    #[arg(long, value_name = "URL", env = "OPENAI_BASE_URL")]
    pub api_base: Option<String>,

    /// Model A (base) name
    #[arg(long, value_name = "MODEL")]
    pub model_a: Option<String>,

    /// Model B (finetuned) name
    #[arg(long, value_name = "MODEL")]
    pub model_b: Option<String>,

    /// Metric set
    #[arg(long, value_name = "SET")]
    pub metrics: Option<MetricSet>,

    /// Pass threshold for every metric (0.0 - 1.0)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Also ask the judge to pick the better conversation
    #[arg(long)]
    pub arena: bool,

    /// Output directory for results
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Directory scanned for spreadsheets
    #[arg(long, value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Dry run: load and classify files without calling any model
    #[arg(long)]
    pub dry_run: bool,

    /// Fail if Model B's average score is below this value
    ///
    /// Useful for CI pipelines. Exit code 2 when the threshold is missed.
    #[arg(long, value_name = "SCORE")]
    pub fail_below: Option<f64>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct FormatArgs {
    /// Results files to format; all *_results.json in the output directory when omitted
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Directory holding the results files
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Results files to analyze
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Directory for the analysis outputs
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConvertArgs {
    /// Spreadsheet in the custom layout
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Output spreadsheet; defaults to <input>_converted.xlsx
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,
}

fn check_unit_interval(name: &str, value: Option<f64>) -> Result<(), String> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => {
            Err(format!("{} must be between 0.0 and 1.0", name))
        }
        _ => Ok(()),
    }
}

impl EvaluateArgs {
    /// Validate the evaluate arguments.
    pub fn validate(&self) -> Result<(), String> {
        check_unit_interval("Threshold", self.threshold)?;
        check_unit_interval("--fail-below", self.fail_below)?;

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate API URL format (not needed for dry-run)
        if !self.dry_run {
            if let Some(ref url) = self.api_base {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err("API base URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        // Validate input directory if provided
        if let Some(ref dir) = self.input_dir {
            if !dir.is_dir() {
                return Err(format!("Input directory does not exist: {}", dir.display()));
            }
        }

        Ok(())
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.command {
            None => Err("A subcommand is required (evaluate, format, analyze, convert)".to_string()),
            Some(Command::Evaluate(ref args)) => args.validate(),
            Some(Command::Convert(ref args)) => {
                if !args.input.is_file() {
                    return Err(format!("Input file does not exist: {}", args.input.display()));
                }
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
