//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.turnjudge.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".turnjudge.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model A (base) settings.
    #[serde(default = "default_base_model")]
    pub base_model: ModelConfig,

    /// Model B (finetuned) settings.
    #[serde(default = "default_finetuned_model")]
    pub finetuned_model: ModelConfig,

    /// Judge settings.
    #[serde(default)]
    pub judge: JudgeConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory scanned for spreadsheets when no files are given.
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Directory for results and generated workbooks.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory for `analyze` outputs.
    #[serde(default = "default_analysis_dir")]
    pub analysis_dir: String,

    /// System prompt file.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            analysis_dir: default_analysis_dir(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_input_dir() -> String {
    "input".to_string()
}

fn default_output_dir() -> String {
    "evaluation_result".to_string()
}

fn default_analysis_dir() -> String {
    "analysis_output".to_string()
}

fn default_system_prompt() -> String {
    "system_prompt.txt".to_string()
}

/// Settings for one of the compared chat models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name sent to the API.
    pub name: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Temperature for generation.
    #[serde(default = "default_model_temperature")]
    pub temperature: f32,

    /// Maximum tokens in a reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_model() -> ModelConfig {
    ModelConfig {
        name: "gpt-3.5-turbo".to_string(),
        api_base: default_api_base(),
        api_key_env: default_api_key_env(),
        temperature: default_model_temperature(),
        max_tokens: default_max_tokens(),
    }
}

fn default_finetuned_model() -> ModelConfig {
    ModelConfig {
        name: "ft:gpt-3.5-turbo:your-org:custom-model:id".to_string(),
        ..default_base_model()
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

/// LLM-as-judge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Judge model name.
    #[serde(default = "default_judge_model")]
    pub model: String,

    /// OpenAI-compatible API base URL for the judge.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the judge API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Pass threshold for every metric.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Sliding window size for turn relevancy.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Use all seven metrics (true) or only the four built-in ones (false).
    #[serde(default = "default_true")]
    pub use_all_metrics: bool,

    /// Run a pairwise arena comparison for each conversation.
    #[serde(default)]
    pub arena: bool,

    /// Request timeout in seconds, shared by models and judge.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            threshold: default_threshold(),
            window_size: default_window_size(),
            use_all_metrics: true,
            arena: false,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_judge_model() -> String {
    "gpt-4.1-nano".to_string()
}

fn default_threshold() -> f64 {
    0.5
}

fn default_window_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            base_model: default_base_model(),
            finetuned_model: default_finetuned_model(),
            judge: JudgeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge the `evaluate` arguments into this configuration.
    ///
    /// Only values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::EvaluateArgs) {
        if let Some(ref judge) = args.judge {
            self.judge.model = judge.clone();
        }
        if let Some(ref api_base) = args.api_base {
            self.judge.api_base = api_base.clone();
            self.base_model.api_base = api_base.clone();
            self.finetuned_model.api_base = api_base.clone();
        }
        if let Some(ref model) = args.model_a {
            self.base_model.name = model.clone();
        }
        if let Some(ref model) = args.model_b {
            self.finetuned_model.name = model.clone();
        }
        if let Some(metrics) = args.metrics {
            self.judge.use_all_metrics = metrics == crate::cli::MetricSet::All;
        }
        if let Some(threshold) = args.threshold {
            self.judge.threshold = threshold;
        }
        if let Some(timeout) = args.timeout {
            self.judge.timeout_seconds = timeout;
        }
        if args.arena {
            self.judge.arena = true;
        }
        if let Some(ref system_prompt) = args.system_prompt {
            self.general.system_prompt = system_prompt.display().to_string();
        }
        if let Some(ref output) = args.output {
            self.general.output_dir = output.display().to_string();
        }
        if let Some(ref input_dir) = args.input_dir {
            self.general.input_dir = input_dir.display().to_string();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
