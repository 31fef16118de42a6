//! OpenAI-compatible chat-completion client.

use crate::config::ModelConfig;
use crate::models::Turn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from chat-completion calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A chat model that turns a message list into one reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the messages and return the reply text.
    async fn complete(&self, messages: &[Turn]) -> Result<String, LlmError>;

    /// Model name, for logs and reports.
    fn model_name(&self) -> &str;
}

/// Connection settings for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    /// Variable the key was read from, for error messages.
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
}

impl ClientConfig {
    /// Settings for a compared model, reading its key from the environment.
    pub fn for_model(model: &ModelConfig, timeout_seconds: u64) -> Self {
        Self {
            api_base: model.api_base.clone(),
            api_key: std::env::var(&model.api_key_env).ok(),
            api_key_env: model.api_key_env.clone(),
            model: model.name.clone(),
            temperature: model.temperature,
            max_tokens: Some(model.max_tokens),
            timeout_seconds,
        }
    }

    /// Settings for the judge: deterministic, no reply cap.
    pub fn for_judge(judge: &crate::config::JudgeConfig) -> Self {
        Self {
            api_base: judge.api_base.clone(),
            api_key: std::env::var(&judge.api_key_env).ok(),
            api_key_env: judge.api_key_env.clone(),
            model: judge.model.clone(),
            temperature: 0.0,
            max_tokens: None,
            timeout_seconds: judge.timeout_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for `POST {api_base}/chat/completions`.
pub struct OpenAiClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout_seconds)
        } else if e.is_connect() {
            LlmError::Connect(self.config.api_base.clone())
        } else {
            LlmError::Http(e)
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[Turn]) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.config.api_key_env.clone()))?;

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(
            "Sending {} messages to {}",
            messages.len(),
            self.config.model
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, body)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no message content".into()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
