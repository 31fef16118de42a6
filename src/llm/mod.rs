//! Chat-model access for both compared models and the judge.

pub mod client;
pub mod generator;

pub use client::{ChatModel, ClientConfig, LlmError, OpenAiClient};
pub use generator::ResponseGenerator;
