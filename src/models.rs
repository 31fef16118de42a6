//! Data models for the conversation evaluator.
//!
//! This module contains the core data structures shared by the loader,
//! the judge, and the report writers: turns, test cases, metric results,
//! and the results file schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chatbot role that gets replaced by the system prompt when one is loaded.
pub const DEFAULT_CHATBOT_ROLE: &str = "helpful AI assistant";

/// Label used for the base model throughout the reports.
pub const MODEL_A_LABEL: &str = "Model A (Base)";

/// Label used for the finetuned model throughout the reports.
pub const MODEL_B_LABEL: &str = "Model B (Finetuned)";

/// Speaker of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl Role {
    /// Parse a role name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    /// Whether this role belongs in a conversational test case.
    pub fn is_dialogue(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

/// One utterance in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Optional per-row descriptors copied into every test case of that row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    /// Role the chatbot is expected to play.
    pub chatbot_role: Option<String>,
    /// Free-text description of the scenario under test.
    pub scenario: Option<String>,
    /// What the conversation should achieve.
    pub expected_outcome: Option<String>,
}

/// A multi-turn conversation prepared for judging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// User and assistant turns, in order.
    pub turns: Vec<Turn>,
    /// Extra context shown to the judge (the system prompt, when loaded).
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatbot_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
}

impl TestCase {
    /// Build a test case from turns, keeping only user and assistant turns.
    pub fn new(turns: Vec<Turn>, metadata: &ConversationMetadata) -> Self {
        Self {
            turns: turns.into_iter().filter(|t| t.role.is_dialogue()).collect(),
            context: Vec::new(),
            chatbot_role: metadata.chatbot_role.clone(),
            scenario: metadata.scenario.clone(),
            expected_outcome: metadata.expected_outcome.clone(),
        }
    }

    /// Attach the system prompt as judge context and, when the row carries no
    /// specific role, use it as the chatbot role.
    pub fn apply_system_prompt(&mut self, system_prompt: &str) {
        if system_prompt.is_empty() {
            return;
        }
        self.context = vec![system_prompt.to_string()];
        let uses_default = match self.chatbot_role.as_deref() {
            None => true,
            Some(role) => role.is_empty() || role == DEFAULT_CHATBOT_ROLE,
        };
        if uses_default {
            self.chatbot_role = Some(system_prompt.to_string());
        }
    }

    /// The content of the last assistant turn, if any.
    pub fn last_assistant_reply(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
    }

    /// Number of assistant turns.
    pub fn assistant_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count()
    }
}

/// How a spreadsheet is evaluated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Decide per file from its columns.
    #[default]
    Auto,
    /// Generate both models' replies on the fly.
    Generate,
    /// Use the replies recorded in the spreadsheet.
    Prerecorded,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMode::Auto => write!(f, "auto"),
            EvaluationMode::Generate => write!(f, "generate"),
            EvaluationMode::Prerecorded => write!(f, "prerecorded"),
        }
    }
}

/// Score of one metric on one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Metric name, e.g. "Knowledge Retention".
    pub name: String,
    /// Score in [0, 1], absent when the metric failed.
    pub score: Option<f64>,
    /// Pass threshold.
    pub threshold: f64,
    /// Whether the score reached the threshold.
    pub success: bool,
    /// Judge's explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error message if the metric could not be computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Judge model that produced the score.
    pub evaluation_model: String,
}

impl MetricResult {
    /// Creates a scored result.
    pub fn scored(
        name: impl Into<String>,
        score: f64,
        threshold: f64,
        reason: Option<String>,
        evaluation_model: impl Into<String>,
    ) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            name: name.into(),
            score: Some(score),
            threshold,
            success: score >= threshold,
            reason,
            error: None,
            evaluation_model: evaluation_model.into(),
        }
    }

    /// Creates a failed result.
    pub fn failed(
        name: impl Into<String>,
        threshold: f64,
        error: impl Into<String>,
        evaluation_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            score: None,
            threshold,
            success: false,
            reason: None,
            error: Some(error.into()),
            evaluation_model: evaluation_model.into(),
        }
    }

    /// Returns a pass/fail emoji.
    pub fn emoji(&self) -> &'static str {
        if self.success {
            "✅"
        } else {
            "❌"
        }
    }
}

/// Judging results for one model's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    /// Report label, e.g. "Model A (Base)".
    pub label: String,
    /// Configured model name.
    pub model_name: String,
    /// The conversation that was judged.
    pub test_case: TestCase,
    /// One entry per metric, in metric order.
    pub metrics: Vec<MetricResult>,
}

impl ModelEvaluation {
    /// Looks up a metric by name.
    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Mean of the present metric scores.
    pub fn average_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self.metrics.iter().filter_map(|m| m.score).collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

/// Which side won a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    #[serde(rename = "Model A (Base)")]
    ModelA,
    #[serde(rename = "Model B (Finetuned)")]
    ModelB,
    Tie,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::ModelA => write!(f, "{}", MODEL_A_LABEL),
            Winner::ModelB => write!(f, "{}", MODEL_B_LABEL),
            Winner::Tie => write!(f, "Tie"),
        }
    }
}

impl Winner {
    /// Winner of a B-minus-A difference.
    pub fn from_difference(difference: f64) -> Self {
        if difference > 0.0 {
            Winner::ModelB
        } else if difference < 0.0 {
            Winner::ModelA
        } else {
            Winner::Tie
        }
    }

    /// Short label used in per-metric tables.
    pub fn short(&self) -> &'static str {
        match self {
            Winner::ModelA => "Model A wins",
            Winner::ModelB => "Model B wins",
            Winner::Tie => "Tie",
        }
    }
}

/// Pairwise judgement of both conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaVerdict {
    pub winner: Winner,
    pub reason: String,
    pub criteria: String,
}

/// Evaluation of one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResult {
    /// e.g. "support.xlsx - Conversation 2".
    pub test_case_name: String,
    /// 0-based data row in the source spreadsheet.
    pub row_index: usize,
    /// Final user message of the conversation.
    pub user_query: String,
    /// Turns preceding the user query.
    #[serde(default)]
    pub initial_conversation: Vec<Turn>,
    pub model_a_evaluation: ModelEvaluation,
    pub model_b_evaluation: ModelEvaluation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arena: Option<ArenaVerdict>,
}

/// Contents of a `*_results.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    /// Source spreadsheet file name.
    pub file: String,
    /// Resolved mode (never `auto`).
    pub mode: EvaluationMode,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Judge model name.
    pub judge_model: String,
    /// First 200 characters of the system prompt.
    pub system_prompt: Option<String>,
    pub total_conversations: usize,
    pub conversations: Vec<ConversationResult>,
}

impl EvaluationRun {
    /// Metric names in first-seen order across all conversations.
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for conversation in &self.conversations {
            for evaluation in [
                &conversation.model_a_evaluation,
                &conversation.model_b_evaluation,
            ] {
                for metric in &evaluation.metrics {
                    if !names.contains(&metric.name) {
                        names.push(metric.name.clone());
                    }
                }
            }
        }
        names
    }
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// Truncate to at most `max_words` whitespace-separated words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{}...", words[..max_words].join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("User"), Some(Role::User));
        assert_eq!(Role::parse(" ASSISTANT "), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), Some(Role::System));
        assert_eq!(Role::parse("tool"), None);
    }

    #[test]
    fn test_test_case_drops_system_turns() {
        let case = TestCase::new(
            vec![
                Turn::system("be nice"),
                Turn::user("hi"),
                Turn::assistant("hello"),
            ],
            &ConversationMetadata::default(),
        );
        assert_eq!(case.turns.len(), 2);
        assert_eq!(case.last_assistant_reply(), Some("hello"));
        assert_eq!(case.assistant_turns(), 1);
    }

    #[test]
    fn test_apply_system_prompt_replaces_default_role() {
        let metadata = ConversationMetadata {
            chatbot_role: Some(DEFAULT_CHATBOT_ROLE.to_string()),
            ..Default::default()
        };
        let mut case = TestCase::new(vec![Turn::user("hi")], &metadata);
        case.apply_system_prompt("You are a travel agent.");
        assert_eq!(case.context, vec!["You are a travel agent.".to_string()]);
        assert_eq!(case.chatbot_role.as_deref(), Some("You are a travel agent."));
    }

    #[test]
    fn test_apply_system_prompt_keeps_specific_role() {
        let metadata = ConversationMetadata {
            chatbot_role: Some("pirate".to_string()),
            ..Default::default()
        };
        let mut case = TestCase::new(vec![Turn::user("hi")], &metadata);
        case.apply_system_prompt("You are a travel agent.");
        assert_eq!(case.chatbot_role.as_deref(), Some("pirate"));
        assert_eq!(case.context.len(), 1);
    }

    #[test]
    fn test_metric_result_threshold() {
        let pass = MetricResult::scored("Coherence", 0.5, 0.5, None, "judge");
        assert!(pass.success);
        let fail = MetricResult::scored("Coherence", 0.49, 0.5, None, "judge");
        assert!(!fail.success);
        let clamped = MetricResult::scored("Coherence", 1.7, 0.5, None, "judge");
        assert_eq!(clamped.score, Some(1.0));
        let failed = MetricResult::failed("Coherence", 0.5, "timeout", "judge");
        assert!(!failed.success);
        assert_eq!(failed.emoji(), "❌");
    }

    #[test]
    fn test_winner_serialization() {
        assert_eq!(Winner::from_difference(0.1), Winner::ModelB);
        assert_eq!(Winner::from_difference(-0.1), Winner::ModelA);
        assert_eq!(Winner::from_difference(0.0), Winner::Tie);
        let json = serde_json::to_string(&Winner::ModelB).unwrap();
        assert_eq!(json, "\"Model B (Finetuned)\"");
    }

    #[test]
    fn test_truncation() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_words("one two three", 2), "one two...");
        assert_eq!(truncate_words("one two", 2), "one two");
    }
}
