//! Pairwise comparison of both models' conversations.

use crate::judge::metrics::render_turns;
use crate::judge::parse::{parse_reply, JudgeError};
use crate::llm::ChatModel;
use crate::models::{ArenaVerdict, TestCase, Turn, Winner};
use serde::Deserialize;
use std::sync::Arc;

pub const ARENA_CRITERIA: &str =
    "Which conversation is more helpful, coherent, and demonstrates better understanding of context?";

#[derive(Debug, Deserialize)]
struct ArenaReply {
    winner: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Asks the judge to pick the better of two conversations.
pub struct ArenaJudge {
    model: Arc<dyn ChatModel>,
    criteria: String,
}

impl ArenaJudge {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            criteria: ARENA_CRITERIA.to_string(),
        }
    }

    pub async fn compare(&self, a: &TestCase, b: &TestCase) -> Result<ArenaVerdict, JudgeError> {
        let prompt = format!(
            r#"You are comparing two AI assistants that answered the same user.

Criteria: {criteria}

Conversation from Model A:
{a}

Conversation from Model B:
{b}

Pick the conversation that better meets the criteria, or "Tie" if neither is better.
Respond only with JSON: {{"winner": "Model A" or "Model B" or "Tie", "reason": "<why>"}}"#,
            criteria = self.criteria,
            a = render_turns(&a.turns),
            b = render_turns(&b.turns),
        );

        let reply = self.model.complete(&[Turn::user(prompt)]).await?;
        let reply: ArenaReply = parse_reply(&reply)?;
        let winner = parse_winner(&reply.winner)
            .ok_or_else(|| JudgeError::Shape(format!("unknown winner '{}'", reply.winner)))?;

        Ok(ArenaVerdict {
            winner,
            reason: reply.reason.unwrap_or_default(),
            criteria: self.criteria.clone(),
        })
    }
}

fn parse_winner(text: &str) -> Option<Winner> {
    let text = text.trim().to_lowercase();
    if text.contains("tie") {
        Some(Winner::Tie)
    } else if text == "a" || text.starts_with("model a") {
        Some(Winner::ModelA)
    } else if text == "b" || text.starts_with("model b") {
        Some(Winner::ModelB)
    } else {
        None
    }
}
