//! Reply generation for multi-turn conversations.

use crate::llm::client::ChatModel;
use crate::models::{Role, Turn};
use std::sync::Arc;
use tracing::{debug, warn};

/// Completes a conversation by asking one model to answer each user turn.
#[derive(Clone)]
pub struct ResponseGenerator {
    model: Arc<dyn ChatModel>,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Walk the turns and return the completed conversation.
    ///
    /// Each unanswered user turn is sent with every message before it and the
    /// reply is appended. Recorded assistant and system turns pass through.
    /// A failed call becomes an `Error: ...` reply and the walk continues.
    pub async fn generate_conversation(&self, turns: &[Turn]) -> Vec<Turn> {
        let mut conversation: Vec<Turn> = Vec::with_capacity(turns.len() * 2);

        for (i, turn) in turns.iter().enumerate() {
            conversation.push(turn.clone());

            if turn.role != Role::User {
                continue;
            }
            let answered = turns
                .get(i + 1)
                .map(|next| next.role == Role::Assistant)
                .unwrap_or(false);
            if answered {
                continue;
            }

            debug!(
                "Generating reply {} with {}",
                conversation.len(),
                self.model.model_name()
            );
            let reply = match self.model.complete(&conversation).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Error generating response with {}: {}", self.model.model_name(), e);
                    format!("Error: {}", e)
                }
            };
            conversation.push(Turn::assistant(reply));
        }

        conversation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the message count, failing on the configured call.
    struct CountingModel {
        calls: Mutex<Vec<usize>>,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl ChatModel for CountingModel {
        async fn complete(&self, messages: &[Turn]) -> Result<String, LlmError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.len());
            if Some(calls.len()) == self.fail_on_call {
                return Err(LlmError::Timeout(5));
            }
            Ok(format!("reply to {} messages", messages.len()))
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn generator(fail_on_call: Option<usize>) -> (ResponseGenerator, Arc<CountingModel>) {
        let model = Arc::new(CountingModel {
            calls: Mutex::new(Vec::new()),
            fail_on_call,
        });
        (ResponseGenerator::new(model.clone()), model)
    }

    #[tokio::test]
    async fn test_generates_reply_for_each_unanswered_user_turn() {
        let (gen, model) = generator(None);
        let turns = vec![
            Turn::system("Be brief."),
            Turn::user("Hi"),
            Turn::assistant("Hello!"),
            Turn::user("Where is my order?"),
        ];

        let conversation = gen.generate_conversation(&turns).await;

        assert_eq!(conversation.len(), 5);
        assert_eq!(conversation[2], Turn::assistant("Hello!"));
        assert_eq!(conversation[4], Turn::assistant("reply to 4 messages"));
        assert_eq!(*model.calls.lock().unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_consecutive_user_turns_each_get_a_reply() {
        let (gen, model) = generator(None);
        let conversation = gen
            .generate_conversation(&[Turn::user("one"), Turn::user("two")])
            .await;

        let roles: Vec<Role> = conversation.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(*model.calls.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_failed_call_becomes_error_reply() {
        let (gen, _) = generator(Some(1));
        let conversation = gen
            .generate_conversation(&[Turn::user("one"), Turn::user("two")])
            .await;

        assert_eq!(conversation.len(), 4);
        assert!(conversation[1].content.starts_with("Error: "));
        assert_eq!(conversation[3].content, "reply to 3 messages");
    }
}
