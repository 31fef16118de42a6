//! Runs the configured metrics over a test case.

use crate::config::JudgeConfig;
use crate::judge::metrics::{metric_set, Metric};
use crate::llm::ChatModel;
use crate::models::{MetricResult, ModelEvaluation, TestCase};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// LLM-as-judge scorer for conversational test cases.
pub struct ConversationJudge {
    model: Arc<dyn ChatModel>,
    metrics: Vec<Metric>,
    threshold: f64,
    window_size: usize,
}

impl ConversationJudge {
    pub fn new(model: Arc<dyn ChatModel>, config: &JudgeConfig) -> Self {
        Self {
            model,
            metrics: metric_set(config.use_all_metrics),
            threshold: config.threshold,
            window_size: config.window_size,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn metric_names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.name).collect()
    }

    /// Score every metric concurrently. A metric that fails is recorded
    /// with its error and no score; the others are unaffected.
    pub async fn evaluate(&self, case: &TestCase) -> Vec<MetricResult> {
        let judge = self.model.as_ref();
        let calls = self.metrics.iter().map(|metric| async move {
            match metric.measure(judge, case, self.window_size).await {
                Ok(m) => {
                    debug!("{}: {:.3}", metric.name, m.score);
                    MetricResult::scored(
                        metric.name,
                        m.score,
                        self.threshold,
                        m.reason,
                        judge.model_name(),
                    )
                }
                Err(e) => {
                    warn!("Metric {} failed: {}", metric.name, e);
                    MetricResult::failed(metric.name, self.threshold, e.to_string(), judge.model_name())
                }
            }
        });
        join_all(calls).await
    }

    /// Score one model's conversation.
    pub async fn evaluate_model(
        &self,
        label: &str,
        model_name: &str,
        case: TestCase,
    ) -> ModelEvaluation {
        let metrics = self.evaluate(&case).await;
        ModelEvaluation {
            label: label.to_string(),
            model_name: model_name.to_string(),
            test_case: case,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::metrics::*;
    use crate::judge::testing::ScriptedJudge;
    use crate::models::{ConversationMetadata, Turn, MODEL_A_LABEL};

    fn config(use_all_metrics: bool) -> JudgeConfig {
        JudgeConfig {
            use_all_metrics,
            ..JudgeConfig::default()
        }
    }

    fn case() -> TestCase {
        TestCase::new(
            vec![Turn::user("Hi"), Turn::assistant("Hello! How can I help?")],
            &ConversationMetadata::default(),
        )
    }

    #[tokio::test]
    async fn test_failed_metric_does_not_stop_others() {
        let judge = Arc::new(ScriptedJudge::new(vec![
            ("retains information", r#"{"verdicts": [{"verdict": "no"}], "reason": "fine"}"#),
            ("last assistant message", r#"{"verdict": "yes"}"#),
            ("Assigned role", "I cannot answer that."),
            ("extracting what a user wants", r#"{"intentions": ["greet"]}"#),
            ("satisfied each user intention", r#"{"verdicts": [{"verdict": "yes"}]}"#),
        ]));
        let evaluator = ConversationJudge::new(judge, &config(false));
        let results = evaluator.evaluate(&case()).await;

        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![KNOWLEDGE_RETENTION, TURN_RELEVANCY, ROLE_ADHERENCE, CONVERSATION_COMPLETENESS]
        );
        assert_eq!(results[0].score, Some(1.0));
        assert!(results[0].success);
        assert_eq!(results[2].score, None);
        assert!(!results[2].success);
        assert!(results[2].error.as_deref().unwrap().contains("no JSON"));
        assert_eq!(results[3].score, Some(1.0));
        assert_eq!(results[3].evaluation_model, "scripted-judge");
    }

    #[tokio::test]
    async fn test_evaluate_model_applies_threshold() {
        let judge = Arc::new(ScriptedJudge::new(vec![
            ("Criterion:", r#"{"score": 4, "reason": "weak"}"#),
            ("retains information", r#"{"verdicts": []}"#),
            ("last assistant message", r#"{"verdict": "yes"}"#),
            ("Assigned role", r#"{"out_of_character": []}"#),
            ("extracting what a user wants", r#"{"intentions": []}"#),
        ]));
        let evaluator = ConversationJudge::new(judge, &config(true));
        assert_eq!(evaluator.metric_names().len(), 7);

        let evaluation = evaluator.evaluate_model(MODEL_A_LABEL, "base", case()).await;
        assert_eq!(evaluation.label, MODEL_A_LABEL);
        let coherence = evaluation.metric(COHERENCE).unwrap();
        assert_eq!(coherence.score, Some(0.4));
        assert!(!coherence.success);
        assert!(evaluation.metric(ROLE_ADHERENCE).unwrap().success);
        assert_eq!(evaluation.metrics.len(), 7);
    }
}
