//! Condensed JSON views of a results file.

use crate::analysis::{
    compare_metrics, conversation_wins, round_to, run_averages, Comparison, WinCounts,
};
use crate::models::{
    ArenaVerdict, EvaluationMode, EvaluationRun, ModelEvaluation, Turn, Winner,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// Reasons longer than this are cut in condensed outputs.
pub const MAX_REASON_CHARS: usize = 300;

fn clip_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_CHARS).collect()
}

/// One metric in the metrics-only view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub score: Option<f64>,
    pub pass: bool,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn metric_summaries(evaluation: &ModelEvaluation) -> IndexMap<String, MetricSummary> {
    evaluation
        .metrics
        .iter()
        .map(|m| {
            (
                m.name.clone(),
                MetricSummary {
                    score: m.score.map(|s| round_to(s, 4)),
                    pass: m.success,
                    reason: m.reason.as_deref().map(clip_reason),
                    error: m.error.clone(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMetrics {
    pub test_case_name: String,
    pub model_a_metrics: IndexMap<String, MetricSummary>,
    pub model_b_metrics: IndexMap<String, MetricSummary>,
    pub comparison: Comparison,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arena: Option<ArenaVerdict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallComparison {
    pub average_score_model_a: f64,
    pub average_score_model_b: f64,
    pub winner: Winner,
    pub conversation_wins: WinCounts,
}

/// `<stem>_metrics_only.json`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsOnly {
    pub test_name: String,
    pub timestamp: DateTime<Utc>,
    pub mode: EvaluationMode,
    pub judge_model: String,
    pub conversations: Vec<ConversationMetrics>,
    pub overall_comparison: OverallComparison,
}

/// Build the metrics-only view of a run.
pub fn metrics_only(run: &EvaluationRun) -> MetricsOnly {
    let conversations = run
        .conversations
        .iter()
        .map(|c| ConversationMetrics {
            test_case_name: c.test_case_name.clone(),
            model_a_metrics: metric_summaries(&c.model_a_evaluation),
            model_b_metrics: metric_summaries(&c.model_b_evaluation),
            comparison: compare_metrics(&c.model_a_evaluation, &c.model_b_evaluation),
            arena: c.arena.clone(),
        })
        .collect();

    let (avg_a, avg_b) = run_averages(run);
    let average_score_model_a = round_to(avg_a.unwrap_or(0.0), 4);
    let average_score_model_b = round_to(avg_b.unwrap_or(0.0), 4);

    MetricsOnly {
        test_name: run.file.clone(),
        timestamp: run.timestamp,
        mode: run.mode,
        judge_model: run.judge_model.clone(),
        conversations,
        overall_comparison: OverallComparison {
            average_score_model_a,
            average_score_model_b,
            winner: Winner::from_difference(average_score_model_b - average_score_model_a),
            conversation_wins: conversation_wins(run),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowInput {
    pub initial_conversation: Vec<Turn>,
    pub user_query: String,
    pub scenario: Option<String>,
    pub expected_outcome: Option<String>,
    pub chatbot_role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsUsed {
    pub model_a: String,
    pub model_b: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowProcessing {
    pub mode: EvaluationMode,
    pub description: String,
    pub models_used: ModelsUsed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowOutput {
    pub model_a_conversation: Vec<Turn>,
    pub model_b_conversation: Vec<Turn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub total_metrics: usize,
    pub all_passed: bool,
    pub model_a_scores: IndexMap<String, Option<f64>>,
    pub model_b_scores: IndexMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationFlow {
    pub test_case_name: String,
    pub input: FlowInput,
    pub processing: FlowProcessing,
    pub output: FlowOutput,
    pub evaluation_summary: EvaluationSummary,
}

/// `<stem>_test_case_flow.json`: input, processing, output and scores per conversation.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseFlow {
    pub test_name: String,
    pub timestamp: DateTime<Utc>,
    pub system_prompt: Option<String>,
    pub judge_model: String,
    pub conversations: Vec<ConversationFlow>,
}

fn mode_description(mode: EvaluationMode) -> &'static str {
    match mode {
        EvaluationMode::Generate => "Generated responses on-the-fly",
        _ => "Used pre-recorded responses from the spreadsheet",
    }
}

fn scores(evaluation: &ModelEvaluation) -> IndexMap<String, Option<f64>> {
    evaluation
        .metrics
        .iter()
        .map(|m| (m.name.clone(), m.score.map(|s| round_to(s, 4))))
        .collect()
}

/// Build the test-case-flow view of a run.
pub fn test_case_flow(run: &EvaluationRun) -> TestCaseFlow {
    let conversations = run
        .conversations
        .iter()
        .map(|c| {
            let a = &c.model_a_evaluation;
            let b = &c.model_b_evaluation;
            let all_passed = a.metrics.iter().chain(&b.metrics).all(|m| m.success);
            ConversationFlow {
                test_case_name: c.test_case_name.clone(),
                input: FlowInput {
                    initial_conversation: c.initial_conversation.clone(),
                    user_query: c.user_query.clone(),
                    scenario: a.test_case.scenario.clone(),
                    expected_outcome: a.test_case.expected_outcome.clone(),
                    chatbot_role: a.test_case.chatbot_role.clone(),
                },
                processing: FlowProcessing {
                    mode: run.mode,
                    description: mode_description(run.mode).to_string(),
                    models_used: ModelsUsed {
                        model_a: a.model_name.clone(),
                        model_b: b.model_name.clone(),
                    },
                },
                output: FlowOutput {
                    model_a_conversation: a.test_case.turns.clone(),
                    model_b_conversation: b.test_case.turns.clone(),
                },
                evaluation_summary: EvaluationSummary {
                    total_metrics: a.metrics.len(),
                    all_passed,
                    model_a_scores: scores(a),
                    model_b_scores: scores(b),
                },
            }
        })
        .collect();

    TestCaseFlow {
        test_name: run.file.clone(),
        timestamp: run.timestamp,
        system_prompt: run.system_prompt.clone(),
        judge_model: run.judge_model.clone(),
        conversations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testing::sample_run;

    #[test]
    fn test_metrics_only() {
        let run = sample_run();
        let view = metrics_only(&run);

        assert_eq!(view.test_name, "support.xlsx");
        assert_eq!(view.conversations.len(), 2);
        let first = &view.conversations[0];
        assert_eq!(first.model_a_metrics["Coherence"].score, Some(0.6667));
        let reason = first.model_a_metrics["Coherence"].reason.as_deref().unwrap();
        assert_eq!(reason.chars().count(), MAX_REASON_CHARS);
        assert!(reason.chars().all(|c| c == 'r'));
        assert_eq!(first.model_b_metrics["Coherence"].reason.as_deref(), Some("clear"));
        assert_eq!(first.model_b_metrics["Turn Relevancy"].score, None);
        assert!(first.model_b_metrics["Turn Relevancy"].error.is_some());
        assert_eq!(view.overall_comparison.winner, Winner::ModelB);
        assert_eq!(view.overall_comparison.conversation_wins.model_b, 2);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["overall_comparison"]["winner"], "Model B (Finetuned)");
        assert_eq!(json["conversations"][0]["comparison"]["winner"], "Model B (Finetuned)");
    }

    #[test]
    fn test_test_case_flow() {
        let run = sample_run();
        let flow = test_case_flow(&run);
        let conv = &flow.conversations[0];

        assert_eq!(conv.input.user_query, "Where is my order?");
        assert_eq!(conv.processing.description, "Used pre-recorded responses from the spreadsheet");
        assert_eq!(conv.processing.models_used.model_b, "finetuned");
        assert_eq!(conv.output.model_a_conversation.len(), 4);
        assert!(!conv.evaluation_summary.all_passed);
        assert_eq!(conv.evaluation_summary.total_metrics, 2);
    }
}
