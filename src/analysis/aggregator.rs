//! Score aggregation and model comparison.
//!
//! This module provides utilities for comparing Model A and Model B on one
//! conversation and for averaging metrics across a whole run.

use crate::models::{ConversationResult, EvaluationRun, ModelEvaluation, Winner};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Per-metric comparison of both models on one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub model_a: f64,
    pub model_b: f64,
    /// `model_b - model_a`.
    pub difference: f64,
    /// Difference relative to Model A, 0 when Model A scored 0.
    pub improvement_percentage: f64,
    pub winner: Winner,
}

/// Comparison of both models on one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub average_score_model_a: f64,
    pub average_score_model_b: f64,
    pub winner: Winner,
    pub metric_comparison: IndexMap<String, MetricComparison>,
}

/// Compare two evaluations metric by metric.
///
/// Scores are rounded to 4 places before comparing. Only Model A's metrics
/// are walked, so a metric Model B alone reports is ignored. Per-metric
/// entries need both scores.
pub fn compare_metrics(a: &ModelEvaluation, b: &ModelEvaluation) -> Comparison {
    let mut a_scores = Vec::new();
    let mut b_scores = Vec::new();
    let mut metric_comparison = IndexMap::new();

    for metric in &a.metrics {
        let a_score = metric.score.map(|s| round_to(s, 4));
        let b_score = b.metric(&metric.name).and_then(|m| m.score).map(|s| round_to(s, 4));

        if let Some(s) = a_score {
            a_scores.push(s);
        }
        if let Some(s) = b_score {
            b_scores.push(s);
        }

        if let (Some(a_score), Some(b_score)) = (a_score, b_score) {
            let difference = round_to(b_score - a_score, 4);
            let improvement_percentage = if a_score > 0.0 {
                round_to(difference / a_score * 100.0, 2)
            } else {
                0.0
            };
            metric_comparison.insert(
                metric.name.clone(),
                MetricComparison {
                    model_a: a_score,
                    model_b: b_score,
                    difference,
                    improvement_percentage,
                    winner: Winner::from_difference(difference),
                },
            );
        }
    }

    let average_score_model_a = mean(&a_scores).map(|v| round_to(v, 4)).unwrap_or(0.0);
    let average_score_model_b = mean(&b_scores).map(|v| round_to(v, 4)).unwrap_or(0.0);

    Comparison {
        average_score_model_a,
        average_score_model_b,
        winner: Winner::from_difference(average_score_model_b - average_score_model_a),
        metric_comparison,
    }
}

/// Winner of one conversation by average score.
pub fn conversation_winner(conversation: &ConversationResult) -> Winner {
    compare_metrics(
        &conversation.model_a_evaluation,
        &conversation.model_b_evaluation,
    )
    .winner
}

/// Mean score of one metric across a run, for both models.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricAverage {
    pub metric: String,
    pub model_a_avg: f64,
    pub model_b_avg: f64,
    /// `model_b_avg - model_a_avg`.
    pub difference: f64,
    pub better: Winner,
}

impl MetricAverage {
    /// "Model A", "Model B" or "Equivalent".
    pub fn better_performer(&self) -> &'static str {
        match self.better {
            Winner::ModelA => "Model A",
            Winner::ModelB => "Model B",
            Winner::Tie => "Equivalent",
        }
    }
}

/// Per-metric averages in first-seen metric order.
///
/// Missing scores are skipped; a metric is left out when one side has no score at all.
pub fn metric_averages(run: &EvaluationRun) -> Vec<MetricAverage> {
    run.metric_names()
        .into_iter()
        .filter_map(|name| {
            let scores = |model_b: bool| -> Vec<f64> {
                run.conversations
                    .iter()
                    .map(|c| {
                        if model_b {
                            &c.model_b_evaluation
                        } else {
                            &c.model_a_evaluation
                        }
                    })
                    .filter_map(|e| e.metric(&name).and_then(|m| m.score))
                    .collect()
            };
            let model_a_avg = mean(&scores(false))?;
            let model_b_avg = mean(&scores(true))?;
            let difference = model_b_avg - model_a_avg;
            Some(MetricAverage {
                better: Winner::from_difference(difference),
                metric: name,
                model_a_avg,
                model_b_avg,
                difference,
            })
        })
        .collect()
}

/// How often each side came out ahead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WinCounts {
    pub model_a: usize,
    pub model_b: usize,
    pub ties: usize,
}

impl WinCounts {
    pub fn total(&self) -> usize {
        self.model_a + self.model_b + self.ties
    }

    fn record(&mut self, winner: Winner) {
        match winner {
            Winner::ModelA => self.model_a += 1,
            Winner::ModelB => self.model_b += 1,
            Winner::Tie => self.ties += 1,
        }
    }

    /// Share of Model B wins, in percent.
    pub fn model_b_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.model_b as f64 / self.total() as f64 * 100.0
        }
    }

    /// Overall verdict: whichever side leads more often.
    pub fn leader(&self) -> Winner {
        Winner::from_difference(self.model_b as f64 - self.model_a as f64)
    }
}

/// Count the metrics each model leads.
pub fn win_counts(averages: &[MetricAverage]) -> WinCounts {
    let mut counts = WinCounts::default();
    for avg in averages {
        counts.record(avg.better);
    }
    counts
}

/// Count conversation-level wins by average score.
pub fn conversation_wins(run: &EvaluationRun) -> WinCounts {
    let mut counts = WinCounts::default();
    for conversation in &run.conversations {
        counts.record(conversation_winner(conversation));
    }
    counts
}

/// Mean of the per-conversation average scores, for Model A and Model B.
pub fn run_averages(run: &EvaluationRun) -> (Option<f64>, Option<f64>) {
    let a: Vec<f64> = run
        .conversations
        .iter()
        .filter_map(|c| c.model_a_evaluation.average_score())
        .collect();
    let b: Vec<f64> = run
        .conversations
        .iter()
        .filter_map(|c| c.model_b_evaluation.average_score())
        .collect();
    (mean(&a), mean(&b))
}

/// The `n` metrics where Model B gained most over Model A.
pub fn top_improvements(averages: &[MetricAverage], n: usize) -> Vec<&MetricAverage> {
    let mut sorted: Vec<&MetricAverage> = averages.iter().collect();
    sorted.sort_by(|x, y| y.difference.total_cmp(&x.difference));
    sorted.truncate(n);
    sorted
}

/// The `n` metrics where Model B gained least (or lost most).
pub fn top_regressions(averages: &[MetricAverage], n: usize) -> Vec<&MetricAverage> {
    let mut sorted: Vec<&MetricAverage> = averages.iter().collect();
    sorted.sort_by(|x, y| x.difference.total_cmp(&y.difference));
    sorted.truncate(n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvaluationMode, MetricResult, TestCase, MODEL_A_LABEL, MODEL_B_LABEL};
    use chrono::Utc;

    fn evaluation(label: &str, scores: &[(&str, Option<f64>)]) -> ModelEvaluation {
        ModelEvaluation {
            label: label.to_string(),
            model_name: "m".to_string(),
            test_case: TestCase::default(),
            metrics: scores
                .iter()
                .map(|(name, score)| match score {
                    Some(s) => MetricResult::scored(*name, *s, 0.5, None, "judge"),
                    None => MetricResult::failed(*name, 0.5, "boom", "judge"),
                })
                .collect(),
        }
    }

    fn conversation(a: &[(&str, Option<f64>)], b: &[(&str, Option<f64>)]) -> ConversationResult {
        ConversationResult {
            test_case_name: "t".to_string(),
            row_index: 0,
            user_query: "q".to_string(),
            initial_conversation: Vec::new(),
            model_a_evaluation: evaluation(MODEL_A_LABEL, a),
            model_b_evaluation: evaluation(MODEL_B_LABEL, b),
            arena: None,
        }
    }

    fn run(conversations: Vec<ConversationResult>) -> EvaluationRun {
        EvaluationRun {
            file: "f.xlsx".to_string(),
            mode: EvaluationMode::Prerecorded,
            timestamp: Utc::now(),
            judge_model: "judge".to_string(),
            system_prompt: None,
            total_conversations: conversations.len(),
            conversations,
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(12.3456, 2), 12.35);
    }

    #[test]
    fn test_compare_metrics() {
        let a = evaluation(MODEL_A_LABEL, &[("Coherence", Some(0.5)), ("Helpfulness", Some(0.0)), ("Turn Relevancy", None)]);
        let b = evaluation(MODEL_B_LABEL, &[("Coherence", Some(0.75)), ("Helpfulness", Some(0.5)), ("Turn Relevancy", Some(1.0))]);
        let cmp = compare_metrics(&a, &b);

        let coherence = &cmp.metric_comparison["Coherence"];
        assert_eq!(coherence.difference, 0.25);
        assert_eq!(coherence.improvement_percentage, 50.0);
        assert_eq!(coherence.winner, Winner::ModelB);
        assert_eq!(cmp.metric_comparison["Helpfulness"].improvement_percentage, 0.0);
        assert!(!cmp.metric_comparison.contains_key("Turn Relevancy"));

        assert_eq!(cmp.average_score_model_a, 0.25);
        assert_eq!(cmp.average_score_model_b, 0.75);
        assert_eq!(cmp.winner, Winner::ModelB);
    }

    #[test]
    fn test_compare_metrics_tie() {
        let a = evaluation(MODEL_A_LABEL, &[("Coherence", Some(0.8))]);
        let b = evaluation(MODEL_B_LABEL, &[("Coherence", Some(0.80001))]);
        assert_eq!(compare_metrics(&a, &b).winner, Winner::Tie);
    }

    #[test]
    fn test_compare_metrics_ignores_model_b_only_metrics() {
        let a = evaluation(MODEL_A_LABEL, &[("Coherence", Some(0.5))]);
        let b = evaluation(MODEL_B_LABEL, &[("Coherence", Some(0.5)), ("Helpfulness", Some(1.0))]);
        let cmp = compare_metrics(&a, &b);

        assert_eq!(cmp.average_score_model_b, 0.5);
        assert_eq!(cmp.winner, Winner::Tie);
        assert_eq!(cmp.metric_comparison.len(), 1);
    }

    #[test]
    fn test_metric_averages_small_gain_is_not_equivalent() {
        let r = run(vec![conversation(&[("Coherence", Some(0.5))], &[("Coherence", Some(0.5004))])]);
        let averages = metric_averages(&r);
        assert_eq!(averages[0].better, Winner::ModelB);
        assert_eq!(averages[0].better_performer(), "Model B");
        assert_eq!(win_counts(&averages).model_b, 1);
    }

    #[test]
    fn test_metric_averages_skip_missing() {
        let r = run(vec![
            conversation(&[("Coherence", Some(0.4)), ("Role Adherence", None)], &[("Coherence", Some(0.6)), ("Role Adherence", None)]),
            conversation(&[("Coherence", None)], &[("Coherence", Some(1.0))]),
        ]);
        let averages = metric_averages(&r);
        assert_eq!(averages.len(), 1);
        assert_eq!(averages[0].metric, "Coherence");
        assert!((averages[0].model_a_avg - 0.4).abs() < 1e-9);
        assert!((averages[0].model_b_avg - 0.8).abs() < 1e-9);
        assert_eq!(averages[0].better_performer(), "Model B");
    }

    #[test]
    fn test_win_counts_and_rankings() {
        let r = run(vec![
            conversation(
                &[("Coherence", Some(0.5)), ("Helpfulness", Some(0.9)), ("Turn Relevancy", Some(0.5))],
                &[("Coherence", Some(0.9)), ("Helpfulness", Some(0.6)), ("Turn Relevancy", Some(0.5))],
            ),
            conversation(&[("Coherence", Some(0.2))], &[("Coherence", Some(0.1))]),
        ]);
        let averages = metric_averages(&r);
        let counts = win_counts(&averages);
        assert_eq!((counts.model_a, counts.model_b, counts.ties), (1, 1, 1));
        assert_eq!(counts.leader(), Winner::Tie);

        let top = top_improvements(&averages, 1);
        assert_eq!(top[0].metric, "Coherence");
        let bottom = top_regressions(&averages, 2);
        assert_eq!(bottom[0].metric, "Helpfulness");
        assert_eq!(bottom[1].metric, "Turn Relevancy");

        let wins = conversation_wins(&r);
        assert_eq!((wins.model_a, wins.model_b, wins.ties), (1, 1, 0));
        assert_eq!(wins.model_b_rate(), 50.0);
    }

    #[test]
    fn test_run_averages() {
        let r = run(vec![
            conversation(&[("Coherence", Some(0.2))], &[("Coherence", Some(0.6))]),
            conversation(&[("Coherence", None)], &[("Coherence", Some(1.0))]),
        ]);
        let (a, b) = run_averages(&r);
        assert!((a.unwrap() - 0.2).abs() < 1e-9);
        assert!((b.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(run_averages(&run(vec![])), (None, None));
    }
}
