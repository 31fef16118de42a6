//! Markdown report generation.
//!
//! This module renders the per-run summary written by `format` and the
//! executive insights report written by `analyze`.

use crate::analysis::{
    compare_metrics, conversation_wins, run_averages, top_improvements, top_regressions,
    win_counts, MetricAverage,
};
use crate::models::{ConversationResult, EvaluationRun, ModelEvaluation, Winner};
use chrono::Utc;

/// Generate the `<stem>_summary.md` markdown for a run.
pub fn generate_summary_markdown(run: &EvaluationRun) -> String {
    let mut output = String::new();

    output.push_str("# Evaluation Summary\n\n");
    output.push_str(&generate_metadata_section(run));
    output.push_str(&generate_input_section(run));
    output.push_str(&generate_results_section(&run.conversations));
    output.push_str(&generate_overall_section(run));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(run: &EvaluationRun) -> String {
    let mut section = String::new();

    section.push_str(&format!("- **Test:** {}\n", run.file));
    section.push_str(&format!(
        "- **Timestamp:** {}\n",
        run.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Mode:** {}\n",
        run.mode.to_string().to_uppercase()
    ));
    section.push_str(&format!("- **Judge Model:** `{}`\n", run.judge_model));
    section.push_str(&format!(
        "- **Conversations:** {}\n\n",
        run.total_conversations
    ));

    section
}

/// Generate the input section.
fn generate_input_section(run: &EvaluationRun) -> String {
    let mut section = String::new();

    section.push_str("## Input\n\n");
    let prompt_chars = run
        .system_prompt
        .as_deref()
        .map(|p| p.chars().count())
        .unwrap_or(0);
    section.push_str(&format!("**System Prompt:** {} characters\n\n", prompt_chars));

    section.push_str(&format!(
        "**User Queries:** {}\n\n",
        run.conversations.len()
    ));
    for (i, conversation) in run.conversations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, conversation.user_query));
    }
    section.push('\n');

    section
}

/// Generate the per-conversation results section.
fn generate_results_section(conversations: &[ConversationResult]) -> String {
    let mut section = String::new();

    section.push_str("## Evaluation Results\n\n");

    if conversations.is_empty() {
        section.push_str("No conversations were evaluated.\n\n");
        return section;
    }

    for conversation in conversations {
        section.push_str(&format!("### {}\n\n", conversation.test_case_name));
        section.push_str(&generate_model_block(&conversation.model_a_evaluation));
        section.push_str(&generate_model_block(&conversation.model_b_evaluation));
        section.push_str(&generate_comparison_block(conversation));
    }

    section
}

/// Generate the metric list for one model.
fn generate_model_block(evaluation: &ModelEvaluation) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "#### {} (`{}`)\n\n",
        evaluation.label, evaluation.model_name
    ));
    for metric in &evaluation.metrics {
        match metric.score {
            Some(score) => block.push_str(&format!(
                "- {} **{}**: {:.2}\n",
                metric.emoji(),
                metric.name,
                score
            )),
            None => block.push_str(&format!(
                "- {} **{}**: error ({})\n",
                metric.emoji(),
                metric.name,
                metric.error.as_deref().unwrap_or("unknown")
            )),
        }
    }
    block.push('\n');

    block
}

/// Generate the comparison table for one conversation.
fn generate_comparison_block(conversation: &ConversationResult) -> String {
    let mut block = String::new();
    let comparison = compare_metrics(
        &conversation.model_a_evaluation,
        &conversation.model_b_evaluation,
    );

    block.push_str("#### Comparison\n\n");
    block.push_str(&format!("**Winner:** {}\n\n", comparison.winner));
    block.push_str(&format!(
        "**Average Score (Model A):** {:.4}\n",
        comparison.average_score_model_a
    ));
    block.push_str(&format!(
        "**Average Score (Model B):** {:.4}\n\n",
        comparison.average_score_model_b
    ));

    if !comparison.metric_comparison.is_empty() {
        block.push_str("| Metric | Model A | Model B | Difference | Change | Result |\n");
        block.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");
        for (name, m) in &comparison.metric_comparison {
            block.push_str(&format!(
                "| {} | {:.4} | {:.4} | {:+.4} | {:+.2}% | {} |\n",
                name,
                m.model_a,
                m.model_b,
                m.difference,
                m.improvement_percentage,
                m.winner.short()
            ));
        }
        block.push('\n');
    }

    if let Some(ref arena) = conversation.arena {
        block.push_str(&format!(
            "> ⚖️ **Arena:** {} - {}\n\n",
            arena.winner, arena.reason
        ));
    }

    block
}

/// Generate the overall comparison section.
fn generate_overall_section(run: &EvaluationRun) -> String {
    let mut section = String::new();
    let (avg_a, avg_b) = run_averages(run);
    let wins = conversation_wins(run);

    section.push_str("## Overall\n\n");
    section.push_str("| | Model A (Base) | Model B (Finetuned) |\n");
    section.push_str("|:---|:---:|:---:|\n");
    section.push_str(&format!(
        "| Average Score | {} | {} |\n",
        format_score(avg_a),
        format_score(avg_b)
    ));
    section.push_str(&format!(
        "| Conversations Won | {} | {} |\n\n",
        wins.model_a, wins.model_b
    ));
    if wins.ties > 0 {
        section.push_str(&format!("Ties: {}\n\n", wins.ties));
    }
    section.push_str(&format!(
        "**Model B Win Rate:** {:.1}%\n\n",
        wins.model_b_rate()
    ));

    section
}

fn format_score(score: Option<f64>) -> String {
    score
        .map(|s| format!("{:.4}", s))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by turnjudge*\n".to_string()
}

/// Generate the executive insights report for `analyze`.
pub fn generate_insights_report(source: &str, averages: &[MetricAverage]) -> String {
    let mut report = String::new();

    report.push_str("# Executive Insights Report\n\n");
    report.push_str(&format!(
        "- **Generated:** {}\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("- **Source:** {}\n\n", source));

    if averages.is_empty() {
        report.push_str("No metric was scored for both models.\n");
        return report;
    }

    let counts = win_counts(averages);
    let total = counts.total();
    let pct = |n: usize| n as f64 / total as f64 * 100.0;

    report.push_str("## 📊 Overall Performance\n\n");
    report.push_str(&format!("- Total Metrics Evaluated: {}\n", total));
    report.push_str(&format!(
        "- Model B Scores Higher: {} ({:.1}%)\n",
        counts.model_b,
        pct(counts.model_b)
    ));
    report.push_str(&format!(
        "- Model A Scores Higher: {} ({:.1}%)\n",
        counts.model_a,
        pct(counts.model_a)
    ));
    report.push_str(&format!(
        "- Equivalent Performance: {} ({:.1}%)\n\n",
        counts.ties,
        pct(counts.ties)
    ));

    report.push_str("## 🏆 Top 3 Improvements (Model B over Model A)\n\n");
    for (i, avg) in top_improvements(averages, 3).iter().enumerate() {
        report.push_str(&format!(
            "{}. **{}**: Model A {:.3} | Model B {:.3} | Improvement {:+.3}\n",
            i + 1,
            avg.metric,
            avg.model_a_avg,
            avg.model_b_avg,
            avg.difference
        ));
    }
    report.push('\n');

    report.push_str("## ⚠️ Areas Needing Attention\n\n");
    for (i, avg) in top_regressions(averages, 3).iter().enumerate() {
        report.push_str(&format!(
            "{}. **{}**: Model A {:.3} | Model B {:.3} | Difference {:+.3}\n",
            i + 1,
            avg.metric,
            avg.model_a_avg,
            avg.model_b_avg,
            avg.difference
        ));
    }
    report.push('\n');

    report.push_str("## 💡 Key Recommendations\n\n");
    let recommendation = match counts.leader() {
        Winner::ModelB => {
            "✅ Model B shows overall superior performance across most metrics\n\n\
             → Recommended for production deployment\n"
        }
        Winner::ModelA => {
            "⚠️ Model A outperforms Model B in majority of metrics\n\n\
             → Further finetuning of Model B recommended\n"
        }
        Winner::Tie => {
            "⚖️ Models show comparable performance\n\n\
             → Consider cost, latency, and specific use-case requirements\n"
        }
    };
    report.push_str(recommendation);

    report
}
