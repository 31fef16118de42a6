//! Conversational metric definitions and their judge prompts.
//!
//! Three G-Eval metrics score the whole conversation against evaluation
//! steps. The four verdict metrics ask for yes/no judgements per assistant
//! turn (or per user intention) and score the fraction that came out well.

use crate::judge::parse::{parse_reply, JudgeError, ScoredReply, Verdict, VerdictList};
use crate::llm::ChatModel;
use crate::models::{Role, TestCase, Turn, DEFAULT_CHATBOT_ROLE};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

pub const COHERENCE: &str = "Coherence";
pub const CONTEXTUAL_UNDERSTANDING: &str = "Contextual Understanding";
pub const HELPFULNESS: &str = "Helpfulness";
pub const KNOWLEDGE_RETENTION: &str = "Knowledge Retention";
pub const TURN_RELEVANCY: &str = "Turn Relevancy";
pub const ROLE_ADHERENCE: &str = "Role Adherence";
pub const CONVERSATION_COMPLETENESS: &str = "Conversation Completeness";

const COHERENCE_STEPS: &[&str] = &[
    "Evaluate whether the conversation flows logically from one turn to the next",
    "Check if responses are well-structured and easy to follow",
    "Assess if there are smooth transitions between topics",
    "Identify any abrupt changes or confusing sequences that disrupt coherence",
];

const CONTEXTUAL_UNDERSTANDING_STEPS: &[&str] = &[
    "Check if the assistant understands the full context of the conversation",
    "Verify that responses build appropriately on previous turns",
    "Identify any instances where context is misunderstood or ignored",
    "Assess whether the assistant maintains awareness of the overall conversation thread",
];

const HELPFULNESS_STEPS: &[&str] = &[
    "Determine if the responses provide practical, actionable information",
    "Assess whether the assistant addresses the user's needs effectively",
    "Check if explanations are clear and useful for the user",
    "Evaluate if the assistant goes beyond surface-level responses to truly help",
];

/// How a metric is computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricKind {
    /// Judge scores 0-10 against evaluation steps.
    GEval { steps: &'static [&'static str] },
    KnowledgeRetention,
    TurnRelevancy,
    RoleAdherence,
    ConversationCompleteness,
}

/// One conversational metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
}

/// Score and explanation produced by one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub score: f64,
    pub reason: Option<String>,
}

/// The metrics to run: all seven, or only the four built-in verdict metrics.
pub fn metric_set(use_all_metrics: bool) -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(7);
    if use_all_metrics {
        metrics.extend([
            Metric {
                name: COHERENCE,
                kind: MetricKind::GEval {
                    steps: COHERENCE_STEPS,
                },
            },
            Metric {
                name: CONTEXTUAL_UNDERSTANDING,
                kind: MetricKind::GEval {
                    steps: CONTEXTUAL_UNDERSTANDING_STEPS,
                },
            },
            Metric {
                name: HELPFULNESS,
                kind: MetricKind::GEval {
                    steps: HELPFULNESS_STEPS,
                },
            },
        ]);
    }
    metrics.extend([
        Metric {
            name: KNOWLEDGE_RETENTION,
            kind: MetricKind::KnowledgeRetention,
        },
        Metric {
            name: TURN_RELEVANCY,
            kind: MetricKind::TurnRelevancy,
        },
        Metric {
            name: ROLE_ADHERENCE,
            kind: MetricKind::RoleAdherence,
        },
        Metric {
            name: CONVERSATION_COMPLETENESS,
            kind: MetricKind::ConversationCompleteness,
        },
    ]);
    metrics
}

impl Metric {
    /// Score one test case with the judge.
    pub async fn measure(
        &self,
        judge: &dyn ChatModel,
        case: &TestCase,
        window_size: usize,
    ) -> Result<Measurement, JudgeError> {
        match self.kind {
            MetricKind::GEval { steps } => g_eval(judge, self.name, steps, case).await,
            MetricKind::KnowledgeRetention => knowledge_retention(judge, case).await,
            MetricKind::TurnRelevancy => turn_relevancy(judge, case, window_size).await,
            MetricKind::RoleAdherence => role_adherence(judge, case).await,
            MetricKind::ConversationCompleteness => conversation_completeness(judge, case).await,
        }
    }
}

async fn ask(judge: &dyn ChatModel, prompt: String) -> Result<String, JudgeError> {
    Ok(judge.complete(&[Turn::user(prompt)]).await?)
}

/// Numbered transcript, one turn per line.
pub fn render_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}: {}", i, t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_context(case: &TestCase) -> String {
    if case.context.is_empty() {
        "None".to_string()
    } else {
        case.context.join("\n\n")
    }
}

fn fraction(good: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        good as f64 / total as f64
    }
}

fn nothing_to_judge(what: &str) -> Measurement {
    Measurement {
        score: 1.0,
        reason: Some(format!("No {} to evaluate.", what)),
    }
}

async fn g_eval(
    judge: &dyn ChatModel,
    name: &str,
    steps: &[&str],
    case: &TestCase,
) -> Result<Measurement, JudgeError> {
    let steps = steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        r#"You are evaluating a multi-turn conversation between a user and an AI assistant.

Criterion: {name}

Evaluation steps:
{steps}

Context:
{context}

Conversation:
{turns}

Follow the evaluation steps and score the conversation from 0 (worst) to 10 (best).
Respond only with JSON: {{"score": <number 0-10>, "reason": "<one or two sentences>"}}"#,
        name = name,
        steps = steps,
        context = render_context(case),
        turns = render_turns(&case.turns),
    );

    let reply: ScoredReply = parse_reply(&ask(judge, prompt).await?)?;
    Ok(Measurement {
        score: reply.score.clamp(0.0, 10.0) / 10.0,
        reason: reply.reason,
    })
}

async fn knowledge_retention(
    judge: &dyn ChatModel,
    case: &TestCase,
) -> Result<Measurement, JudgeError> {
    if case.assistant_turns() == 0 {
        return Ok(nothing_to_judge("assistant turns"));
    }

    let prompt = format!(
        r#"You are checking whether an AI assistant retains information the user shared earlier in a conversation.

Context:
{context}

Conversation:
{turns}

For each assistant turn, in order, answer "yes" if the assistant forgets, contradicts, or asks again for information the user already provided, and "no" otherwise.
Respond only with JSON: {{"verdicts": [{{"verdict": "yes" or "no", "reason": "<required when yes>"}}], "reason": "<summary of the retention quality>"}}"#,
        context = render_context(case),
        turns = render_turns(&case.turns),
    );

    let reply: VerdictList = parse_reply(&ask(judge, prompt).await?)?;
    let attritions = reply.verdicts.iter().filter(|v| v.is_yes()).count();
    let total = reply.verdicts.len();
    debug!("Knowledge retention: {} of {} turns forgot something", attritions, total);

    Ok(Measurement {
        score: fraction(total - attritions, total),
        reason: reply.reason,
    })
}

/// Windows of at most `window_size` turns ending at each assistant turn.
pub fn relevancy_windows(turns: &[Turn], window_size: usize) -> Vec<&[Turn]> {
    let window_size = window_size.max(1);
    turns
        .iter()
        .enumerate()
        .filter(|(_, t)| t.role == Role::Assistant)
        .map(|(i, _)| {
            let start = (i + 1).saturating_sub(window_size);
            &turns[start..=i]
        })
        .collect()
}

async fn turn_relevancy(
    judge: &dyn ChatModel,
    case: &TestCase,
    window_size: usize,
) -> Result<Measurement, JudgeError> {
    let windows = relevancy_windows(&case.turns, window_size);
    if windows.is_empty() {
        return Ok(nothing_to_judge("assistant turns"));
    }

    let context = render_context(case);
    let calls = windows.iter().map(|window| {
        let prompt = format!(
            r#"You are judging whether the last assistant message in a conversation window is relevant.

Context:
{context}

Conversation window:
{turns}

Answer "yes" if the final assistant message is relevant and responsive to the conversation so far, "no" otherwise.
Respond only with JSON: {{"verdict": "yes" or "no", "reason": "<required when no>"}}"#,
            context = context,
            turns = render_turns(window),
        );
        async move {
            let reply = ask(judge, prompt).await?;
            parse_reply::<Verdict>(&reply)
        }
    });

    let verdicts = join_all(calls)
        .await
        .into_iter()
        .collect::<Result<Vec<Verdict>, JudgeError>>()?;

    let relevant = verdicts.iter().filter(|v| v.is_yes()).count();
    let irrelevant: Vec<String> = verdicts
        .iter()
        .filter(|v| !v.is_yes())
        .filter_map(|v| v.reason.clone())
        .collect();

    let reason = if irrelevant.is_empty() {
        format!("All {} assistant turns were relevant to the conversation.", verdicts.len())
    } else {
        format!(
            "{} of {} assistant turns were relevant. Irrelevant turns: {}",
            relevant,
            verdicts.len(),
            irrelevant.join(" ")
        )
    };

    Ok(Measurement {
        score: fraction(relevant, verdicts.len()),
        reason: Some(reason),
    })
}

#[derive(Debug, Deserialize)]
struct OutOfCharacter {
    index: usize,
    #[serde(default)]
    #[allow(dead_code)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleAdherenceReply {
    #[serde(default)]
    out_of_character: Vec<OutOfCharacter>,
    #[serde(default)]
    reason: Option<String>,
}

/// The role the assistant is held to.
pub fn expected_role(case: &TestCase) -> &str {
    case.chatbot_role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_CHATBOT_ROLE)
}

async fn role_adherence(judge: &dyn ChatModel, case: &TestCase) -> Result<Measurement, JudgeError> {
    let assistant_total = case.assistant_turns();
    if assistant_total == 0 {
        return Ok(nothing_to_judge("assistant turns"));
    }

    let prompt = format!(
        r#"You are checking whether an AI assistant stays in its assigned role throughout a conversation.

Assigned role:
{role}

Context:
{context}

Conversation:
{turns}

List every assistant turn, by its [index], that breaks character or ignores the assigned role.
Respond only with JSON: {{"out_of_character": [{{"index": <turn index>, "reason": "<why>"}}], "reason": "<summary of role adherence>"}}"#,
        role = expected_role(case),
        context = render_context(case),
        turns = render_turns(&case.turns),
    );

    let reply: RoleAdherenceReply = parse_reply(&ask(judge, prompt).await?)?;
    let breaks: HashSet<usize> = reply
        .out_of_character
        .iter()
        .map(|o| o.index)
        .filter(|&i| case.turns.get(i).map(|t| t.role == Role::Assistant).unwrap_or(false))
        .collect();

    Ok(Measurement {
        score: fraction(assistant_total - breaks.len(), assistant_total),
        reason: reply.reason,
    })
}

#[derive(Debug, Deserialize)]
struct IntentionsReply {
    #[serde(default)]
    intentions: Vec<String>,
}

async fn conversation_completeness(
    judge: &dyn ChatModel,
    case: &TestCase,
) -> Result<Measurement, JudgeError> {
    let user_turns: Vec<Turn> = case
        .turns
        .iter()
        .filter(|t| t.role == Role::User)
        .cloned()
        .collect();
    if user_turns.is_empty() {
        return Ok(nothing_to_judge("user intentions"));
    }

    let prompt = format!(
        r#"You are extracting what a user wants to achieve in a conversation with an AI assistant.

User messages:
{turns}

List the distinct intentions the user expresses, each as a short phrase.
Respond only with JSON: {{"intentions": ["<intention>"]}}"#,
        turns = render_turns(&user_turns),
    );
    let intentions: IntentionsReply = parse_reply(&ask(judge, prompt).await?)?;
    if intentions.intentions.is_empty() {
        return Ok(nothing_to_judge("user intentions"));
    }

    let listed = intentions
        .intentions
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        r#"You are judging whether an AI assistant satisfied each user intention in a conversation.

Context:
{context}

Conversation:
{turns}

User intentions:
{listed}

For each intention, in order, answer "yes" if the assistant satisfied it by the end of the conversation, "no" otherwise.
Respond only with JSON: {{"verdicts": [{{"verdict": "yes" or "no", "reason": "<required when no>"}}], "reason": "<summary of completeness>"}}"#,
        context = render_context(case),
        turns = render_turns(&case.turns),
        listed = listed,
    );
    let reply: VerdictList = parse_reply(&ask(judge, prompt).await?)?;
    let satisfied = reply.verdicts.iter().filter(|v| v.is_yes()).count();

    Ok(Measurement {
        score: fraction(satisfied, reply.verdicts.len()),
        reason: reply.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::testing::ScriptedJudge;
    use crate::models::ConversationMetadata;

    fn case(turns: Vec<Turn>) -> TestCase {
        TestCase::new(turns, &ConversationMetadata::default())
    }

    fn support_case() -> TestCase {
        case(vec![
            Turn::user("My name is Ana and my order is #42."),
            Turn::assistant("Thanks Ana, checking order #42."),
            Turn::user("When will it arrive?"),
            Turn::assistant("What was your order number again?"),
        ])
    }

    #[test]
    fn test_metric_sets() {
        let all: Vec<_> = metric_set(true).iter().map(|m| m.name).collect();
        assert_eq!(all.len(), 7);
        assert_eq!(all[0], COHERENCE);
        let builtin: Vec<_> = metric_set(false).iter().map(|m| m.name).collect();
        assert_eq!(
            builtin,
            vec![KNOWLEDGE_RETENTION, TURN_RELEVANCY, ROLE_ADHERENCE, CONVERSATION_COMPLETENESS]
        );
    }

    #[test]
    fn test_relevancy_windows() {
        let turns = support_case().turns;
        let windows = relevancy_windows(&turns, 2);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].len(), 2);
        assert_eq!(windows[1], &turns[2..4]);
        assert_eq!(relevancy_windows(&turns, 10)[1].len(), 4);
    }

    #[test]
    fn test_expected_role_fallback() {
        let mut c = support_case();
        assert_eq!(expected_role(&c), DEFAULT_CHATBOT_ROLE);
        c.chatbot_role = Some("  ".to_string());
        assert_eq!(expected_role(&c), DEFAULT_CHATBOT_ROLE);
        c.chatbot_role = Some("shipping agent".to_string());
        assert_eq!(expected_role(&c), "shipping agent");
    }

    #[tokio::test]
    async fn test_g_eval_scales_and_clamps() {
        let judge = ScriptedJudge::new(vec![("Criterion: Coherence", r#"{"score": 12, "reason": "great"}"#)]);
        let metric = metric_set(true)[0];
        let m = metric.measure(&judge, &support_case(), 10).await.unwrap();
        assert_eq!(m.score, 1.0);
        assert_eq!(m.reason.as_deref(), Some("great"));

        let judge = ScriptedJudge::new(vec![("Criterion: Coherence", "```json\n{\"score\": 7}\n```")]);
        let m = metric.measure(&judge, &support_case(), 10).await.unwrap();
        assert!((m.score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_knowledge_retention_counts_attrition() {
        let judge = ScriptedJudge::new(vec![(
            "retains information",
            r#"{"verdicts": [{"verdict": "no"}, {"verdict": "yes", "reason": "asked again"}], "reason": "forgot the order number"}"#,
        )]);
        let metric = Metric {
            name: KNOWLEDGE_RETENTION,
            kind: MetricKind::KnowledgeRetention,
        };
        let m = metric.measure(&judge, &support_case(), 10).await.unwrap();
        assert_eq!(m.score, 0.5);
        assert_eq!(m.reason.as_deref(), Some("forgot the order number"));
    }

    #[tokio::test]
    async fn test_turn_relevancy_one_call_per_assistant_turn() {
        let judge = ScriptedJudge::new(vec![
            ("[3] assistant", r#"{"verdict": "no", "reason": "ignored the question"}"#),
            ("[1] assistant", r#"{"verdict": "yes"}"#),
        ]);
        let metric = Metric {
            name: TURN_RELEVANCY,
            kind: MetricKind::TurnRelevancy,
        };
        let m = metric.measure(&judge, &support_case(), 10).await.unwrap();
        assert_eq!(m.score, 0.5);
        assert!(m.reason.unwrap().contains("ignored the question"));
        assert_eq!(judge.calls(), 2);
    }

    #[tokio::test]
    async fn test_role_adherence_ignores_invalid_indices() {
        let judge = ScriptedJudge::new(vec![(
            "Assigned role",
            r#"{"out_of_character": [{"index": 3}, {"index": 3}, {"index": 0}, {"index": 99}], "reason": "broke once"}"#,
        )]);
        let metric = Metric {
            name: ROLE_ADHERENCE,
            kind: MetricKind::RoleAdherence,
        };
        let m = metric.measure(&judge, &support_case(), 10).await.unwrap();
        assert_eq!(m.score, 0.5);
    }

    #[tokio::test]
    async fn test_conversation_completeness_two_steps() {
        let judge = ScriptedJudge::new(vec![
            ("extracting what a user wants", r#"{"intentions": ["track order", "get delivery date"]}"#),
            (
                "satisfied each user intention",
                r#"{"verdicts": [{"verdict": "yes"}, {"verdict": "no"}], "reason": "no date given"}"#,
            ),
        ]);
        let metric = Metric {
            name: CONVERSATION_COMPLETENESS,
            kind: MetricKind::ConversationCompleteness,
        };
        let m = metric.measure(&judge, &support_case(), 10).await.unwrap();
        assert_eq!(m.score, 0.5);
        assert_eq!(judge.calls(), 2);
    }

    #[tokio::test]
    async fn test_verdict_metrics_without_turns_score_one() {
        let judge = ScriptedJudge::new(vec![]);
        let empty = case(vec![Turn::user("hello?")]);
        for metric in metric_set(false).into_iter().take(3) {
            let m = metric.measure(&judge, &empty, 10).await.unwrap();
            assert_eq!(m.score, 1.0, "{}", metric.name);
        }
        assert_eq!(judge.calls(), 0);
    }
}
