//! Judge reply parsing.
//!
//! Judges are asked for JSON but often wrap it in markdown fences or
//! surround it with prose, so the first complete object is located first.

use crate::llm::LlmError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Errors from a single metric or arena judgement.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Judge reply contains no JSON object: {0}")]
    NoJson(String),

    #[error("Judge reply has unexpected shape: {0}")]
    Shape(String),
}

/// Locate the first complete JSON object in a judge reply.
///
/// A ```json fence wins when present; otherwise braces are matched,
/// ignoring braces inside string literals.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.find("```") {
            if let Some(object) = first_object(body[..end].trim()) {
                return Some(object);
            }
        }
    }
    first_object(text)
}

fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and deserialize a judge reply.
pub fn parse_reply<T: DeserializeOwned>(text: &str) -> Result<T, JudgeError> {
    let json = extract_json(text).ok_or_else(|| JudgeError::NoJson(snippet(text)))?;
    serde_json::from_str(json).map_err(|e| JudgeError::Shape(format!("{}: {}", e, snippet(json))))
}

fn snippet(text: &str) -> String {
    crate::models::truncate_chars(text.trim(), 200)
}

/// A yes/no judgement with an optional explanation.
#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    pub verdict: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn is_yes(&self) -> bool {
        self.verdict.trim().eq_ignore_ascii_case("yes")
    }
}

/// `{"verdicts": [...], "reason": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerdictList {
    #[serde(default)]
    pub verdicts: Vec<Verdict>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `{"score": n, "reason": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredReply {
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced() {
        let reply = "Here you go:\n```json\n{\"score\": 8, \"reason\": \"ok\"}\n```\nThanks";
        assert_eq!(extract_json(reply), Some("{\"score\": 8, \"reason\": \"ok\"}"));
    }

    #[test]
    fn test_extract_from_prose_with_nested_braces() {
        let reply = r#"Sure. {"verdicts": [{"verdict": "yes", "reason": "uses {braces}"}]} Done {x}"#;
        let json = extract_json(reply).unwrap();
        assert!(json.starts_with("{\"verdicts\""));
        assert!(json.ends_with("}]}"));
    }

    #[test]
    fn test_extract_none() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"unterminated\": 1"), None);
    }

    #[test]
    fn test_parse_reply() {
        let reply: ScoredReply = parse_reply("Score: {\"score\": 7.5}").unwrap();
        assert_eq!(reply.score, 7.5);
        assert!(reply.reason.is_none());

        let err = parse_reply::<ScoredReply>("{\"reason\": \"missing score\"}").unwrap_err();
        assert!(matches!(err, JudgeError::Shape(_)));
        let err = parse_reply::<ScoredReply>("nothing").unwrap_err();
        assert!(matches!(err, JudgeError::NoJson(_)));
    }

    #[test]
    fn test_verdict_is_yes() {
        let list: VerdictList = parse_reply(
            r#"{"verdicts": [{"verdict": "Yes"}, {"verdict": "no", "reason": "off topic"}]}"#,
        )
        .unwrap();
        assert!(list.verdicts[0].is_yes());
        assert!(!list.verdicts[1].is_yes());
        assert_eq!(list.verdicts[1].reason.as_deref(), Some("off topic"));
    }
}
