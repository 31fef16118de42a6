//! Reconstruction of prior conversation turns from a spreadsheet cell.
//!
//! Cells hold either a JSON array of `{role, content}` objects or a plain
//! transcript such as `assistant: Hello! user: Hi`.

use crate::models::{Role, Turn};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

fn colon_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(assistant|user)\s*:\s*").expect("valid regex"))
}

fn bare_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(assistant|user)\b\s*").expect("valid regex"))
}

/// Parse an `Initial Conversation` cell into user/assistant turns.
///
/// JSON is tried first; text that is not JSON at all falls back to
/// transcript parsing. System turns are dropped either way.
pub fn parse_initial_conversation(text: &str) -> Vec<Turn> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => turns_from_json(&items),
        Ok(_) => {
            debug!("Initial conversation is JSON but not an array, ignoring");
            Vec::new()
        }
        Err(_) => {
            debug!("Initial conversation is not a JSON array, parsing as transcript");
            parse_transcript(text)
        }
    }
}

fn turns_from_json(items: &[Value]) -> Vec<Turn> {
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let role = obj.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = match obj.get("content") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            let role = Role::parse(role).filter(Role::is_dialogue)?;
            Some(Turn::new(role, content))
        })
        .collect()
}

/// Split a transcript on role markers.
///
/// When any `role:` marker is present only colon markers split the text,
/// so words like "user" inside a message survive. Text before the first
/// marker is ignored, and empty messages are dropped.
pub fn parse_transcript(text: &str) -> Vec<Turn> {
    let re = if colon_marker().is_match(text) {
        colon_marker()
    } else {
        bare_marker()
    };

    let markers: Vec<(Role, usize, usize)> = re
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let role = Role::parse(caps.get(1)?.as_str())?;
            Some((role, whole.start(), whole.end()))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .filter_map(|(i, (role, _, content_start))| {
            let content_end = markers.get(i + 1).map(|m| m.1).unwrap_or(text.len());
            let content = text[*content_start..content_end].trim();
            if content.is_empty() {
                None
            } else {
                Some(Turn::new(*role, content))
            }
        })
        .collect()
}

/// Serialize turns as the JSON array format the loader reads.
pub fn turns_to_json(turns: &[Turn]) -> String {
    serde_json::to_string(turns).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_array() {
        let turns = parse_initial_conversation(
            r#"[{"role": "user", "content": "Hello"}, {"role": "assistant", "content": "Hi!"}]"#,
        );
        assert_eq!(turns, vec![Turn::user("Hello"), Turn::assistant("Hi!")]);
    }

    #[test]
    fn test_parse_json_defaults_and_filters() {
        let turns = parse_initial_conversation(
            r#"[{"content": "no role"}, {"role": "system", "content": "x"}, {"role": "assistant"}, 42]"#,
        );
        assert_eq!(turns, vec![Turn::user("no role"), Turn::assistant("")]);
    }

    #[test]
    fn test_parse_transcript_with_colons() {
        let turns = parse_initial_conversation(
            "assistant: Welcome to support! user: My user account is locked. Assistant: Let me check.",
        );
        assert_eq!(
            turns,
            vec![
                Turn::assistant("Welcome to support!"),
                Turn::user("My user account is locked."),
                Turn::assistant("Let me check."),
            ]
        );
    }

    #[test]
    fn test_parse_transcript_without_colons() {
        let turns = parse_transcript("assistant hello there user hi");
        assert_eq!(turns, vec![Turn::assistant("hello there"), Turn::user("hi")]);
    }

    #[test]
    fn test_parse_transcript_drops_empty_and_leading_text() {
        let turns = parse_transcript("Transcript follows. user: assistant: Sure thing");
        assert_eq!(turns, vec![Turn::assistant("Sure thing")]);
    }

    #[test]
    fn test_parse_unparseable() {
        assert!(parse_initial_conversation("").is_empty());
        assert!(parse_initial_conversation("just some notes").is_empty());
        assert!(parse_initial_conversation("{\"role\": \"user\"}").is_empty());
    }

    #[test]
    fn test_turns_to_json() {
        let json = turns_to_json(&[Turn::user("héllo")]);
        assert_eq!(json, r#"[{"role":"user","content":"héllo"}]"#);
        assert_eq!(parse_initial_conversation(&json), vec![Turn::user("héllo")]);
    }
}
