//! Spreadsheet conversation loading.
//!
//! Each data row of a spreadsheet is one separate conversation. This module
//! turns rows into generation requests or prerecorded test-case pairs and
//! decides which evaluation mode a file supports.

pub mod history;
pub mod sheet;

pub use history::{parse_initial_conversation, parse_transcript, turns_to_json};
pub use sheet::{is_spreadsheet, SheetError, SheetTable, SPREADSHEET_EXTENSIONS};

use crate::models::{ConversationMetadata, EvaluationMode, TestCase, Turn};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const COL_INITIAL_CONVERSATION: &str = "Initial Conversation";
pub const COL_USER_QUERY: &str = "User Query";
pub const COL_MODEL_A_RESPONSE: &str = "Model A Response";
pub const COL_MODEL_B_RESPONSE: &str = "Model B Response";
pub const COL_CHATBOT_ROLE: &str = "Chatbot Role";
pub const COL_SCENARIO: &str = "Scenario";
pub const COL_EXPECTED_OUTCOME: &str = "Expected Outcome";

/// A row prepared for on-the-fly generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub row_index: usize,
    pub initial_turns: Vec<Turn>,
    pub user_query: String,
    pub metadata: ConversationMetadata,
}

impl GenerationRequest {
    /// Turns sent to both models: optional system prompt, prior turns, query.
    pub fn prompt_turns(&self, system_prompt: &str) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(self.initial_turns.len() + 2);
        if !system_prompt.is_empty() {
            turns.push(Turn::system(system_prompt));
        }
        turns.extend(self.initial_turns.iter().cloned());
        turns.push(Turn::user(self.user_query.clone()));
        turns
    }
}

/// A row with both models' replies already recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PrerecordedPair {
    pub row_index: usize,
    pub initial_turns: Vec<Turn>,
    pub user_query: String,
    pub model_a: TestCase,
    pub model_b: TestCase,
}

/// Loads conversations from one spreadsheet.
pub struct ConversationLoader {
    path: PathBuf,
    table: SheetTable,
}

impl ConversationLoader {
    /// Open a spreadsheet file.
    pub fn open(path: &Path) -> Result<Self, SheetError> {
        let table = SheetTable::open(path)?;
        debug!(
            "Loaded {} rows with columns {:?} from {}",
            table.row_count(),
            table.headers(),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    /// Wrap an already-read table.
    pub fn from_table(path: impl Into<PathBuf>, table: SheetTable) -> Self {
        Self {
            path: path.into(),
            table,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &SheetTable {
        &self.table
    }

    /// Prerecorded when both response columns exist and at least one row
    /// fills both of them; generate otherwise.
    pub fn detect_mode(&self) -> EvaluationMode {
        let t = &self.table;
        if !t.has_column(COL_MODEL_A_RESPONSE) || !t.has_column(COL_MODEL_B_RESPONSE) {
            return EvaluationMode::Generate;
        }

        let has_data = (0..t.row_count()).any(|row| {
            t.cell(row, COL_MODEL_A_RESPONSE).is_some()
                && t.cell(row, COL_MODEL_B_RESPONSE).is_some()
        });

        if has_data {
            EvaluationMode::Prerecorded
        } else {
            EvaluationMode::Generate
        }
    }

    /// Resolve `auto` against this file's columns.
    pub fn resolve_mode(&self, requested: EvaluationMode) -> EvaluationMode {
        match requested {
            EvaluationMode::Auto => self.detect_mode(),
            other => other,
        }
    }

    /// Rows that carry a user query, ready for generation.
    pub fn conversations_for_generation(&self) -> Vec<GenerationRequest> {
        (0..self.table.row_count())
            .filter_map(|row| {
                let user_query = self.table.non_empty(row, COL_USER_QUERY)?.to_string();
                Some(GenerationRequest {
                    row_index: row,
                    initial_turns: self.initial_turns(row),
                    user_query,
                    metadata: self.metadata(row),
                })
            })
            .collect()
    }

    /// Rows that carry a user query and both models' replies.
    pub fn conversations_prerecorded(&self) -> Vec<PrerecordedPair> {
        (0..self.table.row_count())
            .filter_map(|row| {
                let user_query = self.table.non_empty(row, COL_USER_QUERY)?;
                let response_a = self.table.non_empty(row, COL_MODEL_A_RESPONSE)?;
                let response_b = self.table.non_empty(row, COL_MODEL_B_RESPONSE)?;

                let initial_turns = self.initial_turns(row);
                let metadata = self.metadata(row);
                let build = |reply: &str| {
                    let mut turns = initial_turns.clone();
                    turns.push(Turn::user(user_query));
                    turns.push(Turn::assistant(reply));
                    TestCase::new(turns, &metadata)
                };

                Some(PrerecordedPair {
                    row_index: row,
                    model_a: build(response_a),
                    model_b: build(response_b),
                    initial_turns,
                    user_query: user_query.to_string(),
                })
            })
            .collect()
    }

    fn initial_turns(&self, row: usize) -> Vec<Turn> {
        self.table
            .non_empty(row, COL_INITIAL_CONVERSATION)
            .map(parse_initial_conversation)
            .unwrap_or_default()
    }

    fn metadata(&self, row: usize) -> ConversationMetadata {
        let text = |column: &str| self.table.cell(row, column).map(str::to_string);
        ConversationMetadata {
            chatbot_role: text(COL_CHATBOT_ROLE),
            scenario: text(COL_SCENARIO),
            expected_outcome: text(COL_EXPECTED_OUTCOME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn cells(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| {
                if v.is_empty() {
                    None
                } else {
                    Some(v.to_string())
                }
            })
            .collect()
    }

    fn loader(headers: &[&str], rows: &[&[&str]]) -> ConversationLoader {
        let table = SheetTable::from_parts(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter().map(|r| cells(r)).collect(),
        );
        ConversationLoader::from_table("test.xlsx", table)
    }

    const FULL: &[&str] = &[
        COL_INITIAL_CONVERSATION,
        COL_USER_QUERY,
        COL_MODEL_A_RESPONSE,
        COL_MODEL_B_RESPONSE,
        COL_CHATBOT_ROLE,
        COL_SCENARIO,
    ];

    #[test]
    fn test_detect_mode_prerecorded() {
        let l = loader(FULL, &[&["", "hi", "a", "b", "", ""]]);
        assert_eq!(l.detect_mode(), EvaluationMode::Prerecorded);
    }

    #[test]
    fn test_detect_mode_columns_without_data() {
        let l = loader(FULL, &[&["", "hi", "a", "", "", ""], &["", "yo", "", "b", "", ""]]);
        assert_eq!(l.detect_mode(), EvaluationMode::Generate);
    }

    #[test]
    fn test_detect_mode_missing_columns() {
        let l = loader(&[COL_USER_QUERY, COL_MODEL_A_RESPONSE], &[&["hi", "a"]]);
        assert_eq!(l.detect_mode(), EvaluationMode::Generate);
        assert_eq!(
            l.resolve_mode(EvaluationMode::Prerecorded),
            EvaluationMode::Prerecorded
        );
    }

    #[test]
    fn test_generation_skips_rows_without_query() {
        let l = loader(
            &[COL_INITIAL_CONVERSATION, COL_USER_QUERY, COL_SCENARIO],
            &[
                &[r#"[{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello"}]"#, "Track my order", "Shipping"],
                &["", "", "ignored"],
                &["not json", "Refund?", ""],
            ],
        );
        let convs = l.conversations_for_generation();
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].row_index, 0);
        assert_eq!(convs[0].initial_turns.len(), 2);
        assert_eq!(convs[0].metadata.scenario.as_deref(), Some("Shipping"));
        assert_eq!(convs[1].row_index, 2);
        assert!(convs[1].initial_turns.is_empty());
        assert_eq!(convs[1].metadata.scenario, None);
    }

    #[test]
    fn test_prompt_turns() {
        let req = GenerationRequest {
            row_index: 0,
            initial_turns: vec![Turn::assistant("Welcome")],
            user_query: "Help".to_string(),
            metadata: ConversationMetadata::default(),
        };
        let turns = req.prompt_turns("Be brief.");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[2], Turn::user("Help"));
        assert_eq!(req.prompt_turns("").len(), 2);
    }

    #[test]
    fn test_prerecorded_pairs() {
        let l = loader(
            FULL,
            &[
                &["user: Hi assistant: Hello", "Any deals?", "No.", "Yes, 10% off!", "sales bot", ""],
                &["", "Missing B", "A only", "", "", ""],
                &["", "", "a", "b", "", ""],
            ],
        );
        let pairs = l.conversations_prerecorded();
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.user_query, "Any deals?");
        assert_eq!(pair.model_a.turns.len(), 4);
        assert_eq!(pair.model_a.last_assistant_reply(), Some("No."));
        assert_eq!(pair.model_b.last_assistant_reply(), Some("Yes, 10% off!"));
        assert_eq!(pair.model_a.turns[2], Turn::user("Any deals?"));
        assert_eq!(pair.model_b.chatbot_role.as_deref(), Some("sales bot"));
    }
}
