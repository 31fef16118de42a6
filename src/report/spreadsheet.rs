//! Excel outputs via rust_xlsxwriter.

use crate::analysis::{round_to, MetricAverage};
use crate::loader::{SheetTable, COL_MODEL_A_RESPONSE, COL_MODEL_B_RESPONSE};
use crate::models::{truncate_words, ConversationResult, EvaluationRun, ModelEvaluation};
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

/// Excel refuses cells longer than 32767 characters.
const MAX_CELL_CHARS: usize = 32_000;

/// Words of the chatbot role kept in the detailed sheet.
const ROLE_WORDS: usize = 100;

/// One cell of an output sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(v: Option<f64>) -> Self {
        v.map(CellValue::Number).unwrap_or(CellValue::Empty)
    }
}

/// Headers and rows of one worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetData {
    pub fn new(name: &str, headers: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            headers,
            rows: Vec::new(),
        }
    }

    fn column_width(&self, col: usize) -> f64 {
        let longest = std::iter::once(self.headers.get(col).map(|h| h.chars().count()))
            .chain(self.rows.iter().map(|r| match r.get(col) {
                Some(CellValue::Text(t)) => Some(t.chars().count()),
                Some(CellValue::Number(_)) => Some(8),
                _ => None,
            }))
            .flatten()
            .max()
            .unwrap_or(10);
        (longest + 2).clamp(10, 50) as f64
    }
}

fn build_worksheet(data: &SheetData) -> Result<Worksheet> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name(&data.name)?;
    let header = Format::new().set_bold();

    for (col, title) in data.headers.iter().enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, title, &header)?;
    }

    for (i, row) in data.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                CellValue::Text(t) => {
                    worksheet.write_string(r, col, clip(t))?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(r, col, *n)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(r, col, *b)?;
                }
                CellValue::Empty => {}
            }
        }
    }

    for col in 0..data.headers.len() {
        worksheet.set_column_width(col as u16, data.column_width(col))?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    Ok(worksheet)
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Write sheets into a new workbook.
pub fn write_workbook(sheets: &[SheetData], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    for data in sheets {
        workbook.push_worksheet(build_worksheet(data)?);
    }
    workbook
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn initial_conversation_text(conversation: &ConversationResult) -> String {
    conversation
        .initial_conversation
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn metric_cells(evaluation: &ModelEvaluation, metrics: &[String]) -> Vec<CellValue> {
    let mut cells = Vec::with_capacity(metrics.len() * 3);
    for name in metrics {
        match evaluation.metric(name) {
            Some(m) => {
                cells.push(m.score.map(|s| round_to(s, 3)).into());
                cells.push(CellValue::Bool(m.success));
                cells.push(
                    m.reason
                        .clone()
                        .or_else(|| m.error.clone())
                        .unwrap_or_else(|| "N/A".to_string())
                        .into(),
                );
            }
            None => {
                cells.push(CellValue::Empty);
                cells.push(CellValue::Empty);
                cells.push("N/A".into());
            }
        }
    }
    cells
}

/// The "Full Analysis" sheet: one row per conversation with both replies and
/// every metric's score, pass flag and reason.
pub fn detailed_analysis(run: &EvaluationRun) -> SheetData {
    let metrics = run.metric_names();
    let mut headers: Vec<String> = [
        "Test Case",
        "Initial Conversation",
        "User Query",
        "Model A Response",
        "Model B Response",
        "Chatbot Role",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for model in ["Model A", "Model B"] {
        for name in &metrics {
            headers.push(format!("{} - {} Score", model, name));
            headers.push(format!("{} - {} Pass", model, name));
            headers.push(format!("{} - {} Reason", model, name));
        }
    }

    let mut data = SheetData::new("Full Analysis", headers);
    for conversation in &run.conversations {
        let a = &conversation.model_a_evaluation;
        let b = &conversation.model_b_evaluation;
        let role = a
            .test_case
            .chatbot_role
            .as_deref()
            .map(|r| truncate_words(r, ROLE_WORDS))
            .unwrap_or_default();

        let mut row: Vec<CellValue> = vec![
            conversation.test_case_name.as_str().into(),
            initial_conversation_text(conversation).into(),
            conversation.user_query.as_str().into(),
            a.test_case.last_assistant_reply().unwrap_or_default().into(),
            b.test_case.last_assistant_reply().unwrap_or_default().into(),
            role.into(),
        ];
        row.extend(metric_cells(a, &metrics));
        row.extend(metric_cells(b, &metrics));
        data.rows.push(row);
    }
    data
}

/// The "Metric Averages" and "All Test Cases" sheets.
pub fn executive_summary(run: &EvaluationRun, averages: &[MetricAverage]) -> Vec<SheetData> {
    let mut avg_sheet = SheetData::new(
        "Metric Averages",
        [
            "Metric",
            "Model A Avg",
            "Model B Avg",
            "Difference (B-A)",
            "Better Performer",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    );
    for avg in averages {
        avg_sheet.rows.push(vec![
            avg.metric.as_str().into(),
            CellValue::Number(round_to(avg.model_a_avg, 3)),
            CellValue::Number(round_to(avg.model_b_avg, 3)),
            CellValue::Number(round_to(avg.difference, 3)),
            avg.better_performer().into(),
        ]);
    }

    let metrics = run.metric_names();
    let mut headers = vec!["Test Case".to_string()];
    for name in &metrics {
        headers.push(format!("{} - Model A", name));
        headers.push(format!("{} - Model B", name));
    }
    let mut cases_sheet = SheetData::new("All Test Cases", headers);
    for conversation in &run.conversations {
        let mut row: Vec<CellValue> = vec![conversation.test_case_name.as_str().into()];
        for name in &metrics {
            for evaluation in [&conversation.model_a_evaluation, &conversation.model_b_evaluation] {
                let score = evaluation
                    .metric(name)
                    .and_then(|m| m.score)
                    .map(|s| round_to(s, 3));
                row.push(score.into());
            }
        }
        cases_sheet.rows.push(row);
    }

    vec![avg_sheet, cases_sheet]
}

/// Generated replies for one source row.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReplies {
    pub row_index: usize,
    pub model_a: Option<String>,
    pub model_b: Option<String>,
}

/// Copy of the source table with generated replies filled into the response
/// columns, which are appended when the source lacks them.
pub fn with_responses(table: &SheetTable, replies: &[GeneratedReplies]) -> SheetData {
    let mut headers = table.headers().to_vec();
    for column in [COL_MODEL_A_RESPONSE, COL_MODEL_B_RESPONSE] {
        if !table.has_column(column) {
            headers.push(column.to_string());
        }
    }
    let a_col = headers.iter().position(|h| h.trim() == COL_MODEL_A_RESPONSE);
    let b_col = headers.iter().position(|h| h.trim() == COL_MODEL_B_RESPONSE);

    let mut data = SheetData::new("Sheet1", headers.clone());
    for i in 0..table.row_count() {
        let mut row: Vec<CellValue> = table
            .row(i)
            .unwrap_or_default()
            .iter()
            .map(|c| c.clone().map(CellValue::Text).unwrap_or(CellValue::Empty))
            .collect();
        row.resize(headers.len(), CellValue::Empty);

        if let Some(generated) = replies.iter().find(|r| r.row_index == i) {
            for (col, reply) in [(a_col, &generated.model_a), (b_col, &generated.model_b)] {
                if let (Some(col), Some(reply)) = (col, reply) {
                    row[col] = reply.as_str().into();
                }
            }
        }
        data.rows.push(row);
    }
    data
}
