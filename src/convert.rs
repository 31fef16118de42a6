//! Conversion of the custom spreadsheet layout into the standard one.
//!
//! Input columns are `test_id`, `conversation_history` (a plain-text
//! transcript), `query`, `response_A`, `response_B` and `chatbot_role`.

use crate::loader::{
    parse_transcript, turns_to_json, SheetTable, COL_CHATBOT_ROLE, COL_INITIAL_CONVERSATION,
    COL_MODEL_A_RESPONSE, COL_MODEL_B_RESPONSE, COL_USER_QUERY,
};
use crate::models::DEFAULT_CHATBOT_ROLE;
use crate::report::spreadsheet::{write_workbook, CellValue, SheetData};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

const IN_TEST_ID: &str = "test_id";
const IN_HISTORY: &str = "conversation_history";
const IN_QUERY: &str = "query";
const IN_RESPONSE_A: &str = "response_A";
const IN_RESPONSE_B: &str = "response_B";
const IN_ROLE: &str = "chatbot_role";

const COL_TEST_ID: &str = "Test ID";

/// `data.xlsx` becomes `data_converted.xlsx` next to it.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    input.with_file_name(format!("{}_converted.xlsx", stem))
}

/// Map a custom-layout table onto the standard columns.
pub fn convert_table(table: &SheetTable) -> SheetData {
    let with_id = table.has_column(IN_TEST_ID);
    let mut headers = Vec::new();
    if with_id {
        headers.push(COL_TEST_ID.to_string());
    }
    headers.extend(
        [
            COL_INITIAL_CONVERSATION,
            COL_USER_QUERY,
            COL_MODEL_A_RESPONSE,
            COL_MODEL_B_RESPONSE,
            COL_CHATBOT_ROLE,
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    let mut data = SheetData::new("Sheet1", headers);
    for row in 0..table.row_count() {
        let text = |column: &str| -> CellValue {
            table.cell(row, column).unwrap_or_default().into()
        };

        let mut cells = Vec::with_capacity(6);
        if with_id {
            cells.push(
                table
                    .non_empty(row, IN_TEST_ID)
                    .map(CellValue::from)
                    .unwrap_or(CellValue::Empty),
            );
        }
        let history = table
            .non_empty(row, IN_HISTORY)
            .map(parse_transcript)
            .unwrap_or_default();
        cells.push(turns_to_json(&history).into());
        cells.push(text(IN_QUERY));
        cells.push(text(IN_RESPONSE_A));
        cells.push(text(IN_RESPONSE_B));
        cells.push(
            table
                .non_empty(row, IN_ROLE)
                .unwrap_or(DEFAULT_CHATBOT_ROLE)
                .into(),
        );
        data.rows.push(cells);
    }
    data
}

/// Convert `input` and write the standard layout to `output`, or to
/// [`default_output_path`] when none is given.
pub fn convert_file(input: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let table = SheetTable::open(input)?;
    info!("Converting {} rows from {}", table.row_count(), input.display());

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));
    let converted = convert_table(&table);
    write_workbook(&[converted], &output)?;
    Ok(output)
}
