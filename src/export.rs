//! Export formatters: spreadsheet rows (+ .xlsx writer) and pretty JSON documents.
//!
//! Row building and JSON formatting are pure; only the download filename
//! depends on the clock, and callers pass the timestamp in.

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde_json::Value;

use crate::domain::{Replica, ReplicaSet};

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const SHEET_NAME: &str = "Replicas";

/// Fixed column order of the spreadsheet export.
pub const COLUMNS: [&str; 13] = [
  "Short_Text",
  "HTML_Code",
  "CSS_Code",
  "Js_Code",
  "Question_text",
  "Test_cases",
  "HTML_Solution",
  "CSS_Solution",
  "JS_Solution",
  "Subtopic",
  "Course",
  "Module",
  "Unit",
];

/// Excel refuses cells longer than this many characters.
const MAX_CELL_CHARS: usize = 32_767;

fn test_cases_cell(v: &Option<Value>) -> String {
  match v {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
  }
}

fn text(v: &Option<String>) -> String {
  v.clone().unwrap_or_default()
}

/// One row for one replica, in `COLUMNS` order.
pub fn replica_row(r: &Replica) -> [String; 13] {
  [
    text(&r.short_text),
    r.html_code_or_solution().to_string(),
    r.css_code_or_solution().to_string(),
    r.js_code_or_solution().to_string(),
    text(&r.question_text),
    test_cases_cell(&r.test_cases),
    r.html_solution_or_code().to_string(),
    r.css_solution_or_code().to_string(),
    r.js_solution_or_code().to_string(),
    text(&r.subtopic),
    text(&r.course),
    text(&r.module),
    text(&r.unit),
  ]
}

/// One row per replica, mapping order preserved.
pub fn spreadsheet_rows(replicas: &ReplicaSet) -> Vec<[String; 13]> {
  replicas.iter().map(|(_, r)| replica_row(r)).collect()
}

fn clamp_cell(s: &str) -> &str {
  match s.char_indices().nth(MAX_CELL_CHARS) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// Render rows into an in-memory .xlsx workbook with a bold header row.
pub fn write_xlsx(rows: &[[String; 13]]) -> Result<Vec<u8>, XlsxError> {
  let mut workbook = Workbook::new();
  let header = Format::new().set_bold();

  let sheet = workbook.add_worksheet();
  sheet.set_name(SHEET_NAME)?;
  for (col, name) in COLUMNS.iter().enumerate() {
    sheet.write_string_with_format(0, col as u16, *name, &header)?;
  }
  for (i, row) in rows.iter().enumerate() {
    let r = i as u32 + 1;
    for (col, cell) in row.iter().enumerate() {
      if !cell.is_empty() {
        sheet.write_string(r, col as u16, clamp_cell(cell))?;
      }
    }
  }

  workbook.save_to_buffer()
}

/// Pretty-printed JSON (2-space indent), key order as received.
pub fn pretty_json(doc: &Value) -> Result<Vec<u8>, serde_json::Error> {
  serde_json::to_vec_pretty(doc)
}

/// `web_coding_replicas_<YYYYmmdd_HHMMSS>.<ext>` in UTC.
pub fn download_filename(ext: &str, at: DateTime<Utc>) -> String {
  format!("web_coding_replicas_{}.{}", at.format("%Y%m%d_%H%M%S"), ext)
}
