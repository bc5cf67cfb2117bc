//! Extracting the replica JSON object from a free-text model completion.
//!
//! Models wrap JSON in prose or ```json fences and occasionally emit raw newlines
//! inside strings or trailing commas. The scanner here finds the first balanced
//! `{...}` candidate (string-aware), parses it strictly, then retries once after a
//! light repair. Failure never panics or errors out: it comes back as a
//! `ParseFailure` carrying the raw text so the UI can show what the model said.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{Replica, ReplicaSet};

/// Soft failure rendered in place of the replica mapping.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ParseFailure {
  pub error: String,
  pub raw_response: String,
}

impl ParseFailure {
  fn new(error: impl Into<String>, raw: &str) -> Self {
    Self { error: error.into(), raw_response: raw.to_string() }
  }
}

/// Byte offset just past the `}` that closes the `{` at `start`, or None when the
/// text ends first. Braces inside string literals are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;

  for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
    if in_string {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == b'"' {
        in_string = false;
      }
      continue;
    }
    match b {
      b'"' => in_string = true,
      b'{' => depth += 1,
      b'}' => {
        depth -= 1;
        if depth == 0 {
          return Some(i + 1);
        }
      }
      _ => {}
    }
  }
  None
}

/// Escape raw control characters inside string literals and drop trailing commas
/// before `}` / `]`.
pub fn repair_json(candidate: &str) -> String {
  let mut out = String::with_capacity(candidate.len() + 16);
  let mut in_string = false;
  let mut escaped = false;

  for ch in candidate.chars() {
    if in_string {
      if escaped {
        escaped = false;
        out.push(ch);
        continue;
      }
      match ch {
        '\\' => { escaped = true; out.push(ch); }
        '"' => { in_string = false; out.push(ch); }
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
      }
      continue;
    }
    match ch {
      '"' => { in_string = true; out.push(ch); }
      '}' | ']' => {
        let trimmed = out.trim_end().len();
        if out[..trimmed].ends_with(',') {
          out.truncate(trimmed - 1);
        }
        out.push(ch);
      }
      c => out.push(c),
    }
  }
  out
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
  match serde_json::from_str::<Value>(candidate) {
    Ok(Value::Object(map)) => Some(map),
    _ => None,
  }
}

/// Locate and decode the first JSON object embedded in `raw`.
/// A `{` that never closes is skipped and the search resumes at the next one.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, ParseFailure> {
  let mut from = 0usize;
  let mut saw_balanced = false;
  let mut saw_unterminated = false;

  while let Some(offset) = raw[from..].find('{') {
    let start = from + offset;
    let Some(end) = balanced_end(raw, start) else {
      saw_unterminated = true;
      from = start + 1;
      continue;
    };
    saw_balanced = true;
    let candidate = &raw[start..end];
    if let Some(map) = parse_object(candidate) {
      return Ok(map);
    }
    let repaired = repair_json(candidate);
    if let Some(map) = parse_object(&repaired) {
      debug!(target: "generation", start, end, "Parsed model JSON after repair");
      return Ok(map);
    }
    from = end;
  }

  let error = if saw_balanced {
    "Model response contained no parseable JSON object"
  } else if saw_unterminated {
    "Model response contains an unterminated JSON object (output may be truncated)"
  } else {
    "No JSON object found in model response"
  };
  warn!(target: "generation", raw_len = raw.len(), %error, "Failed to parse model response");
  Err(ParseFailure::new(error, raw))
}

/// `replica_<k>` -> k. Only plain decimal indices without leading zeros count.
fn replica_index(key: &str) -> Option<u32> {
  let digits = key.strip_prefix("replica_")?;
  if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  digits.parse().ok()
}

/// Full parse: extract the object, then keep `replica_1`..`replica_N` in numeric order.
/// Missing entries are skipped (no padding); extra keys are ignored.
pub fn parse_replicas(raw: &str, expected: u32) -> Result<ReplicaSet, ParseFailure> {
  let map = extract_json_object(raw)?;

  let mut found: Vec<(u32, &String, &Map<String, Value>)> = Vec::new();
  for (key, value) in &map {
    match replica_index(key) {
      Some(k) if k <= expected => match value {
        Value::Object(obj) => found.push((k, key, obj)),
        _ => warn!(target: "generation", %key, "Replica entry is not an object; skipped"),
      },
      _ => {}
    }
  }
  found.sort_by_key(|(k, _, _)| *k);

  let mut set = ReplicaSet::new();
  for (_, key, obj) in found {
    set.push(key.clone(), Replica::from_object(obj));
  }

  if set.is_empty() {
    warn!(target: "generation", expected, keys = map.len(), "Model JSON has no replica entries");
    return Err(ParseFailure::new("Model response JSON contains no replica entries", raw));
  }
  if set.len() < expected as usize {
    warn!(target: "generation", expected, got = set.len(), "Model returned fewer replicas than requested");
  }
  Ok(set)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_object_from_prose() {
    let raw = "Sure! Here you go: {\"replica_1\": {\"short_text\": \"Bakery\"}} Hope this helps.";
    let map = extract_json_object(raw).unwrap();
    assert_eq!(map["replica_1"]["short_text"], "Bakery");
  }

  #[test]
  fn extracts_object_from_code_fence() {
    let raw = "Here are the replicas:\n```json\n{\n  \"replica_1\": {\"html_code\": \"<div class=\\\"a\\\">}</div>\"}\n}\n```\nEnjoy!";
    let set = parse_replicas(raw, 1).unwrap();
    assert_eq!(set.get("replica_1").unwrap().html_code.as_deref(), Some("<div class=\"a\">}</div>"));
  }

  #[test]
  fn braces_inside_strings_do_not_end_the_object() {
    let raw = r#"{"replica_1": {"css_code": "a { color: red; } }}}", "js_code": "if (x) { y(); }"}} trailing }"#;
    let set = parse_replicas(raw, 1).unwrap();
    let r = set.get("replica_1").unwrap();
    assert_eq!(r.css_code.as_deref(), Some("a { color: red; } }}}"));
    assert_eq!(r.js_code.as_deref(), Some("if (x) { y(); }"));
  }

  #[test]
  fn skips_unparseable_prose_braces() {
    let raw = "Use {curly braces} carefully. {\"replica_1\": {\"unit\": \"U1\"}}";
    let set = parse_replicas(raw, 1).unwrap();
    assert_eq!(set.get("replica_1").unwrap().unit.as_deref(), Some("U1"));
  }

  #[test]
  fn repairs_raw_newlines_and_trailing_commas() {
    let raw = "{\"replica_1\": {\"html_code\": \"<p>\n</p>\", \"test_cases\": [1, 2,],},}";
    let set = parse_replicas(raw, 1).unwrap();
    let r = set.get("replica_1").unwrap();
    assert_eq!(r.html_code.as_deref(), Some("<p>\n</p>"));
    assert_eq!(r.test_cases, Some(serde_json::json!([1, 2])));
  }

  #[test]
  fn repair_leaves_commas_inside_strings() {
    assert_eq!(repair_json(r#"{"a": "x,}"}"#), r#"{"a": "x,}"}"#);
    assert_eq!(repair_json("{\"a\": [1,\n ]}"), "{\"a\": [1]}");
  }

  #[test]
  fn plain_prose_yields_soft_failure() {
    let raw = "I'm sorry, I can't produce that right now.";
    let err = parse_replicas(raw, 2).unwrap_err();
    assert_eq!(err.raw_response, raw);
    assert!(!err.error.is_empty());
  }

  #[test]
  fn truncated_object_yields_soft_failure() {
    let raw = "{\"replica_1\": {\"html_code\": \"<div>";
    let err = parse_replicas(raw, 1).unwrap_err();
    assert!(err.error.contains("unterminated"));
    assert_eq!(err.raw_response, raw);
  }

  #[test]
  fn keeps_only_requested_keys_in_order_without_padding() {
    let raw = r#"{"replica_3": {"short_text": "c"}, "note": "hi", "replica_1": {"short_text": "a"}, "replica_9": {}}"#;
    let set = parse_replicas(raw, 3).unwrap();
    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["replica_1", "replica_3"]);
  }

  #[test]
  fn stray_brace_in_prose_does_not_hide_the_object() {
    let raw = "Note: the original used `{` for its block. Here is the result:\n```json\n{\"replica_1\": {\"short_text\": \"Cafe\"}}\n```";
    let set = parse_replicas(raw, 1).unwrap();
    assert_eq!(set.get("replica_1").unwrap().short_text.as_deref(), Some("Cafe"));

    let raw = r#"The model says {"oops} then {"replica_1": {"unit": "U2"}}"#;
    let set = parse_replicas(raw, 1).unwrap();
    assert_eq!(set.get("replica_1").unwrap().unit.as_deref(), Some("U2"));
  }

  #[test]
  fn non_object_replica_entries_are_skipped() {
    let raw = r#"{"replica_1": "text", "replica_2": {"short_text": "Gym"}}"#;
    let set = parse_replicas(raw, 2).unwrap();
    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["replica_2"]);
    assert_eq!(set.get("replica_2").unwrap().short_text.as_deref(), Some("Gym"));
  }

  #[test]
  fn replica_keys_need_a_plain_index() {
    let raw = r#"{"replica_01": {}, "replica_+1": {}, "replica_": {}, "replica_x": {}, "replica_10": {"unit": "ten"}, "replica_2": {}}"#;
    let set = parse_replicas(raw, 10).unwrap();
    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["replica_2", "replica_10"]);
    assert!(parse_replicas(r#"{"replica_1": {}}"#, u32::MAX).is_ok());
  }

  #[test]
  fn object_without_replicas_is_a_failure() {
    let err = parse_replicas(r#"{"message": "nope"}"#, 2).unwrap_err();
    assert!(err.error.contains("no replica entries"));
  }
}
