//! Prompt construction for replica generation.
//!
//! Pure string building: the request, the configured templates, and a list of
//! suggested themes go in; a system/user message pair comes out.

use serde_json::json;

use crate::config::Prompts;
use crate::domain::{ReplicaRequest, ReplicaType, TestCase};
use crate::util::fill_template;

/// The two chat messages sent to the model.
#[derive(Clone, Debug)]
pub struct BuiltPrompt {
  pub system: String,
  pub user: String,
}

const WEBCODING_RULES: &str = "- Keep the JavaScript behaviour identical: same events, same computations, same DOM updates.\n\
- Every getElementById/querySelector call must match the renamed ids and classes exactly.\n\
- Fill js_code and js_solution with the complete themed JavaScript.";

const RESPONSIVE_RULES: &str = "- This is a responsive layout question: HTML and CSS only.\n\
- Keep every media query breakpoint and the layout it produces at each width.\n\
- js_code and js_solution MUST be empty strings.";

pub fn build_prompt(prompts: &Prompts, req: &ReplicaRequest, themes: &[&str]) -> BuiltPrompt {
  let n = req.num_replicas.to_string();
  let test_cases = render_test_cases(&req.test_cases);
  let themes_text = render_themes(themes, req.num_replicas);
  let shape = output_shape(req.num_replicas, req.replica_type);
  let mode_rules = match req.replica_type {
    ReplicaType::Webcoding => WEBCODING_RULES,
    ReplicaType::Responsive => RESPONSIVE_RULES,
  };
  let js = if req.js().is_empty() { "(none)" } else { req.js() };

  let user = fill_template(
    &prompts.user_template,
    &[
      ("num_replicas", n.as_str()),
      ("replica_type", req.replica_type.as_str()),
      ("short_text", req.short_text.as_str()),
      ("question_text", req.question_text.as_str()),
      ("original_html", req.html()),
      ("original_css", req.css()),
      ("original_js", js),
      ("test_cases", test_cases.as_str()),
      ("mode_rules", mode_rules),
      ("themes", themes_text.as_str()),
      ("output_shape", shape.as_str()),
    ],
  );

  BuiltPrompt { system: prompts.system.clone(), user }
}

/// Test cases sorted by `order` (cases without one go last, original order kept among ties).
pub fn render_test_cases(cases: &[TestCase]) -> String {
  let mut sorted: Vec<&TestCase> = cases.iter().collect();
  sorted.sort_by_key(|tc| tc.order.unwrap_or(i64::MAX));

  let mut out = String::new();
  for (i, tc) in sorted.iter().enumerate() {
    let order = tc.order.unwrap_or(i as i64 + 1);
    out.push_str(&format!("Test Case {}: {}\n", order, tc.display_text));
    out.push_str(&format!("Criteria: {}\n", tc.criteria));
    if let Some(w) = tc.weightage {
      out.push_str(&format!("Weightage: {}\n", w));
    }
    out.push('\n');
  }
  if out.is_empty() {
    out.push_str("(no test cases provided)\n");
  }
  out
}

fn render_themes(themes: &[&str], n: u32) -> String {
  if themes.is_empty() {
    return "- any distinct, realistic business or product context".into();
  }
  let mut lines: Vec<String> = themes
    .iter()
    .enumerate()
    .map(|(i, t)| format!("- replica_{}: {}", i + 1, t))
    .collect();
  if (themes.len() as u64) < u64::from(n) {
    lines.push("- remaining replicas: any other distinct, realistic context".into());
  }
  lines.join("\n")
}

/// Key lists longer than this are abbreviated as `"replica_1", "replica_2", ..., "replica_N"`.
const MAX_LISTED_KEYS: u32 = 12;

fn replica_keys(n: u32) -> String {
  if n <= MAX_LISTED_KEYS {
    (1..=n).map(|i| format!("\"replica_{}\"", i)).collect::<Vec<_>>().join(", ")
  } else {
    format!("\"replica_1\", \"replica_2\", ..., \"replica_{}\" ({} keys)", n, n)
  }
}

/// The top-level key list plus one pretty-printed example replica.
/// Size does not depend on `n`.
pub fn output_shape(n: u32, kind: ReplicaType) -> String {
  let (js, js_solution) = match kind {
    ReplicaType::Webcoding => ("Complete themed JavaScript", "Same as js_code"),
    ReplicaType::Responsive => ("", ""),
  };
  let example = json!({
    "short_text": "Theme name",
    "html_code": "Complete themed HTML",
    "css_code": "Complete themed CSS",
    "js_code": js,
    "question_text": "Question text adapted to the theme",
    "test_cases": [
      {"display_text": "What the test checks", "criteria": "Test code using the new ids", "order": 1, "weightage": 10}
    ],
    "html_solution": "Same as html_code",
    "css_solution": "Same as css_code",
    "js_solution": js_solution,
    "subtopic": "",
    "course": "",
    "module": "",
    "unit": ""
  });
  let example = serde_json::to_string_pretty(&example).unwrap_or_default();
  format!(
    "Top-level keys, in this order: {}\nEvery value is an object shaped like this:\n{}",
    replica_keys(n),
    example
  )
}
