//! Replica generation pipeline shared by the HTTP handlers.
//!
//! validate -> build prompt -> call model -> record usage -> parse -> normalize.
//! Usage is recorded as soon as the model call returns, so a reply that later
//! fails to parse is still accounted for.

use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Language, Metadata, Replica, ReplicaRequest, ReplicaSet, ReplicaType, TestCase};
use crate::error::AppError;
use crate::parse::parse_replicas;
use crate::prompt::build_prompt;
use crate::protocol::{GenerateOut, ReplicasPayload};
use crate::state::AppState;
use crate::themes::pick_themes;
use crate::util::title_case_tag;

/// Decode the raw body so that missing/mistyped fields become a `Validation` error
/// naming the field, then check structural constraints.
pub fn parse_request(body: Value) -> Result<ReplicaRequest, AppError> {
  if !body.is_object() {
    return Err(AppError::Validation("request body must be a JSON object".into()));
  }
  let req: ReplicaRequest = serde_json::from_value(body).map_err(|e| AppError::Validation(e.to_string()))?;
  validate_request(&req)?;
  Ok(req)
}

pub fn validate_request(req: &ReplicaRequest) -> Result<(), AppError> {
  if req.num_replicas < 1 {
    return Err(AppError::Validation("num_replicas must be at least 1".into()));
  }
  let solution = req
    .solution()
    .ok_or_else(|| AppError::Validation("solutions_metadata must contain at least one solution".into()))?;

  let has = |lang| solution.code_for(lang).is_some();
  if !has(Language::Html) {
    return Err(AppError::Validation("solutions_metadata[0].code_details is missing an HTML block".into()));
  }
  if !has(Language::Css) {
    return Err(AppError::Validation("solutions_metadata[0].code_details is missing a CSS block".into()));
  }
  if req.replica_type == ReplicaType::Webcoding && !has(Language::Javascript) {
    return Err(AppError::Validation(
      "webcoding replicas require a JAVASCRIPT block in solutions_metadata[0].code_details".into(),
    ));
  }
  Ok(())
}

fn tag_value(tags: &[String], prefix: &str) -> Option<String> {
  tags
    .iter()
    .find_map(|t| t.strip_prefix(prefix))
    .map(title_case_tag)
}

fn pick(explicit: &Option<String>, tags: &[String], prefix: &str) -> String {
  match explicit.as_deref().map(str::trim) {
    Some(s) if !s.is_empty() => s.to_string(),
    _ => tag_value(tags, prefix).unwrap_or_default(),
  }
}

/// Explicit fields win; otherwise the first `SUB_TOPIC_` / `COURSE_` / `MODULE_` / `UNIT_` tag.
pub fn derive_metadata(req: &ReplicaRequest) -> Metadata {
  Metadata {
    subtopic: pick(&req.subtopic, &req.tag_names, "SUB_TOPIC_"),
    course: pick(&req.course, &req.tag_names, "COURSE_"),
    module: pick(&req.module, &req.tag_names, "MODULE_"),
    unit: pick(&req.unit, &req.tag_names, "UNIT_"),
  }
}

/// The original test cases re-issued with fresh ids and defaulted fields.
pub fn backfill_test_cases(original: &[TestCase]) -> Value {
  let cases: Vec<Value> = original
    .iter()
    .enumerate()
    .map(|(i, tc)| {
      json!({
        "id": Uuid::new_v4().to_string(),
        "display_text": tc.display_text,
        "criteria": tc.criteria,
        "evaluation_type": tc.evaluation_type.clone().unwrap_or_else(|| "CLIENT_SIDE_EVALUATION".into()),
        "order": tc.order.unwrap_or(i as i64 + 1),
        "reason_for_failure": tc.reason_for_failure.clone().unwrap_or(Value::Null),
        "weightage": tc.weightage.unwrap_or(10),
      })
    })
    .collect();
  Value::Array(cases)
}

/// Give model-authored test case objects an id when they came without one.
fn ensure_test_case_ids(cases: &mut Value) {
  if let Value::Array(items) = cases {
    for item in items.iter_mut() {
      if let Value::Object(obj) = item {
        let missing = match obj.get("id") {
          None | Some(Value::Null) => true,
          Some(Value::String(s)) => s.is_empty(),
          Some(_) => false,
        };
        if missing {
          obj.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
      }
    }
  }
}

fn set_if_non_empty(slot: &mut Option<String>, value: &str) {
  if !value.is_empty() {
    *slot = Some(value.to_string());
  }
}

/// Fill code/solution pairs from each other, enforce the replica type,
/// backfill test cases and stamp metadata.
pub fn normalize_replicas(set: &mut ReplicaSet, req: &ReplicaRequest, meta: &Metadata) {
  for (key, r) in set.iter_mut() {
    let filled = Replica {
      html_code: Some(r.html_code_or_solution().to_string()),
      html_solution: Some(r.html_solution_or_code().to_string()),
      css_code: Some(r.css_code_or_solution().to_string()),
      css_solution: Some(r.css_solution_or_code().to_string()),
      js_code: Some(r.js_code_or_solution().to_string()),
      js_solution: Some(r.js_solution_or_code().to_string()),
      ..r.clone()
    };
    *r = filled;

    if req.replica_type == ReplicaType::Responsive {
      r.js_code = Some(String::new());
      r.js_solution = Some(String::new());
    }

    if r.lacks_test_cases() {
      warn!(target: "generation", replica = key, "Replica has no test cases; backfilling from the original");
      r.test_cases = Some(backfill_test_cases(&req.test_cases));
    } else if let Some(tc) = r.test_cases.as_mut() {
      ensure_test_case_ids(tc);
    }

    set_if_non_empty(&mut r.subtopic, &meta.subtopic);
    set_if_non_empty(&mut r.course, &meta.course);
    set_if_non_empty(&mut r.module, &meta.module);
    set_if_non_empty(&mut r.unit, &meta.unit);
  }
}

/// Run one generation request end to end.
#[instrument(
  level = "info",
  skip(state, req),
  fields(replica_type = req.replica_type.as_str(), num_replicas = req.num_replicas, test_cases = req.test_cases.len())
)]
pub async fn generate(state: &AppState, req: &ReplicaRequest) -> Result<GenerateOut, AppError> {
  let oa = state
    .openai
    .as_ref()
    .ok_or_else(|| AppError::Config("OpenAI API key not configured".into()))?;

  let themes = {
    let mut rng = rand::thread_rng();
    pick_themes(&mut rng, req.num_replicas as usize)
  };
  let prompt = build_prompt(&state.prompts, req, &themes);
  info!(target: "generation", prompt_len = prompt.user.len(), themes = ?themes, "Prompt built");

  let reply = oa.complete(&prompt, &state.generation).await?;
  let session_usage = state.usage.record(&reply.usage);

  let replicas = match parse_replicas(&reply.text, req.num_replicas) {
    Ok(mut set) => {
      let meta = derive_metadata(req);
      normalize_replicas(&mut set, req, &meta);
      info!(target: "generation", requested = req.num_replicas, generated = set.len(), "Replicas generated");
      ReplicasPayload::Generated(set)
    }
    Err(failure) => {
      warn!(target: "generation", error = %failure.error, raw_len = failure.raw_response.len(), "Returning raw model response for review");
      ReplicasPayload::Failed(failure)
    }
  };

  Ok(GenerateOut { success: true, replicas, token_usage: reply.usage, session_usage })
}

/// Caller-supplied (possibly edited) mapping -> replicas for the spreadsheet export.
pub fn replicas_for_export(map: &Map<String, Value>) -> ReplicaSet {
  let set = ReplicaSet::from_map(map);
  if set.len() < map.len() {
    warn!(target: "export", received = map.len(), exported = set.len(), "Skipped non-replica entries");
  }
  set
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ReplicaConfig;
  use crate::openai::fake::{serve, unreachable, Reply};
  use axum::http::StatusCode;

  fn body(kind: &str, n: u32) -> Value {
    json!({
      "question_text": "Build Your Custom Chocolate Pack",
      "short_text": "Custom Chocolate Pack",
      "solutions_metadata": [{"code_details": [
        {"language": "HTML", "code_data": "<button id=\"calculate\">Calculate</button><span id=\"result\">0</span>"},
        {"language": "CSS", "code_data": "body { font-family: Arial; }"},
        {"language": "JAVASCRIPT", "code_data": "document.getElementById('calculate').addEventListener('click', () => {});"}
      ]}],
      "test_cases": [
        {"id": "test-1", "display_text": "Clicking shows result", "criteria": "assert(true)", "order": 1, "weightage": 10},
        {"id": "test-2", "display_text": "Input exists", "criteria": "assert(x)", "order": 2}
      ],
      "tag_names": ["SUB_TOPIC_CSS_FLEXBOX", "COURSE_Modern_Responsive_Web_Design", "UNIT_DOM_EVENTS"],
      "module": "Explicit Module",
      "replica_type": kind,
      "num_replicas": n
    })
  }

  fn model_json(n: u32) -> String {
    let mut root = Map::new();
    for i in 1..=n {
      root.insert(
        format!("replica_{}", i),
        json!({
          "short_text": format!("Theme {i}"),
          "html_code": format!("<button id=\"calc-{i}\">Go</button>"),
          "css_code": "body{color:teal}",
          "js_code": format!("document.getElementById('calc-{i}').onclick=()=>{{}};"),
          "question_text": "Themed question",
          "test_cases": [{"display_text": "works", "criteria": "assert(1)", "order": 1, "weightage": 10}]
        }),
      );
    }
    Value::Object(root).to_string()
  }

  #[test]
  fn validation_names_missing_fields() {
    let mut b = body("webcoding", 2);
    b.as_object_mut().unwrap().remove("short_text");
    let err = parse_request(b).unwrap_err();
    assert!(matches!(&err, AppError::Validation(m) if m.contains("short_text")), "{err}");

    let mut b = body("webcoding", 2);
    b["solutions_metadata"] = json!([]);
    assert!(matches!(parse_request(b), Err(AppError::Validation(m)) if m.contains("at least one solution")));

    assert!(matches!(parse_request(body("webcoding", 0)), Err(AppError::Validation(m)) if m.contains("num_replicas")));

    assert!(matches!(parse_request(json!([1, 2])), Err(AppError::Validation(_))));
  }

  #[test]
  fn webcoding_requires_javascript_but_responsive_does_not() {
    let mut b = body("webcoding", 1);
    b["solutions_metadata"][0]["code_details"].as_array_mut().unwrap().pop();
    assert!(matches!(parse_request(b.clone()), Err(AppError::Validation(m)) if m.contains("JAVASCRIPT")));

    b["replica_type"] = json!("responsive");
    assert!(parse_request(b).is_ok());

    let mut b = body("responsive", 1);
    b["solutions_metadata"][0]["code_details"] = json!([{"language": "HTML", "code_data": ""}]);
    assert!(matches!(parse_request(b), Err(AppError::Validation(m)) if m.contains("CSS")));
  }

  #[test]
  fn metadata_prefers_explicit_then_tags() {
    let req = parse_request(body("webcoding", 1)).unwrap();
    let meta = derive_metadata(&req);
    assert_eq!(meta.subtopic, "Css Flexbox");
    assert_eq!(meta.course, "Modern Responsive Web Design");
    assert_eq!(meta.module, "Explicit Module");
    assert_eq!(meta.unit, "Dom Events");
  }

  #[test]
  fn backfilled_cases_get_fresh_ids_and_defaults() {
    let req = parse_request(body("webcoding", 1)).unwrap();
    let cases = backfill_test_cases(&req.test_cases);
    let arr = cases.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_ne!(arr[0]["id"], "test-1");
    assert_ne!(arr[0]["id"], arr[1]["id"]);
    assert_eq!(arr[1]["weightage"], 10);
    assert_eq!(arr[1]["evaluation_type"], "CLIENT_SIDE_EVALUATION");
    assert_eq!(arr[0]["reason_for_failure"], Value::Null);
  }

  #[test]
  fn normalize_fills_pairs_and_strips_js_for_responsive() {
    let req = parse_request(body("responsive", 1)).unwrap();
    let mut set = ReplicaSet::new();
    set.push(
      "replica_1",
      Replica {
        html_solution: Some("<p>x</p>".into()),
        css_code: Some("p{}".into()),
        js_code: Some("alert(1)".into()),
        test_cases: Some(json!([{"display_text": "t"}])),
        subtopic: Some("from model".into()),
        ..Default::default()
      },
    );
    normalize_replicas(&mut set, &req, &derive_metadata(&req));
    let r = set.get("replica_1").unwrap();
    assert_eq!(r.html_code.as_deref(), Some("<p>x</p>"));
    assert_eq!(r.css_solution.as_deref(), Some("p{}"));
    assert_eq!(r.js_code.as_deref(), Some(""));
    assert_eq!(r.js_solution.as_deref(), Some(""));
    assert_eq!(r.subtopic.as_deref(), Some("Css Flexbox"));
    assert!(r.test_cases.as_ref().unwrap()[0]["id"].as_str().is_some_and(|s| !s.is_empty()));
  }

  #[tokio::test]
  async fn webcoding_generation_end_to_end() {
    let oa = serve(Reply::Completion { content: model_json(2), usage: Some((900, 600)) }).await;
    let state = AppState::with_parts(Some(oa), ReplicaConfig::default());
    let req = parse_request(body("webcoding", 2)).unwrap();

    let out = generate(&state, &req).await.unwrap();
    let set = match &out.replicas {
      ReplicasPayload::Generated(set) => set,
      ReplicasPayload::Failed(f) => panic!("unexpected parse failure: {}", f.error),
    };
    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["replica_1", "replica_2"]);
    for (_, r) in set.iter() {
      assert!(!r.html_solution_or_code().is_empty());
      assert!(!r.css_solution_or_code().is_empty());
      assert!(!r.js_solution_or_code().is_empty());
      assert_eq!(r.course.as_deref(), Some("Modern Responsive Web Design"));
    }
    assert_eq!(out.token_usage.total_tokens, 1500);
    assert_eq!(out.session_usage.session_tokens, 1500);
    assert_eq!(state.usage.read().total_tokens, 1500);
  }

  #[tokio::test]
  async fn responsive_generation_has_empty_js() {
    let oa = serve(Reply::Completion { content: model_json(2), usage: Some((10, 10)) }).await;
    let state = AppState::with_parts(Some(oa), ReplicaConfig::default());
    let req = parse_request(body("responsive", 2)).unwrap();

    let out = generate(&state, &req).await.unwrap();
    let ReplicasPayload::Generated(set) = &out.replicas else { panic!("expected replicas") };
    for (_, r) in set.iter() {
      assert_eq!(r.js_code.as_deref(), Some(""));
      assert_eq!(r.js_solution.as_deref(), Some(""));
    }
  }

  #[tokio::test]
  async fn fenced_reply_is_parsed() {
    let content = format!("Here are your replicas!\n```json\n{}\n```\nLet me know if you need more.", model_json(1));
    let oa = serve(Reply::Completion { content, usage: Some((1, 1)) }).await;
    let state = AppState::with_parts(Some(oa), ReplicaConfig::default());
    let req = parse_request(body("webcoding", 1)).unwrap();

    let out = generate(&state, &req).await.unwrap();
    let ReplicasPayload::Generated(set) = &out.replicas else { panic!("expected replicas") };
    assert_eq!(set.get("replica_1").unwrap().short_text.as_deref(), Some("Theme 1"));
  }

  #[tokio::test]
  async fn prose_reply_is_soft_failure_but_still_counted() {
    let prose = "I cannot help with generating these replicas today.";
    let oa = serve(Reply::Completion { content: prose.into(), usage: Some((40, 2)) }).await;
    let state = AppState::with_parts(Some(oa), ReplicaConfig::default());
    let req = parse_request(body("webcoding", 2)).unwrap();

    let out = generate(&state, &req).await.unwrap();
    match &out.replicas {
      ReplicasPayload::Failed(f) => {
        assert_eq!(f.raw_response, prose);
        assert!(!f.error.is_empty());
      }
      ReplicasPayload::Generated(_) => panic!("expected soft failure"),
    }
    assert_eq!(state.usage.read().total_tokens, 42);
  }

  #[tokio::test]
  async fn upstream_failure_records_nothing() {
    let oa = serve(Reply::Status(StatusCode::UNAUTHORIZED, "Incorrect API key provided".into())).await;
    let state = AppState::with_parts(Some(oa), ReplicaConfig::default());
    let req = parse_request(body("webcoding", 1)).unwrap();
    assert!(matches!(generate(&state, &req).await, Err(AppError::Upstream(_))));

    let state = AppState::with_parts(Some(unreachable()), ReplicaConfig::default());
    assert!(matches!(generate(&state, &req).await, Err(AppError::Upstream(_))));
    assert_eq!(state.usage.read().total_tokens, 0);
  }

  #[tokio::test]
  async fn missing_client_is_config_error() {
    let state = AppState::with_parts(None, ReplicaConfig::default());
    let req = parse_request(body("webcoding", 1)).unwrap();
    assert!(matches!(generate(&state, &req).await, Err(AppError::Config(_))));
  }

  #[test]
  fn export_mapping_skips_error_entries() {
    let map = json!({"replica_1": {"short_text": "a"}, "replica_2": {"error": "x", "raw_response": "y"}});
    let set = replicas_for_export(map.as_object().unwrap());
    assert_eq!(set.len(), 1);
  }
}
