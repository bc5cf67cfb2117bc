//! Domain models: the uploaded question, its solution code, test cases,
//! the generation request, and the replicas the model sends back.

use serde::{
  de::{Deserializer, MapAccess, Visitor},
  ser::{SerializeMap, Serializer},
  Deserialize, Serialize,
};
use serde_json::{Map, Value};

/// Language tag of one solution code block.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
  Html,
  Css,
  Javascript,
  /// Anything else the authoring tool exports (e.g. PYTHON); ignored.
  #[serde(other)]
  Other,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodeBlock {
  pub language: Language,
  #[serde(default)] pub code_data: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Solution {
  #[serde(default)] pub code_details: Vec<CodeBlock>,
}

impl Solution {
  /// Code for a language; the last block wins when a language repeats.
  pub fn code_for(&self, lang: Language) -> Option<&str> {
    self.code_details
      .iter()
      .rev()
      .find(|b| b.language == lang)
      .map(|b| b.code_data.as_str())
  }
}

/// A test case as authored on the original question.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
  #[serde(default)] pub id: Value,
  #[serde(default)] pub display_text: String,
  #[serde(default)] pub criteria: String,
  #[serde(default)] pub order: Option<i64>,
  #[serde(default)] pub weightage: Option<i64>,
  #[serde(default)] pub evaluation_type: Option<String>,
  #[serde(default)] pub reason_for_failure: Option<Value>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaType {
  /// HTML + CSS + JavaScript behaviour.
  Webcoding,
  /// HTML + CSS only.
  Responsive,
}

impl ReplicaType {
  pub fn as_str(self) -> &'static str {
    match self {
      ReplicaType::Webcoding => "webcoding",
      ReplicaType::Responsive => "responsive",
    }
  }
}

/// Body of `POST /api/generate-replicas`: the flattened question plus generation options.
#[derive(Clone, Debug, Deserialize)]
pub struct ReplicaRequest {
  pub question_text: String,
  pub short_text: String,
  pub solutions_metadata: Vec<Solution>,
  pub test_cases: Vec<TestCase>,
  pub replica_type: ReplicaType,
  pub num_replicas: u32,

  // Metadata; explicit fields win over tag-derived values.
  #[serde(default)] pub tag_names: Vec<String>,
  #[serde(default)] pub subtopic: Option<String>,
  #[serde(default)] pub course: Option<String>,
  #[serde(default)] pub module: Option<String>,
  #[serde(default)] pub unit: Option<String>,
}

impl ReplicaRequest {
  /// Only the first solution is used; later entries are ignored.
  pub fn solution(&self) -> Option<&Solution> {
    self.solutions_metadata.first()
  }

  pub fn html(&self) -> &str {
    self.solution().and_then(|s| s.code_for(Language::Html)).unwrap_or_default()
  }

  pub fn css(&self) -> &str {
    self.solution().and_then(|s| s.code_for(Language::Css)).unwrap_or_default()
  }

  pub fn js(&self) -> &str {
    self.solution().and_then(|s| s.code_for(Language::Javascript)).unwrap_or_default()
  }
}

/// Classification metadata stamped onto every replica.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
  pub subtopic: String,
  pub course: String,
  pub module: String,
  pub unit: String,
}

/// One generated variant. Every member is optional: the model may omit any of them
/// and callers may send back edited copies with fields removed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "Value")]
pub struct Replica {
  #[serde(skip_serializing_if = "Option::is_none")] pub short_text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub html_code: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub css_code: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub js_code: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub question_text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub test_cases: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")] pub html_solution: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub css_solution: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub js_solution: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub subtopic: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub course: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub module: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] pub unit: Option<String>,
}

/// Lenient conversion: strings are kept, numbers/bools are stringified,
/// null and anything non-scalar count as absent. `test_cases` is kept as-is.
impl From<Value> for Replica {
  fn from(v: Value) -> Self {
    match v {
      Value::Object(obj) => Replica::from_object(&obj),
      _ => Replica::default(),
    }
  }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
  match obj.get(key)? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

impl Replica {
  pub fn from_object(obj: &Map<String, Value>) -> Self {
    Self {
      short_text: text_field(obj, "short_text"),
      html_code: text_field(obj, "html_code"),
      css_code: text_field(obj, "css_code"),
      js_code: text_field(obj, "js_code"),
      question_text: text_field(obj, "question_text"),
      test_cases: obj.get("test_cases").filter(|v| !v.is_null()).cloned(),
      html_solution: text_field(obj, "html_solution"),
      css_solution: text_field(obj, "css_solution"),
      js_solution: text_field(obj, "js_solution"),
      subtopic: text_field(obj, "subtopic"),
      course: text_field(obj, "course"),
      module: text_field(obj, "module"),
      unit: text_field(obj, "unit"),
    }
  }

  /// `html_solution`, else `html_code`, else empty.
  pub fn html_solution_or_code(&self) -> &str {
    first_non_empty(&self.html_solution, &self.html_code)
  }
  pub fn css_solution_or_code(&self) -> &str {
    first_non_empty(&self.css_solution, &self.css_code)
  }
  pub fn js_solution_or_code(&self) -> &str {
    first_non_empty(&self.js_solution, &self.js_code)
  }
  /// `html_code`, else `html_solution`, else empty.
  pub fn html_code_or_solution(&self) -> &str {
    first_non_empty(&self.html_code, &self.html_solution)
  }
  pub fn css_code_or_solution(&self) -> &str {
    first_non_empty(&self.css_code, &self.css_solution)
  }
  pub fn js_code_or_solution(&self) -> &str {
    first_non_empty(&self.js_code, &self.js_solution)
  }

  /// True when the model left this replica without usable test cases.
  pub fn lacks_test_cases(&self) -> bool {
    match &self.test_cases {
      None | Some(Value::Null) => true,
      Some(Value::String(s)) => s.trim().is_empty(),
      Some(Value::Array(a)) => a.is_empty(),
      Some(Value::Object(o)) => o.is_empty(),
      Some(_) => false,
    }
  }
}

fn first_non_empty<'a>(a: &'a Option<String>, b: &'a Option<String>) -> &'a str {
  match (a.as_deref(), b.as_deref()) {
    (Some(x), _) if !x.is_empty() => x,
    (_, Some(y)) => y,
    (Some(x), None) => x,
    (None, None) => "",
  }
}

/// Ordered `replica_N -> Replica` mapping. Serializes as a JSON object in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplicaSet {
  entries: Vec<(String, Replica)>,
}

impl ReplicaSet {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, key: impl Into<String>, replica: Replica) {
    self.entries.push((key.into(), replica));
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn get(&self, key: &str) -> Option<&Replica> {
    self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(k, _)| k.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Replica)> {
    self.entries.iter().map(|(k, r)| (k.as_str(), r))
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Replica)> {
    self.entries.iter_mut().map(|(k, r)| (k.as_str(), r))
  }

  /// Build from an arbitrary (possibly user-edited) mapping.
  /// Entries that are not objects, or that carry an `error` marker, are skipped.
  pub fn from_map(map: &Map<String, Value>) -> Self {
    let mut set = Self::new();
    for (key, value) in map {
      if let Value::Object(obj) = value {
        if obj.contains_key("error") {
          continue;
        }
        set.push(key.clone(), Replica::from_object(obj));
      }
    }
    set
  }
}

impl Serialize for ReplicaSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (k, r) in &self.entries {
      map.serialize_entry(k, r)?;
    }
    map.end()
  }
}

impl<'de> Deserialize<'de> for ReplicaSet {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct SetVisitor;

    impl<'de> Visitor<'de> for SetVisitor {
      type Value = ReplicaSet;

      fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a mapping of replica keys to replica objects")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ReplicaSet, A::Error> {
        let mut set = ReplicaSet::new();
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
          if let Value::Object(obj) = &v {
            if !obj.contains_key("error") {
              set.push(k, Replica::from_object(obj));
            }
          }
        }
        Ok(set)
      }
    }

    deserializer.deserialize_map(SetVisitor)
  }
}

/// Token figures for one model call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
  pub input_tokens: u64,
  pub output_tokens: u64,
  pub total_tokens: u64,
}
