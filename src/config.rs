//! Loading generation configuration (prompts + model parameters) from TOML.
//!
//! Every key is optional; missing keys fall back to the built-in defaults below.
//!
//! ```toml
//! [prompts]
//! system = "..."
//! user_template = "... {original_html} ... {num_replicas} ..."
//!
//! [generation]
//! temperature = 0.7
//! max_tokens = 4000
//! ```

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ReplicaConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationCfg,
}

/// Prompts sent to the chat model. The user template understands these placeholders:
/// `{original_html}`, `{original_css}`, `{original_js}`, `{short_text}`, `{question_text}`,
/// `{test_cases}`, `{num_replicas}`, `{replica_type}`, `{mode_rules}`, `{themes}`, `{output_shape}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: DEFAULT_SYSTEM_PROMPT.into(),
      user_template: DEFAULT_USER_TEMPLATE.into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationCfg {
  pub temperature: f32,
  pub max_tokens: Option<u32>,
}

impl Default for GenerationCfg {
  fn default() -> Self {
    Self { temperature: 0.7, max_tokens: Some(4000) }
  }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert web developer who creates themed replicas of web coding questions. \
Each replica keeps the exact functionality and test semantics of the original while changing its visual theme and content. \
Respond ONLY with one valid JSON object.";

const DEFAULT_USER_TEMPLATE: &str = r#"Create exactly {num_replicas} unique replicas of the {replica_type} coding question below.

## Original question
SHORT_TEXT: {short_text}
QUESTION_TEXT: {question_text}

## Original HTML
{original_html}

## Original CSS
{original_css}

## Original JavaScript
{original_js}

## Test cases
{test_cases}

## Structural preservation
- Keep the same layout structure and DOM hierarchy.
- Keep every event handler and all behaviour covered by the test cases.
- Keep responsive breakpoints and accessibility attributes.
{mode_rules}

## Required changes
- Give every replica its own visual theme: colors, typography, shadows, borders, spacing, transitions.
- Adapt labels, headings, sample data and question text to the replica's theme.
- Rename HTML ids and CSS class names to fit the theme and update every selector that refers to them.
- Adapt the test cases to the new ids and wording; each test must check the same behaviour as the original.

## Suggested themes (one per replica)
{themes}

## Output format
Return ONLY one JSON object, no prose and no markdown. All code goes in JSON strings with \n for line breaks and escaped quotes.
Use exactly the keys below, nothing else:
{output_shape}
"#;

/// Attempt to load `ReplicaConfig` from REPLICA_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_replica_config_from_env() -> Option<ReplicaConfig> {
  let path = std::env::var("REPLICA_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_replica_config(&s) {
      Ok(cfg) => {
        info!(target: "replica_forge", %path, "Loaded replica config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "replica_forge", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "replica_forge", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_replica_config(s: &str) -> Result<ReplicaConfig, toml::de::Error> {
  toml::from_str::<ReplicaConfig>(s)
}
