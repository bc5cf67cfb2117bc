//! Minimal OpenAI-compatible chat.completions client.
//!
//! One call per generation: system + user message in, completion text and token
//! usage out. No retries. Calls are instrumented and log model name, latency,
//! response size and token figures (never prompt contents or the API key).

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::GenerationCfg;
use crate::domain::TokenUsage;
use crate::error::AppError;
use crate::prompt::BuiltPrompt;
use crate::util::{estimate_tokens, trunc_for_log};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

/// Completion text plus the token figures for that single call.
#[derive(Clone, Debug)]
pub struct ModelReply {
  pub text: String,
  pub usage: TokenUsage,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
    let timeout = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(DEFAULT_TIMEOUT_SECS);

    match Self::new(api_key, base_url, model, Duration::from_secs(timeout)) {
      Ok(oa) => Some(oa),
      Err(e) => {
        error!(target: "replica_forge", error = %e, "Failed to build HTTP client for OpenAI");
        None
      }
    }
  }

  pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      api_key,
      base_url: base_url.trim_end_matches('/').to_string(),
      model,
    })
  }

  /// Send one chat completion. Any transport, HTTP-status or body-shape problem is an
  /// `AppError::Upstream`; rate limits and quota errors are not distinguished.
  #[instrument(level = "info", skip(self, prompt, gen), fields(model = %self.model, user_len = prompt.user.len()))]
  pub async fn complete(&self, prompt: &BuiltPrompt, gen: &GenerationCfg) -> Result<ModelReply, AppError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: prompt.system.clone() },
        ChatMessageReq { role: "user".into(), content: prompt.user.clone() },
      ],
      temperature: gen.temperature,
      max_tokens: gen.max_tokens,
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "replica-forge-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| AppError::Upstream(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 500));
      error!(target: "generation", %status, elapsed = ?start.elapsed(), "OpenAI returned an error status");
      return Err(AppError::Upstream(format!("OpenAI HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| AppError::Upstream(format!("invalid completion body: {e}")))?;
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    let usage = match &body.usage {
      Some(u) => {
        let input = u.prompt_tokens.unwrap_or(0);
        let output = u.completion_tokens.unwrap_or(0);
        TokenUsage { input_tokens: input, output_tokens: output, total_tokens: u.total_tokens.unwrap_or(input + output) }
      }
      None => {
        let input = estimate_tokens(&prompt.system) + estimate_tokens(&prompt.user);
        let output = estimate_tokens(&text);
        TokenUsage { input_tokens: input, output_tokens: output, total_tokens: input + output }
      }
    };

    info!(
      target: "generation",
      elapsed = ?start.elapsed(),
      response_len = text.len(),
      input_tokens = usage.input_tokens,
      output_tokens = usage.output_tokens,
      total_tokens = usage.total_tokens,
      estimated = body.usage.is_none(),
      "Model response received"
    );

    Ok(ModelReply { text, usage })
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u64>,
  #[serde(default)] completion_tokens: Option<u64>,
  #[serde(default)] total_tokens: Option<u64>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

/// In-process stand-in for the chat.completions endpoint, used by tests across modules.
#[cfg(test)]
pub mod fake {
  use axum::{http::StatusCode, routing::post, Json, Router};
  use serde_json::{json, Value};
  use std::time::Duration;
  use tokio::net::TcpListener;

  use super::OpenAI;

  pub enum Reply {
    /// 200 with this completion text and usage block.
    Completion { content: String, usage: Option<(u64, u64)> },
    /// Non-2xx status with an OpenAI-style error body.
    Status(StatusCode, String),
  }

  /// Bind a fake endpoint on 127.0.0.1:0 and return a client pointed at it.
  pub async fn serve(reply: Reply) -> OpenAI {
    let (status, body) = match reply {
      Reply::Completion { content, usage } => {
        let mut body = json!({
          "id": "chatcmpl-test",
          "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        });
        if let Some((p, c)) = usage {
          body["usage"] = json!({"prompt_tokens": p, "completion_tokens": c, "total_tokens": p + c});
        }
        (StatusCode::OK, body)
      }
      Reply::Status(code, message) => (code, json!({"error": {"message": message, "type": "test"}})),
    };

    let app = Router::new().route(
      "/v1/chat/completions",
      post(move |Json(_req): Json<Value>| {
        let body = body.clone();
        async move { (status, Json(body)) }
      }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });

    OpenAI::new("sk-test".into(), format!("http://{}/v1", addr), "gpt-test".into(), Duration::from_secs(5)).unwrap()
  }

  /// A client pointed at a port nothing listens on.
  pub fn unreachable() -> OpenAI {
    OpenAI::new("sk-test".into(), "http://127.0.0.1:9/v1".into(), "gpt-test".into(), Duration::from_secs(2)).unwrap()
  }
}

#[cfg(test)]
mod tests {
  use super::fake::{serve, unreachable, Reply};
  use super::*;
  use axum::http::StatusCode;

  fn prompt() -> BuiltPrompt {
    BuiltPrompt { system: "sys".into(), user: "make 2 replicas".into() }
  }

  #[tokio::test]
  async fn returns_text_and_reported_usage() {
    let oa = serve(Reply::Completion { content: "{\"replica_1\": {}}".into(), usage: Some((100, 20)) }).await;
    let reply = oa.complete(&prompt(), &GenerationCfg::default()).await.unwrap();
    assert_eq!(reply.text, "{\"replica_1\": {}}");
    assert_eq!(reply.usage, TokenUsage { input_tokens: 100, output_tokens: 20, total_tokens: 120 });
  }

  #[tokio::test]
  async fn estimates_usage_when_missing() {
    let oa = serve(Reply::Completion { content: "abcdefgh".into(), usage: None }).await;
    let reply = oa.complete(&prompt(), &GenerationCfg::default()).await.unwrap();
    assert_eq!(reply.usage.output_tokens, 2);
    assert_eq!(reply.usage.total_tokens, reply.usage.input_tokens + 2);
  }

  #[tokio::test]
  async fn error_status_is_upstream_failure() {
    let oa = serve(Reply::Status(StatusCode::TOO_MANY_REQUESTS, "Rate limit reached".into())).await;
    let err = oa.complete(&prompt(), &GenerationCfg::default()).await.unwrap_err();
    match err {
      AppError::Upstream(msg) => {
        assert!(msg.contains("429"));
        assert!(msg.contains("Rate limit reached"));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn network_failure_is_upstream_failure() {
    let err = unreachable().complete(&prompt(), &GenerationCfg::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
  }

  #[test]
  fn openai_error_message_is_extracted() {
    let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Incorrect API key provided"));
    assert!(extract_openai_error("<html>bad gateway</html>").is_none());
  }
}
