//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs sizes and result info, never code bodies.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, State},
  http::header,
  response::IntoResponse,
  Json,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::AppError;
use crate::export::{download_filename, pretty_json, spreadsheet_rows, write_xlsx, JSON_CONTENT_TYPE, XLSX_CONTENT_TYPE};
use crate::logic::{generate, parse_request, replicas_for_export};
use crate::protocol::*;
use crate::state::AppState;

fn body_or_validation(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
  body.map(|Json(v)| v).map_err(|e| AppError::Validation(e.body_text()))
}

fn attachment(content_type: &str, filename: &str, bytes: Vec<u8>) -> impl IntoResponse {
  (
    [
      (header::CONTENT_TYPE, content_type.to_string()),
      (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
    ],
    bytes,
  )
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let configured = if state.openai.is_some() { "configured" } else { "not_configured" };
  Json(HealthOut {
    status: "ok".into(),
    timestamp: Utc::now().to_rfc3339(),
    openai_api_key: configured.into(),
    model: state.model_name().map(str::to_string),
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_token_usage(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.usage.read())
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset_session_tokens(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let current_usage = state.usage.reset_session();
  Json(ResetOut {
    success: true,
    message: "Session tokens reset successfully".into(),
    current_usage,
  })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_generate_replicas(
  State(state): State<Arc<AppState>>,
  body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
  let req = parse_request(body_or_validation(body)?)?;
  let out = generate(&state, &req).await?;
  info!(
    target: "generation",
    parsed = matches!(out.replicas, ReplicasPayload::Generated(_)),
    total_tokens = out.token_usage.total_tokens,
    session_tokens = out.session_usage.session_tokens,
    "HTTP generate_replicas served"
  );
  Ok(Json(out))
}

#[instrument(level = "info", skip(body))]
pub async fn http_download_excel(
  body: Result<Json<DownloadExcelIn>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
  let Json(body) = body.map_err(|e| AppError::Validation(e.body_text()))?;
  let replicas = replicas_for_export(&body.replicas);
  let rows = spreadsheet_rows(&replicas);
  let bytes = write_xlsx(&rows)?;
  let filename = download_filename("xlsx", Utc::now());
  info!(target: "export", rows = rows.len(), bytes = bytes.len(), %filename, "Spreadsheet export built");
  Ok(attachment(XLSX_CONTENT_TYPE, &filename, bytes))
}

#[instrument(level = "info", skip(body))]
pub async fn http_download_json(
  body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
  let doc = body_or_validation(body)?;
  let bytes = pretty_json(&doc)?;
  let filename = download_filename("json", Utc::now());
  info!(target: "export", bytes = bytes.len(), %filename, "JSON export built");
  Ok(attachment(JSON_CONTENT_TYPE, &filename, bytes))
}
