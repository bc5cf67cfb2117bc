//! Service error type and its HTTP rendering.
//!
//! Parse failures of the model output are deliberately absent: they are not
//! errors of the request and travel inside a 200 response (see `parse::ParseFailure`).

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
  /// Malformed or incomplete question; rejected before any model call.
  #[error("Validation error: {0}")]
  Validation(String),

  /// Network, auth, quota or rate-limit failure talking to the model API.
  #[error("Generation failed: {0}")]
  Upstream(String),

  /// Required configuration (the API key) is missing.
  #[error("Configuration error: {0}")]
  Config(String),

  /// Serializing an export document failed.
  #[error("Export failed: {0}")]
  Export(String),
}

impl AppError {
  pub fn status(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
      AppError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
  fn from(e: rust_xlsxwriter::XlsxError) -> Self {
    AppError::Export(format!("spreadsheet: {e}"))
  }
}

impl From<serde_json::Error> for AppError {
  fn from(e: serde_json::Error) -> Self {
    AppError::Export(format!("json: {e}"))
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(target: "replica_forge", %status, error = %self, "Request failed");
    }
    (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_mapping() {
    assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
    assert_eq!(AppError::Config("x".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(AppError::Export("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
  }

  #[test]
  fn message_names_the_problem() {
    let e = AppError::Validation("missing field `short_text`".into());
    assert_eq!(e.to_string(), "Validation error: missing field `short_text`");
  }
}
