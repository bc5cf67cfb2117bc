//! Public HTTP request/response structs (serde ready).
//! Keep this small and stable so backend and the upload/preview UI can evolve independently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ReplicaSet, TokenUsage};
use crate::parse::ParseFailure;
use crate::usage::UsageSnapshot;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthOut {
    pub status: String,
    pub timestamp: String,
    /// "configured" | "not_configured"
    pub openai_api_key: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetOut {
    pub success: bool,
    pub message: String,
    pub current_usage: UsageSnapshot,
}

/// Either the parsed replicas, or the soft parse failure `{error, raw_response}`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReplicasPayload {
    Generated(ReplicaSet),
    Failed(ParseFailure),
}

#[derive(Debug, Serialize)]
pub struct GenerateOut {
    pub success: bool,
    pub replicas: ReplicasPayload,
    pub token_usage: TokenUsage,
    pub session_usage: UsageSnapshot,
}

/// Body of `POST /api/download-excel`. Values are kept loose: the UI may have edited them.
#[derive(Debug, Deserialize)]
pub struct DownloadExcelIn {
    #[serde(default)]
    pub replicas: Map<String, Value>,
}
