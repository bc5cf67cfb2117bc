//! Replica Forge · Web coding replica generator backend
//!
//! - Axum HTTP API for generating themed replicas of HTML/CSS/JS coding questions
//! - OpenAI chat.completions integration (via environment variables)
//! - In-memory session/lifetime token counters
//! - Spreadsheet (.xlsx) and JSON exports
//! - Static UI fallback (./static/index.html)
//!
//! Important env variables (a `.env` file is read if present):
//!   PORT                : u16 (default 5000)
//!   OPENAI_API_KEY      : required for generation
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_MODEL        : default "gpt-3.5-turbo"
//!   OPENAI_TIMEOUT_SECS : default 120
//!   REPLICA_CONFIG_PATH : path to TOML config (prompts + generation parameters)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod themes;
mod state;
mod protocol;
mod prompt;
mod parse;
mod usage;
mod export;
mod error;
mod logic;
mod openai;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  dotenvy::dotenv().ok();
  telemetry::init_tracing();

  // Shared application state (OpenAI client, prompts, token counters).
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "replica_forge", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "replica_forge", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "replica_forge", "Shutdown signal received");
}
