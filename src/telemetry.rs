//! Log setup for the replica service.
//!
//! `LOG_LEVEL` takes full filter directives (a bare "debug" works too) and falls
//! back to `DEFAULT_DIRECTIVES`. `LOG_FORMAT=json` writes one JSON object per line
//! for log shippers; anything else gets the human-readable fmt output.
//!
//! Targets emitted by this crate:
//! - `replica_forge` startup, config and shutdown
//! - `generation`    prompt build, model call, response parsing
//! - `usage`         token counter updates and resets
//! - `export`        spreadsheet / JSON downloads

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str =
    "info,replica_forge=debug,generation=debug,usage=info,export=info,tower_http=info,axum=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

fn wants_json() -> bool {
    std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"))
}

/// Install the global subscriber. Call once, before the router is built.
pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_line_number(true);

    if wants_json() {
        builder.json().with_current_span(true).init();
    } else {
        builder.init();
    }
}
