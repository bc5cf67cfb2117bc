//! Application state shared by every handler.
//!
//! This module owns:
//!   - the optional OpenAI client (None when OPENAI_API_KEY is absent)
//!   - the prompts and generation parameters (from TOML or defaults)
//!   - the process-wide token counters
//!
//! Everything else is request-scoped.

use tracing::{info, instrument, warn};

use crate::config::{load_replica_config_from_env, GenerationCfg, Prompts, ReplicaConfig};
use crate::openai::OpenAI;
use crate::usage::UsageCounters;

pub struct AppState {
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub generation: GenerationCfg,
    pub usage: UsageCounters,
}

impl AppState {
    /// Build state from env: load config, init OpenAI, zero the counters.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_replica_config_from_env().unwrap_or_default();

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "replica_forge", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
        } else {
            warn!(target: "replica_forge", "OPENAI_API_KEY not set; generation requests will be refused.");
        }

        Self::with_parts(openai, cfg)
    }

    pub fn with_parts(openai: Option<OpenAI>, cfg: ReplicaConfig) -> Self {
        Self {
            openai,
            prompts: cfg.prompts,
            generation: cfg.generation,
            usage: UsageCounters::new(),
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.openai.as_ref().map(|oa| oa.model.as_str())
    }
}
