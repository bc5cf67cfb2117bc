//! Process-wide token accounting.
//!
//! Two counters: `session_tokens` (resettable) and `total_tokens` (lifetime of the
//! process). Both start at zero; nothing is persisted. Updates use atomic adds so
//! concurrent generations never lose increments.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::TokenUsage;

/// Point-in-time view of the counters.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub session_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Default)]
pub struct UsageCounters {
    session: AtomicU64,
    total: AtomicU64,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one call's `total_tokens` to both counters and return the resulting snapshot.
    #[instrument(level = "debug", skip(self), fields(tokens = usage.total_tokens))]
    pub fn record(&self, usage: &TokenUsage) -> UsageSnapshot {
        let session = self.session.fetch_add(usage.total_tokens, Ordering::SeqCst) + usage.total_tokens;
        let total = self.total.fetch_add(usage.total_tokens, Ordering::SeqCst) + usage.total_tokens;
        info!(target: "usage", added = usage.total_tokens, session, total, "Token usage recorded");
        UsageSnapshot { session_tokens: session, total_tokens: total }
    }

    /// Zero the session counter; the lifetime total is untouched.
    pub fn reset_session(&self) -> UsageSnapshot {
        let previous = self.session.swap(0, Ordering::SeqCst);
        info!(target: "usage", previous, "Session tokens reset");
        self.read()
    }

    pub fn read(&self) -> UsageSnapshot {
        UsageSnapshot {
            session_tokens: self.session.load(Ordering::SeqCst),
            total_tokens: self.total.load(Ordering::SeqCst),
        }
    }
}
