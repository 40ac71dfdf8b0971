use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single window check. Never persisted; returned synchronously
/// to the caller. `remaining` and `reset_at` are `None` only when the
/// limit was unlimited and the store was never consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
    pub total_hits: u64,
}

impl QuotaDecision {
    pub fn allow(remaining: u64, reset_at: DateTime<Utc>, total_hits: u64) -> Self {
        Self {
            allowed: true,
            remaining: Some(remaining),
            reset_at: Some(reset_at),
            total_hits,
        }
    }

    pub fn deny(reset_at: DateTime<Utc>, total_hits: u64) -> Self {
        Self {
            allowed: false,
            remaining: Some(0),
            reset_at: Some(reset_at),
            total_hits,
        }
    }

    /// Decision for a tier with no finite limit on this action. The store
    /// is never consulted, so there is no meaningful count or reset time.
    pub fn unlimited(amount: u64) -> Self {
        Self {
            allowed: true,
            remaining: None,
            reset_at: None,
            total_hits: amount,
        }
    }

    /// Fail-open decision used when the store errors or times out.
    /// Availability wins over strict enforcement.
    pub fn fail_open(limit: u64, amount: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining: Some(limit.saturating_sub(amount)),
            reset_at: Some(reset_at),
            total_hits: amount,
        }
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}
