use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod engine;
mod keys;

pub use engine::{MeteringEngine, UsageReport};
pub use keys::{usage_key, window_key, Subject};

use crate::tiers::{QuotaWindow, SubscriptionTier};

/// Contract violations by the caller. Infrastructure trouble never shows
/// up here; the store fails open and tier lookup fails restrictive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeteringError {
    #[error("subject id must not be empty")]
    EmptySubject,
    #[error("amount must be at least 1, got {0}")]
    InvalidAmount(u64),
}

/// Tier resolution, owned by the billing subsystem. The engine only
/// consumes it; a miss or failure is treated as the most restrictive
/// known tier.
#[async_trait]
pub trait TierLookup: Send + Sync {
    async fn tier_for(&self, subject_id: &str) -> anyhow::Result<Option<SubscriptionTier>>;
}

/// In-process tier table, fed by whatever pushes billing state at this
/// service. Also the lookup used by tests.
#[derive(Default)]
pub struct StaticTierLookup {
    tiers: DashMap<String, SubscriptionTier>,
}

impl StaticTierLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, subject_id: impl Into<String>, tier: SubscriptionTier) {
        self.tiers.insert(subject_id.into(), tier);
    }
}

#[async_trait]
impl TierLookup for StaticTierLookup {
    async fn tier_for(&self, subject_id: &str) -> anyhow::Result<Option<SubscriptionTier>> {
        Ok(self.tiers.get(subject_id).map(|tier| *tier))
    }
}

/// Durable usage increments for one completed action, keyed per resource.
/// Absent fields default to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDelta {
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub voice_minutes: u64,
    #[serde(default)]
    pub translations: u64,
}

impl UsageDelta {
    pub fn is_empty(&self) -> bool {
        self.messages == 0 && self.tokens == 0 && self.voice_minutes == 0 && self.translations == 0
    }

    /// Per-resource view: name, billing window, and delta.
    pub fn entries(&self) -> [(&'static str, QuotaWindow, u64); 4] {
        [
            ("messages", QuotaWindow::Daily, self.messages),
            ("tokens", QuotaWindow::Monthly, self.tokens),
            ("voice_minutes", QuotaWindow::Monthly, self.voice_minutes),
            ("translations", QuotaWindow::Daily, self.translations),
        ]
    }
}
