use std::sync::Arc;

use lingua_metering_service::metering::{MeteringEngine, StaticTierLookup, TierLookup};
use lingua_metering_service::tiers::SubscriptionTier;
use lingua_quota_store::{MemoryCounterStore, QuotaStore};

// Re-export the member crates for benches.
pub use lingua_metering_service;
pub use lingua_quota_store;

pub struct MeteringBenchFixture {
    pub engine: Arc<MeteringEngine>,
    pub tiers: Arc<StaticTierLookup>,
}

impl MeteringBenchFixture {
    pub fn new() -> Self {
        let tiers = Arc::new(StaticTierLookup::new());
        let lookup: Arc<dyn TierLookup> = tiers.clone();
        let store = QuotaStore::with_default_timeout(Arc::new(MemoryCounterStore::new()));
        Self {
            engine: Arc::new(MeteringEngine::new(store, lookup)),
            tiers,
        }
    }

    pub fn with_tier(subject_id: &str, tier: SubscriptionTier) -> Self {
        let fixture = Self::new();
        fixture.tiers.assign(subject_id, tier);
        fixture
    }
}

impl Default for MeteringBenchFixture {
    fn default() -> Self {
        Self::new()
    }
}
