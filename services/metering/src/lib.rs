pub mod api;
pub mod config;
pub mod metering;
pub mod tiers;

pub use api::{create_router, ApiState};
pub use metering::{
    MeteringEngine, MeteringError, StaticTierLookup, Subject, TierLookup, UsageDelta, UsageReport,
};
pub use tiers::{ActionType, Limit, LimitSet, QuotaWindow, SubscriptionTier};
