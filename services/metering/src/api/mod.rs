use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use crate::config::MeteringConfig;
use crate::metering::{MeteringEngine, StaticTierLookup};

pub struct ApiState {
    pub engine: Arc<MeteringEngine>,
    pub tiers: Arc<StaticTierLookup>,
    pub config: Arc<MeteringConfig>,
}

impl ApiState {
    pub fn new(
        engine: Arc<MeteringEngine>,
        tiers: Arc<StaticTierLookup>,
        config: MeteringConfig,
    ) -> Self {
        Self {
            engine,
            tiers,
            config: Arc::new(config),
        }
    }
}
