use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metering::{UsageDelta, UsageReport};
use crate::tiers::ActionType;

fn default_amount() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CheckActionRequest {
    pub subject_id: Option<String>,
    pub ip: Option<IpAddr>,
    pub action: ActionType,
    #[serde(default = "default_amount")]
    pub amount: u64,
}

#[derive(Debug, Serialize)]
pub struct CheckActionResponse {
    pub allowed: bool,
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    pub subject_id: String,
    #[serde(default)]
    pub deltas: UsageDelta,
}

#[derive(Debug, Serialize)]
pub struct RecordUsageResponse {
    pub recorded: bool,
}

#[derive(Debug, Serialize)]
pub struct GetUsageResponse {
    pub usage: UsageReport,
}

#[derive(Debug, Deserialize)]
pub struct SetTierRequest {
    pub subject_id: String,
    pub tier: String,
}

#[derive(Debug, Serialize)]
pub struct SetTierResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
