use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::metering::Subject;
use crate::tiers::SubscriptionTier;

use super::types::{
    CheckActionRequest, CheckActionResponse, ErrorResponse, GetUsageResponse, RecordUsageRequest,
    RecordUsageResponse, SetTierRequest, SetTierResponse,
};
use super::ApiState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Consult the quota before performing an action. A deny is a successful
/// response; the calling middleware turns it into a 429 with the retry
/// time. Store trouble never reaches this surface.
pub async fn check_action(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CheckActionRequest>,
) -> ApiResult<CheckActionResponse> {
    let subject = subject_from(request.subject_id.as_deref(), request.ip)?;

    let decision = state
        .engine
        .can_perform_action(&subject, request.action, request.amount)
        .await
        .map_err(|err| bad_request("invalid_request", &err.to_string()))?;

    Ok(Json(CheckActionResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        reset_at: decision.reset_at,
    }))
}

/// Bookkeeping for an action that already completed. Always succeeds from
/// the caller's point of view once the input parses.
pub async fn record_usage(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RecordUsageRequest>,
) -> ApiResult<RecordUsageResponse> {
    if request.subject_id.trim().is_empty() {
        return Err(bad_request("invalid_subject_id", "subject_id cannot be empty"));
    }

    let subject = Subject::user(request.subject_id);
    state.engine.record_usage(&subject, request.deltas).await;

    Ok(Json(RecordUsageResponse { recorded: true }))
}

pub async fn get_usage(
    State(state): State<Arc<ApiState>>,
    Path(subject_id): Path<String>,
) -> ApiResult<GetUsageResponse> {
    if subject_id.trim().is_empty() {
        return Err(bad_request("invalid_subject_id", "subject_id cannot be empty"));
    }

    let subject = Subject::user(subject_id);
    let usage = state.engine.usage_report(&subject).await;
    Ok(Json(GetUsageResponse { usage }))
}

/// Billing pushes tier changes here when a subscription starts, upgrades,
/// or lapses.
pub async fn set_tier(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SetTierRequest>,
) -> ApiResult<SetTierResponse> {
    if request.subject_id.trim().is_empty() {
        return Err(bad_request("invalid_subject_id", "subject_id cannot be empty"));
    }

    let tier = SubscriptionTier::parse(&request.tier)
        .ok_or_else(|| bad_request("invalid_tier", "tier must be free, pro, or enterprise"))?;

    state.tiers.assign(request.subject_id.clone(), tier);
    info!(subject_id = %request.subject_id, tier = %tier, "subscription tier updated");

    Ok(Json(SetTierResponse { success: true }))
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "lingua-metering"
    })))
}

fn subject_from(
    subject_id: Option<&str>,
    ip: Option<std::net::IpAddr>,
) -> Result<Subject, (StatusCode, Json<ErrorResponse>)> {
    match (subject_id, ip) {
        (Some(id), _) if !id.trim().is_empty() => Ok(Subject::user(id)),
        (Some(_), _) => Err(bad_request("invalid_subject_id", "subject_id cannot be empty")),
        (None, Some(addr)) => Ok(Subject::anonymous(addr)),
        (None, None) => Err(bad_request(
            "missing_subject",
            "either subject_id or ip is required",
        )),
    }
}

fn bad_request(code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
        }),
    )
}
