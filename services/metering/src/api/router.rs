use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/metering/check", post(handlers::check_action))
        .route("/api/metering/usage", post(handlers::record_usage))
        .route("/api/metering/usage/:subject_id", get(handlers::get_usage))
        .route("/api/metering/tier", post(handlers::set_tier))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
