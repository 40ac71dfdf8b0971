use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use lingua_metering_service::metering::{
    MeteringEngine, MeteringError, StaticTierLookup, Subject, TierLookup, UsageDelta,
};
use lingua_metering_service::tiers::{ActionType, SubscriptionTier};
use lingua_quota_store::{
    CounterStore, MemoryCounterStore, QuotaDecision, QuotaStore, StoreError,
};

struct CountingStore {
    inner: MemoryCounterStore,
    check_calls: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryCounterStore::new(),
            check_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CounterStore for CountingStore {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        amount: u64,
    ) -> Result<QuotaDecision, StoreError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.check_and_increment(key, limit, window, amount).await
    }

    async fn add_usage(&self, key: &str, delta: u64, ttl: Duration) -> Result<u64, StoreError> {
        self.inner.add_usage(key, delta, ttl).await
    }

    async fn get_usage(&self, key: &str) -> Result<u64, StoreError> {
        self.inner.get_usage(key).await
    }
}

struct FailingStore;

#[async_trait]
impl CounterStore for FailingStore {
    async fn check_and_increment(
        &self,
        _key: &str,
        _limit: u64,
        _window: Duration,
        _amount: u64,
    ) -> Result<QuotaDecision, StoreError> {
        Err(StoreError::BadReply("connection refused".to_string()))
    }

    async fn add_usage(&self, _key: &str, _delta: u64, _ttl: Duration) -> Result<u64, StoreError> {
        Err(StoreError::BadReply("connection refused".to_string()))
    }

    async fn get_usage(&self, _key: &str) -> Result<u64, StoreError> {
        Err(StoreError::BadReply("connection refused".to_string()))
    }
}

fn engine_over(backend: Arc<dyn CounterStore>) -> (MeteringEngine, Arc<StaticTierLookup>) {
    let tiers = Arc::new(StaticTierLookup::new());
    let lookup: Arc<dyn TierLookup> = tiers.clone();
    let engine = MeteringEngine::new(QuotaStore::with_default_timeout(backend), lookup);
    (engine, tiers)
}

fn free_engine() -> (MeteringEngine, Arc<StaticTierLookup>) {
    engine_over(Arc::new(MemoryCounterStore::new()))
}

#[tokio::test]
async fn free_tier_daily_messages_end_to_end() {
    let (engine, tiers) = free_engine();
    tiers.assign("u1", SubscriptionTier::Free);
    let subject = Subject::user("u1");

    for expected_remaining in (0..50).rev() {
        let decision = engine
            .can_perform_action(&subject, ActionType::Message, 1)
            .await
            .expect("valid input");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(expected_remaining));
    }

    let denied = engine
        .can_perform_action(&subject, ActionType::Message, 1)
        .await
        .expect("valid input");
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, Some(0));

    let reset_at = denied.reset_at.expect("denied decision carries reset_at");
    let tomorrow = Utc::now().date_naive().succ_opt().expect("next day");
    assert_eq!(reset_at.date_naive(), tomorrow);
    assert_eq!((reset_at.hour(), reset_at.minute(), reset_at.second()), (0, 0, 0));
}

#[tokio::test]
async fn action_types_meter_independently() {
    let (engine, tiers) = free_engine();
    tiers.assign("u1", SubscriptionTier::Free);
    let subject = Subject::user("u1");

    for _ in 0..3 {
        engine
            .can_perform_action(&subject, ActionType::Message, 1)
            .await
            .expect("valid input");
        engine
            .can_perform_action(&subject, ActionType::Voice, 1)
            .await
            .expect("valid input");
    }

    let message = engine
        .can_perform_action(&subject, ActionType::Message, 1)
        .await
        .expect("valid input");
    let voice = engine
        .can_perform_action(&subject, ActionType::Voice, 1)
        .await
        .expect("valid input");

    // Free tier: 50 daily messages, 30 monthly voice minutes.
    assert_eq!(message.remaining, Some(50 - 4));
    assert_eq!(voice.remaining, Some(30 - 4));
}

#[tokio::test]
async fn unlimited_actions_never_touch_the_store() {
    let backend = Arc::new(CountingStore::new());
    let counter_store: Arc<dyn CounterStore> = backend.clone();
    let (engine, tiers) = engine_over(counter_store);
    tiers.assign("exec", SubscriptionTier::Enterprise);
    let subject = Subject::user("exec");

    for _ in 0..10 {
        let decision = engine
            .can_perform_action(&subject, ActionType::Message, 1)
            .await
            .expect("valid input");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, None);
        assert_eq!(decision.reset_at, None);
    }

    assert_eq!(backend.check_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pro_tier_mixes_limited_and_unlimited() {
    let backend = Arc::new(CountingStore::new());
    let counter_store: Arc<dyn CounterStore> = backend.clone();
    let (engine, tiers) = engine_over(counter_store);
    tiers.assign("pro-user", SubscriptionTier::Pro);
    let subject = Subject::user("pro-user");

    let translation = engine
        .can_perform_action(&subject, ActionType::Translation, 1)
        .await
        .expect("valid input");
    assert!(translation.allowed);
    assert_eq!(translation.remaining, None);
    assert_eq!(backend.check_calls.load(Ordering::SeqCst), 0);

    let message = engine
        .can_perform_action(&subject, ActionType::Message, 1)
        .await
        .expect("valid input");
    assert!(message.allowed);
    assert_eq!(message.remaining, Some(999));
    assert_eq!(backend.check_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_subject_defaults_to_free_limits() {
    let (engine, _tiers) = free_engine();
    let subject = Subject::user("never-registered");

    let decision = engine
        .can_perform_action(&subject, ActionType::Message, 1)
        .await
        .expect("valid input");
    assert!(decision.allowed);
    assert_eq!(decision.remaining, Some(49), "free tier limits apply");
}

#[tokio::test]
async fn anonymous_callers_are_metered_by_ip_under_free_limits() {
    let (engine, _tiers) = free_engine();
    let first_ip = Subject::anonymous("203.0.113.7".parse().unwrap());
    let second_ip = Subject::anonymous("203.0.113.8".parse().unwrap());

    let first = engine
        .can_perform_action(&first_ip, ActionType::Translation, 1)
        .await
        .expect("valid input");
    let second = engine
        .can_perform_action(&second_ip, ActionType::Translation, 1)
        .await
        .expect("valid input");

    assert_eq!(first.remaining, Some(99));
    assert_eq!(second.remaining, Some(99), "addresses meter separately");
}

#[tokio::test]
async fn store_outage_fails_open_at_the_engine_surface() {
    let (engine, tiers) = engine_over(Arc::new(FailingStore));
    tiers.assign("u1", SubscriptionTier::Free);
    let subject = Subject::user("u1");

    for _ in 0..60 {
        let decision = engine
            .can_perform_action(&subject, ActionType::Message, 1)
            .await
            .expect("store trouble must not surface as an error");
        assert!(decision.allowed, "fail open during store outage");
    }
}

#[tokio::test]
async fn batch_amount_is_admitted_atomically() {
    let (engine, tiers) = free_engine();
    tiers.assign("u1", SubscriptionTier::Free);
    let subject = Subject::user("u1");

    let batch = engine
        .can_perform_action(&subject, ActionType::Message, 48)
        .await
        .expect("valid input");
    assert!(batch.allowed);
    assert_eq!(batch.remaining, Some(2));

    let over = engine
        .can_perform_action(&subject, ActionType::Message, 3)
        .await
        .expect("valid input");
    assert!(!over.allowed, "partial admission is not permitted");

    let fits = engine
        .can_perform_action(&subject, ActionType::Message, 2)
        .await
        .expect("valid input");
    assert!(fits.allowed, "denied batch must not consume capacity");
}

#[tokio::test]
async fn batch_bigger_than_the_whole_limit_is_denied_without_a_store_call() {
    let backend = Arc::new(CountingStore::new());
    let counter_store: Arc<dyn CounterStore> = backend.clone();
    let (engine, tiers) = engine_over(counter_store);
    tiers.assign("u1", SubscriptionTier::Free);
    let subject = Subject::user("u1");

    // Free tier allows 50 daily messages; neither 51 nor u64::MAX can fit.
    for amount in [51, u64::MAX] {
        let denied = engine
            .can_perform_action(&subject, ActionType::Message, amount)
            .await
            .expect("valid input");
        assert!(!denied.allowed);
        assert!(denied.reset_at.is_some(), "deny carries a retry time");
    }
    assert_eq!(backend.check_calls.load(Ordering::SeqCst), 0);

    let next = engine
        .can_perform_action(&subject, ActionType::Message, 50)
        .await
        .expect("valid input");
    assert!(next.allowed, "oversized batches must not consume capacity");
}

#[tokio::test]
async fn record_usage_accumulates_durable_counters() {
    let (engine, tiers) = free_engine();
    tiers.assign("u1", SubscriptionTier::Free);
    let subject = Subject::user("u1");

    let delta = UsageDelta {
        messages: 1,
        ..UsageDelta::default()
    };
    engine.record_usage(&subject, delta).await;
    engine.record_usage(&subject, delta).await;

    let report = engine.usage_report(&subject).await;
    assert_eq!(report.messages, 2);
    assert_eq!(report.tokens, 0);
}

#[tokio::test]
async fn record_usage_swallows_store_failures() {
    let (engine, _tiers) = engine_over(Arc::new(FailingStore));
    let subject = Subject::user("u1");

    // Must not panic or propagate; the action already succeeded upstream.
    engine
        .record_usage(
            &subject,
            UsageDelta {
                messages: 1,
                tokens: 250,
                ..UsageDelta::default()
            },
        )
        .await;

    let report = engine.usage_report(&subject).await;
    assert_eq!(report.messages, 0, "unreadable counters report zero");
}

#[tokio::test]
async fn invalid_input_fails_fast() {
    let (engine, _tiers) = free_engine();

    let empty = engine
        .can_perform_action(&Subject::user(""), ActionType::Message, 1)
        .await;
    assert_eq!(empty.unwrap_err(), MeteringError::EmptySubject);

    let zero = engine
        .can_perform_action(&Subject::user("u1"), ActionType::Message, 0)
        .await;
    assert_eq!(zero.unwrap_err(), MeteringError::InvalidAmount(0));
}

mod api {
    use super::*;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use lingua_metering_service::api::{create_router, ApiState};
    use lingua_metering_service::config::MeteringConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> Arc<ApiState> {
        let tiers = Arc::new(StaticTierLookup::new());
        let lookup: Arc<dyn TierLookup> = tiers.clone();
        let engine = Arc::new(MeteringEngine::new(
            QuotaStore::with_default_timeout(Arc::new(MemoryCounterStore::new())),
            lookup,
        ));
        Arc::new(ApiState::new(engine, tiers, MeteringConfig::default()))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    #[tokio::test]
    async fn check_endpoint_returns_decision() {
        let router = create_router(test_state());

        let response = router
            .oneshot(post_json(
                "/api/metering/check",
                json!({"subject_id": "u1", "action": "message"}),
            ))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["allowed"], json!(true));
        assert_eq!(body["remaining"], json!(49));
    }

    #[tokio::test]
    async fn check_endpoint_rejects_missing_subject() {
        let router = create_router(test_state());

        let response = router
            .oneshot(post_json("/api/metering/check", json!({"action": "message"})))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], json!("missing_subject"));
    }

    #[tokio::test]
    async fn tier_update_changes_enforcement() {
        let state = test_state();
        let router = create_router(Arc::clone(&state));

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/metering/tier",
                json!({"subject_id": "u1", "tier": "enterprise"}),
            ))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(post_json(
                "/api/metering/check",
                json!({"subject_id": "u1", "action": "message"}),
            ))
            .await
            .expect("router responds");
        let body = body_json(response).await;
        assert_eq!(body["allowed"], json!(true));
        assert_eq!(body["remaining"], json!(null));
    }

    #[tokio::test]
    async fn usage_roundtrip_through_the_api() {
        let state = test_state();
        let router = create_router(Arc::clone(&state));

        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(post_json(
                    "/api/metering/usage",
                    json!({"subject_id": "u1", "deltas": {"messages": 1, "tokens": 120}}),
                ))
                .await
                .expect("router responds");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/metering/usage/u1")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["usage"]["messages"], json!(2));
        assert_eq!(body["usage"]["tokens"], json!(240));
    }
}
