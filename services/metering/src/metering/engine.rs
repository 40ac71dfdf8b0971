use std::sync::Arc;

use chrono::Utc;
use lingua_quota_store::{QuotaDecision, QuotaStore};
use serde::Serialize;
use tracing::{debug, warn};

use crate::tiers::{ActionType, Limit, LimitSet, QuotaWindow, SubscriptionTier};

use super::keys::{usage_key, window_key, Subject};
use super::{MeteringError, TierLookup, UsageDelta};

/// Translates (subject, action, amount) into an allow/deny decision using
/// the subject's subscription tier, and separately persists durable usage
/// counters. Holds no mutable state of its own; every shared count lives
/// in the counter store, which is what lets multiple engine instances run
/// without coordination.
pub struct MeteringEngine {
    store: QuotaStore,
    tiers: Arc<dyn TierLookup>,
}

impl MeteringEngine {
    pub fn new(store: QuotaStore, tiers: Arc<dyn TierLookup>) -> Self {
        Self { store, tiers }
    }

    /// Pure lookup on the static tier table.
    pub fn resolve_limits(&self, tier: SubscriptionTier) -> LimitSet {
        tier.limits()
    }

    /// Checks and consumes `amount` slots of the action's window in one
    /// atomic step. Unlimited tiers short-circuit without touching the
    /// store; store trouble fails open inside `QuotaStore`. The only
    /// `Err` here is caller error.
    pub async fn can_perform_action(
        &self,
        subject: &Subject,
        action: ActionType,
        amount: u64,
    ) -> Result<QuotaDecision, MeteringError> {
        validate(subject, amount)?;

        let tier = self.effective_tier(subject).await;
        let limit = tier.limits().limit_for(action);

        let Limit::Limited(max) = limit else {
            debug!(%subject, %action, %tier, "unlimited action, skipping store");
            return Ok(QuotaDecision::unlimited(amount));
        };

        let now = Utc::now();
        let window = action.window();

        // A batch bigger than the whole limit can never be admitted; deny
        // it here instead of shipping an unbounded amount to the store.
        if amount > max {
            debug!(%subject, %action, limit = max, amount, "batch exceeds whole limit");
            return Ok(QuotaDecision::deny(window.rollover(now), amount));
        }

        let key = window_key(action, subject, &window.bucket(now));

        let mut decision = self
            .store
            .check_and_increment(&key, max, window.duration(), amount)
            .await;
        // Buckets are calendar-aligned, so the honest retry time is the
        // next period boundary, not now-plus-window.
        decision.reset_at = Some(window.rollover(now));

        if decision.is_denied() {
            debug!(
                %subject,
                %action,
                limit = max,
                total_hits = decision.total_hits,
                "action denied by quota"
            );
        }

        Ok(decision)
    }

    /// Best-effort durable bookkeeping for an action that already ran.
    /// Never fails the caller; store errors are logged and swallowed.
    pub async fn record_usage(&self, subject: &Subject, deltas: UsageDelta) {
        if let Subject::User(id) = subject {
            if id.trim().is_empty() {
                warn!("record_usage called with empty subject id, skipping");
                return;
            }
        }
        if deltas.is_empty() {
            return;
        }

        let now = Utc::now();
        for (resource, window, delta) in deltas.entries() {
            if delta == 0 {
                continue;
            }
            let key = usage_key(subject, resource, &window.bucket(now));
            match self.store.record_usage(&key, delta, window.usage_ttl()).await {
                Ok(total) => debug!(%subject, resource, delta, total, "usage recorded"),
                Err(err) => warn!(%subject, resource, error = %err, "failed to record usage"),
            }
        }
    }

    /// Current-period usage snapshot for billing and support views.
    /// Unreadable counters report zero rather than failing the request.
    pub async fn usage_report(&self, subject: &Subject) -> UsageReport {
        let now = Utc::now();
        let day = QuotaWindow::Daily.bucket(now);
        let month = QuotaWindow::Monthly.bucket(now);

        let mut report = UsageReport {
            subject: subject.to_string(),
            day: day.clone(),
            month: month.clone(),
            ..UsageReport::default()
        };

        report.messages = self.read_usage(subject, "messages", &day).await;
        report.tokens = self.read_usage(subject, "tokens", &month).await;
        report.voice_minutes = self.read_usage(subject, "voice_minutes", &month).await;
        report.translations = self.read_usage(subject, "translations", &day).await;
        report
    }

    async fn read_usage(&self, subject: &Subject, resource: &str, period: &str) -> u64 {
        let key = usage_key(subject, resource, period);
        match self.store.usage(&key).await {
            Ok(total) => total,
            Err(err) => {
                warn!(%subject, resource, error = %err, "failed to read usage counter");
                0
            }
        }
    }

    /// Unknown tier is a data-integrity concern, not an outage: default to
    /// the most restrictive plan, unlike the store's fail-open path.
    async fn effective_tier(&self, subject: &Subject) -> SubscriptionTier {
        let id = match subject {
            Subject::Anonymous(_) => return SubscriptionTier::Free,
            Subject::User(id) => id,
        };

        match self.tiers.tier_for(id).await {
            Ok(Some(tier)) => tier,
            Ok(None) => {
                warn!(subject_id = %id, "no subscription tier on record, defaulting to free");
                SubscriptionTier::Free
            }
            Err(err) => {
                warn!(subject_id = %id, error = %err, "tier lookup failed, defaulting to free");
                SubscriptionTier::Free
            }
        }
    }
}

fn validate(subject: &Subject, amount: u64) -> Result<(), MeteringError> {
    if let Subject::User(id) = subject {
        if id.trim().is_empty() {
            return Err(MeteringError::EmptySubject);
        }
    }
    if amount == 0 {
        return Err(MeteringError::InvalidAmount(amount));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageReport {
    pub subject: String,
    pub day: String,
    pub month: String,
    pub messages: u64,
    pub tokens: u64,
    pub voice_minutes: u64,
    pub translations: u64,
}
