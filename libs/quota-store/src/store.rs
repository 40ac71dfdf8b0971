use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::decision::QuotaDecision;
use crate::error::StoreError;

/// Raw counter primitives against a shared key-value store with expiry.
///
/// `check_and_increment` must run as one atomic unit: prune entries older
/// than the window, count the remainder, admit and record the new entries
/// only if `count + amount <= limit`, and refresh the key's expiry. Two
/// concurrent callers sharing a key must never both be admitted when only
/// one slot remains.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        amount: u64,
    ) -> Result<QuotaDecision, StoreError>;

    /// Plain atomic increment for durable usage counters. Returns the new
    /// total. Increments are commutative, so no windowing is involved;
    /// `ttl` only bounds how long an idle period key survives.
    async fn add_usage(&self, key: &str, delta: u64, ttl: Duration) -> Result<u64, StoreError>;

    async fn get_usage(&self, key: &str) -> Result<u64, StoreError>;
}

/// Store handle that bounds every backend call with a short timeout and
/// applies the fail-open contract: if the backend errors or times out, the
/// request is admitted and the failure is logged, never surfaced as an
/// error to business logic.
#[derive(Clone)]
pub struct QuotaStore {
    backend: Arc<dyn CounterStore>,
    op_timeout: Duration,
}

impl QuotaStore {
    pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(backend: Arc<dyn CounterStore>, op_timeout: Duration) -> Self {
        Self {
            backend,
            op_timeout,
        }
    }

    pub fn with_default_timeout(backend: Arc<dyn CounterStore>) -> Self {
        Self::new(backend, Self::DEFAULT_OP_TIMEOUT)
    }

    /// Atomic sliding-window admission check. Infallible by contract:
    /// store trouble yields a fail-open allow. Note that a call that times
    /// out after the backend already dispatched the script may still land
    /// its slots in the window, so fail-open admissions can slightly
    /// double-count under store latency.
    pub async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        amount: u64,
    ) -> QuotaDecision {
        let call = self
            .backend
            .check_and_increment(key, limit, window, amount);
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => {
                warn!(key, error = %err, "counter store check failed, failing open");
                QuotaDecision::fail_open(limit, amount, Utc::now() + window)
            }
            Err(_) => {
                warn!(
                    key,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "counter store check timed out, failing open"
                );
                QuotaDecision::fail_open(limit, amount, Utc::now() + window)
            }
        }
    }

    /// Durable usage increment. Failures are returned so the caller can
    /// log and swallow them; usage bookkeeping must never fail an action
    /// that already succeeded.
    pub async fn record_usage(
        &self,
        key: &str,
        delta: u64,
        ttl: Duration,
    ) -> Result<u64, StoreError> {
        tokio::time::timeout(self.op_timeout, self.backend.add_usage(key, delta, ttl))
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
    }

    pub async fn usage(&self, key: &str) -> Result<u64, StoreError> {
        tokio::time::timeout(self.op_timeout, self.backend.get_usage(key))
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
    }
}
