use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::decision::QuotaDecision;
use crate::error::StoreError;
use crate::store::CounterStore;

/// One op in every `SWEEP_INTERVAL` walks the maps and drops expired keys,
/// standing in for the key-value store's native TTL expiry.
const SWEEP_INTERVAL: u64 = 256;

struct WindowLog {
    entries: Vec<i64>,
    expires_at_ms: i64,
}

struct UsageCell {
    total: u64,
    expires_at_ms: i64,
}

/// Process-local counter store for single-instance deployments and tests.
///
/// Counts live in this process only; running more than one metering
/// instance against it silently splits every quota N ways. The DashMap
/// entry lock serializes concurrent increments per key, which is what
/// makes the check-then-add sequence atomic here. Expired keys are
/// dropped by a cheap periodic sweep, so idle buckets from past periods
/// do not accumulate.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, WindowLog>,
    usage: DashMap<String, UsageCell>,
    ops: AtomicU64,
}

impl Default for WindowLog {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            expires_at_ms: 0,
        }
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live rate-limit window keys. Diagnostic only.
    pub fn tracked_window_keys(&self) -> usize {
        self.windows.len()
    }

    /// Number of live durable usage keys. Diagnostic only.
    pub fn tracked_usage_keys(&self) -> usize {
        self.usage.len()
    }

    fn maybe_sweep(&self, now_ms: i64) {
        if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL != 0 {
            return;
        }
        self.windows.retain(|_, log| log.expires_at_ms > now_ms);
        self.usage.retain(|_, cell| cell.expires_at_ms > now_ms);
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        amount: u64,
    ) -> Result<QuotaDecision, StoreError> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let window_ms = window.as_millis() as i64;
        let reset_at = now + window;

        self.maybe_sweep(now_ms);

        // Holds the entry lock for the whole prune-count-add sequence.
        let mut log = self.windows.entry(key.to_string()).or_default();
        log.entries.retain(|recorded| *recorded > now_ms - window_ms);
        let count = log.entries.len() as u64;

        // Checked: a caller-supplied amount near u64::MAX must read as an
        // over-limit batch, not wrap into an admission.
        match count.checked_add(amount) {
            Some(total) if total <= limit => {
                for _ in 0..amount {
                    log.entries.push(now_ms);
                }
                log.expires_at_ms = now_ms + window_ms;
                Ok(QuotaDecision::allow(limit - total, reset_at, total))
            }
            _ => Ok(QuotaDecision::deny(
                reset_at,
                count.saturating_add(amount),
            )),
        }
    }

    async fn add_usage(&self, key: &str, delta: u64, ttl: Duration) -> Result<u64, StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let ttl_ms = ttl.as_millis() as i64;

        self.maybe_sweep(now_ms);

        let mut cell = self.usage.entry(key.to_string()).or_insert(UsageCell {
            total: 0,
            expires_at_ms: now_ms + ttl_ms,
        });
        // An expired key the sweep has not reached yet restarts at zero,
        // exactly as if the store had already dropped it.
        if cell.expires_at_ms <= now_ms {
            cell.total = 0;
        }
        cell.total = cell.total.saturating_add(delta);
        cell.expires_at_ms = now_ms + ttl_ms;
        Ok(cell.total)
    }

    async fn get_usage(&self, key: &str) -> Result<u64, StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        Ok(self
            .usage
            .get(key)
            .filter(|cell| cell.expires_at_ms > now_ms)
            .map(|cell| cell.total)
            .unwrap_or(0))
    }
}
