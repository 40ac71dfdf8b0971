use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::decision::QuotaDecision;
use crate::error::StoreError;
use crate::store::CounterStore;

/// Sliding-window log over a sorted set, executed as one atomic script.
///
/// KEYS[1]: window key
/// ARGV[1]: limit (max admissions per window)
/// ARGV[2]: window length in milliseconds
/// ARGV[3]: current time, epoch milliseconds
/// ARGV[4]: amount of slots requested by this call
/// ARGV[5]: unique member seed for this call
///
/// Returns: {allowed (0/1), remaining, total_hits}
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])
local amount = tonumber(ARGV[4])
local seed = ARGV[5]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)

local count = redis.call('ZCARD', key)

local allowed = 0
-- amount > limit can never fit; checking it first keeps the ZADD loop
-- bounded by limit no matter what the caller sends.
if amount <= limit and count + amount <= limit then
    for i = 1, amount do
        redis.call('ZADD', key, now_ms, seed .. '-' .. i)
    end
    redis.call('PEXPIRE', key, window_ms)
    allowed = 1
end

local total = count + amount
local remaining = limit - total
if remaining < 0 then
    remaining = 0
end

return {allowed, remaining, total}
"#;

/// Redis-backed counter store. The only backend that is safe across
/// multiple metering instances: correctness rests entirely on the script
/// running atomically server-side, not on any in-process lock.
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        amount: u64,
    ) -> Result<QuotaDecision, StoreError> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        // Member uniqueness per call: timestamp plus random tie-breaker,
        // so concurrent callers in the same millisecond never collide.
        let seed = format!("{now_ms}-{:08x}", rand::random::<u32>());

        let script = Script::new(SLIDING_WINDOW_SCRIPT);
        let reply: Vec<i64> = script
            .key(key)
            .arg(limit)
            .arg(window.as_millis() as i64)
            .arg(now_ms)
            .arg(amount)
            .arg(seed)
            .invoke_async(&mut self.conn.clone())
            .await?;

        if reply.len() < 3 {
            return Err(StoreError::BadReply(format!(
                "sliding window script returned {} values",
                reply.len()
            )));
        }

        let reset_at = now + window;
        if reply[0] == 1 {
            Ok(QuotaDecision::allow(
                reply[1].max(0) as u64,
                reset_at,
                reply[2].max(0) as u64,
            ))
        } else {
            Ok(QuotaDecision::deny(reset_at, reply[2].max(0) as u64))
        }
    }

    async fn add_usage(&self, key: &str, delta: u64, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let (total,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(total)
    }

    async fn get_usage(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value.unwrap_or(0))
    }
}
