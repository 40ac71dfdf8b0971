use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan. The tier table below is the entire policy surface:
/// static configuration, loaded at process start, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn limits(&self) -> LimitSet {
        match self {
            Self::Free => LimitSet {
                daily_messages: Limit::Limited(50),
                monthly_tokens: Limit::Limited(100_000),
                monthly_voice_minutes: Limit::Limited(30),
                daily_translations: Limit::Limited(100),
            },
            Self::Pro => LimitSet {
                daily_messages: Limit::Limited(1_000),
                monthly_tokens: Limit::Limited(2_000_000),
                monthly_voice_minutes: Limit::Limited(600),
                daily_translations: Limit::Unlimited,
            },
            Self::Enterprise => LimitSet {
                daily_messages: Limit::Unlimited,
                monthly_tokens: Limit::Unlimited,
                monthly_voice_minutes: Limit::Unlimited,
                daily_translations: Limit::Unlimited,
            },
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Limited(max) => Some(*max),
            Self::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LimitSet {
    pub daily_messages: Limit,
    pub monthly_tokens: Limit,
    pub monthly_voice_minutes: Limit,
    pub daily_translations: Limit,
}

impl LimitSet {
    pub fn limit_for(&self, action: ActionType) -> Limit {
        match action {
            ActionType::Message => self.daily_messages,
            ActionType::Token => self.monthly_tokens,
            ActionType::Voice => self.monthly_voice_minutes,
            ActionType::Translation => self.daily_translations,
        }
    }
}

/// Quota bucket a request is classified into. Keys are always namespaced
/// by this type first, so two actions can never share a window by
/// coincidence of subject naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Message,
    Token,
    Voice,
    Translation,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Token => "token",
            Self::Voice => "voice",
            Self::Translation => "translation",
        }
    }

    pub fn window(&self) -> QuotaWindow {
        match self {
            Self::Message | Self::Translation => QuotaWindow::Daily,
            Self::Token | Self::Voice => QuotaWindow::Monthly,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar window a limit is enforced over. Buckets are encoded into the
/// quota key, so rollover happens by key change, never by zeroing a
/// counter in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    Daily,
    Monthly,
}

impl QuotaWindow {
    /// Retention span handed to the store. At least one full period, so
    /// entries recorded anywhere inside the current bucket stay counted
    /// until the bucket itself rolls over.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Daily => Duration::from_secs(24 * 60 * 60),
            Self::Monthly => Duration::from_secs(31 * 24 * 60 * 60),
        }
    }

    /// TTL for durable usage keys: long enough for billing to read the
    /// closed period, then expiry is the sole cleanup path.
    pub fn usage_ttl(&self) -> Duration {
        match self {
            Self::Daily => Duration::from_secs(35 * 24 * 60 * 60),
            Self::Monthly => Duration::from_secs(120 * 24 * 60 * 60),
        }
    }

    pub fn bucket(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Daily => format!("{:04}-{:02}-{:02}", at.year(), at.month(), at.day()),
            Self::Monthly => format!("{:04}-{:02}", at.year(), at.month()),
        }
    }

    /// Start of the next period, reported to denied callers as the retry
    /// time.
    pub fn rollover(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => at
                .date_naive()
                .succ_opt()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .expect("next UTC day is always representable")
                .and_utc(),
            Self::Monthly => {
                let (year, month) = if at.month() == 12 {
                    (at.year() + 1, 1)
                } else {
                    (at.year(), at.month() + 1)
                };
                chrono::NaiveDate::from_ymd_opt(year, month, 1)
                    .and_then(|day| day.and_hms_opt(0, 0, 0))
                    .expect("first of next month is always representable")
                    .and_utc()
            }
        }
    }
}
