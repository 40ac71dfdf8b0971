use std::fmt;
use std::net::IpAddr;

use crate::tiers::ActionType;

/// Identity a quota count is tracked under: an authenticated user id, or
/// the caller's address for anonymous traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    User(String),
    Anonymous(IpAddr),
}

impl Subject {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn anonymous(addr: IpAddr) -> Self {
        Self::Anonymous(addr)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous(_))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => f.write_str(id),
            Self::Anonymous(addr) => write!(f, "ip:{addr}"),
        }
    }
}

/// Rate-limit window key. Action type comes first so two actions can
/// never collide into one bucket, whatever the subject string looks like.
pub fn window_key(action: ActionType, subject: &Subject, bucket: &str) -> String {
    format!("rl:{}:{}:{}", action.as_str(), subject, bucket)
}

/// Durable usage key, a separate keyspace from the rate-limit windows.
pub fn usage_key(subject: &Subject, resource: &str, period: &str) -> String {
    format!("usage:{subject}:{resource}:{period}")
}
