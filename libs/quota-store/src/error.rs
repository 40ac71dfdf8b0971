use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
    #[error("counter store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected counter store reply: {0}")]
    BadReply(String),
}
