//! Atomic sliding-window counter primitives over a shared counter store.
//!
//! This crate owns no quota policy. It provides the `CounterStore` trait
//! (check-and-increment within a window, plain usage increments), a Redis
//! backend for multi-instance deployments, an in-memory backend for
//! single-instance use, and the `QuotaStore` wrapper that bounds every call
//! with a timeout and fails open when the backing store is unreachable.

pub mod decision;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use decision::QuotaDecision;
pub use error::StoreError;
pub use memory::MemoryCounterStore;
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, QuotaStore};
