//! Shared key-value store capability.
//!
//! The rate limiter and the response cache only talk to storage through
//! [`SharedStore`], so any backend with atomic counters and per-key TTLs can
//! serve them. [`MemoryStore`] is the in-process implementation.

mod memory;

pub use memory::MemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::InsightsError;

/// Errors raised by a [`SharedStore`] backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// `incr_with_expiry` was called on a key holding a non-counter value.
    #[error("value at '{0}' is not a counter")]
    NotACounter(String),
}

impl From<StoreError> for InsightsError {
    fn from(err: StoreError) -> Self {
        InsightsError::StoreUnavailable(err.to_string())
    }
}

/// Atomic counter and TTL key-value operations.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically increment the counter at `key` and return the new value.
    ///
    /// A missing or expired key starts at 1 and expires after `ttl`. An
    /// existing counter keeps its original expiry.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value`, replacing any previous value and expiry.
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration)
        -> Result<(), StoreError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
