//! Remote data backend consumed by the replay loop.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::Payload;

/// Failure of a single remote call, classified by the backend adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Worth retrying later: network loss, 5xx, rate limiting.
    #[error("transient remote failure: {0}")]
    Transient(String),
    /// Retrying will not help: validation error, missing parent, 4xx.
    #[error("permanent remote failure: {0}")]
    Permanent(String),
    /// No response within the configured remote timeout.
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
}

impl RemoteError {
    /// True when the failure should count towards dead-lettering.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// Per-collection insert/update/delete-by-id operations of the backend.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Creates a record in `collection` and returns it.
    async fn insert(&self, collection: &str, payload: &Payload) -> Result<Value, RemoteError>;

    /// Updates record `id` in `collection` with `payload` and returns it.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        payload: &Payload,
    ) -> Result<Value, RemoteError>;

    /// Deletes record `id` from `collection`.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;
}
