/// SQLite-backed durable queue store.
pub mod sqlite;

use thiserror::Error;

use crate::{
    op::{QueuedEntry, QueuedOperation},
    types::OpId,
};

/// Local persistence failure.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite returned an error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored payload failed to encode or decode.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Any other persistence failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for [`QueueStore`] calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Logical bucket a persisted entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Waiting to be replayed.
    Pending,
    /// Gave up after repeated permanent failures; kept for inspection.
    Dead,
}

impl Bucket {
    /// Name stored in the bucket column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dead => "dead",
        }
    }
}

/// Failure counters of one entry after [`QueueStore::record_failure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounts {
    /// Failed attempts of any kind.
    pub attempts: u32,
    /// Failed attempts classified as permanent.
    pub permanent_attempts: u32,
}

/// Durable key-value store of queued operations, keyed by [`OpId`].
///
/// Implementations must survive a process restart and must return entries
/// of a bucket in insertion order.
pub trait QueueStore: Send {
    /// Persists a new operation into [`Bucket::Pending`].
    fn put(&mut self, op: &QueuedOperation) -> PersistResult<()>;
    /// Loads every entry of `bucket` in insertion order.
    fn load(&self, bucket: Bucket) -> PersistResult<Vec<QueuedEntry>>;
    /// Removes an entry from whichever bucket holds it. Returns false when absent.
    fn remove(&mut self, id: OpId) -> PersistResult<bool>;
    /// Records a failed attempt and returns the updated counters.
    fn record_failure(
        &mut self,
        id: OpId,
        error: &str,
        permanent: bool,
    ) -> PersistResult<FailureCounts>;
    /// Moves an entry to `bucket`. Moving into `Pending` resets both counters.
    fn move_to(&mut self, id: OpId, bucket: Bucket) -> PersistResult<bool>;
    /// Number of entries in `bucket`.
    fn count(&self, bucket: Bucket) -> PersistResult<usize>;
}
