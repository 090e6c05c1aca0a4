//! Queue event stream payloads.

use crate::types::OpId;

/// Tally of one completed sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote calls dispatched.
    pub attempted: usize,
    /// Operations applied remotely.
    pub applied: usize,
    /// Applied operations whose local entry could not be removed; they will
    /// be replayed again.
    pub unremoved: usize,
    /// Operations whose remote call failed.
    pub failed: usize,
    /// Failed operations moved to the dead bucket.
    pub dead_lettered: usize,
    /// Operations skipped because an earlier one for the same record failed.
    pub deferred: usize,
}

/// Events emitted by the queue and its driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// An operation was persisted locally.
    Enqueued {
        /// Operation id.
        id: OpId,
        /// Target collection.
        collection: String,
    },
    /// An operation was applied remotely.
    Applied {
        /// Operation id.
        id: OpId,
        /// Target collection.
        collection: String,
    },
    /// A remote call failed; the operation stays queued.
    Failed {
        /// Operation id.
        id: OpId,
        /// Target collection.
        collection: String,
        /// Failure was classified as permanent.
        permanent: bool,
        /// Failed attempts so far.
        attempts: u32,
    },
    /// An operation exhausted its permanent-failure budget.
    DeadLettered {
        /// Operation id.
        id: OpId,
        /// Target collection.
        collection: String,
    },
    /// Cached reads of `collection` are stale and should be refetched.
    Invalidated {
        /// Collection whose remote data changed.
        collection: String,
    },
    /// A sync pass ran to completion.
    SyncFinished {
        /// Pass tally.
        report: SyncReport,
    },
}
