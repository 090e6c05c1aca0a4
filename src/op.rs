//! Queued operation model and persistence wrappers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    core::queue::SyncError,
    types::{OpId, OpKind, Payload, RECORD_ID_FIELD},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Immutable mutation intent buffered until it can be replayed remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Unique id, also the local store key.
    pub id: OpId,
    /// Remote collection the operation targets.
    pub collection: String,
    /// Mutation kind.
    pub kind: OpKind,
    /// Field map sent to the backend.
    pub payload: Payload,
    /// Enqueue timestamp in milliseconds since epoch. Diagnostic only.
    pub enqueued_at_ms: u64,
}

impl QueuedOperation {
    /// Builds a new operation with a fresh id.
    ///
    /// `Update` and `Delete` payloads must carry a string or numeric `id`
    /// field naming the remote record.
    pub fn new(
        collection: impl Into<String>,
        kind: OpKind,
        payload: Payload,
        enqueued_at_ms: u64,
    ) -> Result<Self, SyncError> {
        let collection = collection.into();
        if kind.requires_target() && record_id(&payload).is_none() {
            return Err(SyncError::MissingTargetId { collection, kind });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            collection,
            kind,
            payload,
            enqueued_at_ms,
        })
    }

    /// Remote record id named by the payload, if any.
    pub fn target_id(&self) -> Option<String> {
        record_id(&self.payload)
    }

    /// Payload with the record id field removed, as sent on update.
    pub fn payload_without_id(&self) -> Payload {
        let mut fields = self.payload.clone();
        fields.remove(RECORD_ID_FIELD);
        fields
    }
}

/// Persisted queue row: an operation plus its retry bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEntry {
    /// The buffered operation.
    pub op: QueuedOperation,
    /// Failed replay attempts so far, of any kind.
    pub attempts: u32,
    /// Failed attempts classified as permanent; drives dead-lettering.
    pub permanent_attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub op: QueuedOperation,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(op: QueuedOperation) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            op,
        }
    }
}

fn record_id(payload: &Payload) -> Option<String> {
    match payload.get(RECORD_ID_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
