//! Shared primitive IDs and operation enums.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a queued operation.
pub type OpId = Uuid;
/// Opaque authenticated user identifier.
pub type UserId = String;
/// Field map sent to the remote backend.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Name of the payload field that identifies the target remote record.
pub const RECORD_ID_FIELD: &str = "id";

/// Kind of remote mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Create a new remote record.
    Insert,
    /// Modify an existing remote record by id.
    Update,
    /// Remove a remote record by id.
    Delete,
}

impl OpKind {
    /// Stable integer code used in the on-disk index column.
    pub fn code(self) -> i64 {
        match self {
            Self::Insert => 1,
            Self::Update => 2,
            Self::Delete => 3,
        }
    }

    /// True when the payload must name the target record.
    pub fn requires_target(self) -> bool {
        !matches!(self, Self::Insert)
    }
}
