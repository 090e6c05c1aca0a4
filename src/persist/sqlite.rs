//! SQLite-backed durable queue store.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    op::{OP_FORMAT_VERSION, QueuedEntry, QueuedOperation, StoredOpEnvelope},
    types::OpId,
};

use super::{Bucket, FailureCounts, PersistError, PersistResult, QueueStore};

/// SQLite implementation of [`crate::persist::QueueStore`].
pub struct SqliteQueueStore {
    conn: Connection,
}

impl SqliteQueueStore {
    /// Opens or creates a SQLite-backed queue at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite queue. Contents do not survive the process.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }
}

impl QueueStore for SqliteQueueStore {
    fn put(&mut self, op: &QueuedOperation) -> PersistResult<()> {
        let payload = serde_json::to_vec(&StoredOpEnvelope::new(op.clone()))?;
        self.conn.execute(
            "INSERT INTO queue(id, bucket, collection, kind, enqueued_at_ms, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                op.id.to_string(),
                Bucket::Pending.as_str(),
                op.collection,
                op.kind.code(),
                op.enqueued_at_ms as i64,
                payload,
            ],
        )?;
        Ok(())
    }

    fn load(&self, bucket: Bucket) -> PersistResult<Vec<QueuedEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT attempts, permanent_attempts, last_error, payload
             FROM queue WHERE bucket = ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![bucket.as_str()], |row| {
            let attempts: i64 = row.get(0)?;
            let permanent_attempts: i64 = row.get(1)?;
            let last_error: Option<String> = row.get(2)?;
            let payload: Vec<u8> = row.get(3)?;
            let op = decode_op_payload(&payload).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    payload.len(),
                    rusqlite::types::Type::Blob,
                    Box::new(std::io::Error::other(err)),
                )
            })?;
            Ok(QueuedEntry {
                op,
                attempts: attempts as u32,
                permanent_attempts: permanent_attempts as u32,
                last_error,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn remove(&mut self, id: OpId) -> PersistResult<bool> {
        let count = self
            .conn
            .execute("DELETE FROM queue WHERE id = ?1", params![id.to_string()])?;
        Ok(count > 0)
    }

    fn record_failure(
        &mut self,
        id: OpId,
        error: &str,
        permanent: bool,
    ) -> PersistResult<FailureCounts> {
        let counts: Option<FailureCounts> = self
            .conn
            .query_row(
                "UPDATE queue
                 SET attempts = attempts + 1,
                     permanent_attempts = permanent_attempts + ?3,
                     last_error = ?2
                 WHERE id = ?1 RETURNING attempts, permanent_attempts",
                params![id.to_string(), error, i64::from(permanent)],
                |row| {
                    let attempts: i64 = row.get(0)?;
                    let permanent_attempts: i64 = row.get(1)?;
                    Ok(FailureCounts {
                        attempts: attempts as u32,
                        permanent_attempts: permanent_attempts as u32,
                    })
                },
            )
            .optional()?;
        counts.ok_or_else(|| PersistError::Message(format!("queued op {id} not found")))
    }

    fn move_to(&mut self, id: OpId, bucket: Bucket) -> PersistResult<bool> {
        let count = match bucket {
            Bucket::Pending => self.conn.execute(
                "UPDATE queue SET bucket = ?2, attempts = 0, permanent_attempts = 0, last_error = NULL
                 WHERE id = ?1",
                params![id.to_string(), bucket.as_str()],
            )?,
            Bucket::Dead => self.conn.execute(
                "UPDATE queue SET bucket = ?2 WHERE id = ?1",
                params![id.to_string(), bucket.as_str()],
            )?,
        };
        Ok(count > 0)
    }

    fn count(&self, bucket: Bucket) -> PersistResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM queue WHERE bucket = ?1",
            params![bucket.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn decode_op_payload(payload: &[u8]) -> Result<QueuedOperation, String> {
    let envelope = serde_json::from_slice::<StoredOpEnvelope>(payload)
        .map_err(|e| format!("op payload decode failed: {e}"))?;
    if envelope.format_version != OP_FORMAT_VERSION {
        return Err(format!(
            "unsupported op format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.op)
}
