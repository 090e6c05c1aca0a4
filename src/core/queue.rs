use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use hashbrown::HashSet;
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::SyncConfig,
    op::{QueuedEntry, QueuedOperation},
    persist::{Bucket, PersistError, PersistResult, QueueStore},
    remote::{RemoteBackend, RemoteError},
    runtime::events::{SyncEvent, SyncReport},
    signal::{AuthState, Clock, Connectivity},
    types::{OpId, OpKind, Payload},
};

/// Errors surfaced to callers of [`SyncQueue`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local durable store rejected the request.
    #[error("local queue store: {0}")]
    Persist(#[from] PersistError),
    /// An update or delete payload has no usable `id` field.
    #[error("{kind:?} on `{collection}` requires an `id` field in the payload")]
    MissingTargetId {
        /// Target collection.
        collection: String,
        /// Rejected kind.
        kind: OpKind,
    },
    /// No entry with this id exists in the expected bucket.
    #[error("queued op {0} not found")]
    NotFound(OpId),
    /// The driver task has stopped.
    #[error("sync driver channel closed")]
    ChannelClosed,
}

/// Why a sync request did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The host reports no connectivity.
    Offline,
    /// Auth is required and no user is signed in.
    Unauthenticated,
    /// Another pass holds the syncing flag.
    AlreadyRunning,
    /// Pending entries could not be read.
    StoreUnavailable(String),
}

/// Result of a [`SyncQueue::sync`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Preconditions failed; nothing was attempted.
    Skipped(SkipReason),
    /// A pass ran over every pending entry read at its start.
    Completed(SyncReport),
}

/// Durable at-least-once outbox of remote mutations.
///
/// Cloning is cheap; all clones share the store, the syncing flag and the
/// event channel.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<Mutex<Box<dyn QueueStore>>>,
    remote: Arc<dyn RemoteBackend>,
    connectivity: Connectivity,
    auth: AuthState,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    syncing: AtomicBool,
    events_tx: broadcast::Sender<SyncEvent>,
}

/// Holds the syncing flag for the lifetime of one pass.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SyncQueue {
    /// Builds a queue over an already opened store.
    pub fn new(
        store: Box<dyn QueueStore>,
        remote: Arc<dyn RemoteBackend>,
        connectivity: Connectivity,
        auth: AuthState,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                store: Arc::new(Mutex::new(store)),
                remote,
                connectivity,
                auth,
                clock,
                config,
                syncing: AtomicBool::new(false),
                events_tx,
            }),
        }
    }

    /// Receiver of subsequent [`SyncEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Connectivity signal the queue consults.
    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    /// Auth state the queue consults.
    pub fn auth(&self) -> &AuthState {
        &self.inner.auth
    }

    /// Active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// True while a pass holds the syncing flag.
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Persists a mutation intent and, when online, starts a background pass.
    ///
    /// Returns once the operation is durable locally; never waits on the
    /// network. Remote failures are not reported here.
    pub async fn enqueue(
        &self,
        collection: impl Into<String>,
        kind: OpKind,
        payload: Payload,
    ) -> Result<OpId, SyncError> {
        let op = QueuedOperation::new(collection, kind, payload, self.inner.clock.now_ms())?;
        let id = op.id;
        let collection = op.collection.clone();

        self.with_store(move |store| store.put(&op)).await?;
        debug!(%id, %collection, ?kind, "queued op persisted");
        let _ = self.inner.events_tx.send(SyncEvent::Enqueued { id, collection });

        if self.inner.connectivity.is_online() {
            self.spawn_sync();
        }
        Ok(id)
    }

    /// Starts a pass on a background task without waiting for it.
    pub fn spawn_sync(&self) -> JoinHandle<SyncOutcome> {
        let queue = self.clone();
        tokio::spawn(async move { queue.sync().await })
    }

    /// Replays every pending operation once.
    ///
    /// A request made while offline, while unauthenticated (when
    /// `require_auth` is set) or while another pass runs returns
    /// [`SyncOutcome::Skipped`] without touching the store.
    pub async fn sync(&self) -> SyncOutcome {
        if !self.inner.connectivity.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        if self.inner.config.require_auth && self.inner.auth.current_user().is_none() {
            return SyncOutcome::Skipped(SkipReason::Unauthenticated);
        }
        let Some(_guard) = SyncGuard::try_acquire(&self.inner.syncing) else {
            debug!("sync already running, request dropped");
            return SyncOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        let entries = match self.with_store(|store| store.load(Bucket::Pending)).await {
            Ok(entries) => entries,
            Err(err) => {
                error!(error = %err, "failed to read pending ops");
                return SyncOutcome::Skipped(SkipReason::StoreUnavailable(err.to_string()));
            }
        };

        let report = self.replay(entries).await;
        if report.attempted > 0 {
            info!(
                applied = report.applied,
                unremoved = report.unremoved,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                deferred = report.deferred,
                "sync pass finished"
            );
        }
        let _ = self.inner.events_tx.send(SyncEvent::SyncFinished { report });
        SyncOutcome::Completed(report)
    }

    async fn replay(&self, entries: Vec<QueuedEntry>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut blocked: HashSet<(String, String)> = HashSet::new();

        for entry in entries {
            let op = entry.op;
            let record_key = op.target_id().map(|rid| (op.collection.clone(), rid));
            if record_key.as_ref().is_some_and(|key| blocked.contains(key)) {
                debug!(id = %op.id, collection = %op.collection, "deferred behind failed op on same record");
                report.deferred += 1;
                continue;
            }

            report.attempted += 1;
            match self.dispatch(&op).await {
                Ok(()) => {
                    report.applied += 1;
                    if !self.on_applied(&op).await {
                        report.unremoved += 1;
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    if let Some(key) = record_key {
                        blocked.insert(key);
                    }
                    if self.on_failed(&op, &err).await {
                        report.dead_lettered += 1;
                    }
                }
            }
        }
        report
    }

    async fn dispatch(&self, op: &QueuedOperation) -> Result<(), RemoteError> {
        let timeout = self.inner.config.remote_timeout();
        let remote = &self.inner.remote;
        let call = async {
            match op.kind {
                OpKind::Insert => remote.insert(&op.collection, &op.payload).await.map(|_| ()),
                OpKind::Update => {
                    let id = target_or_permanent(op)?;
                    remote
                        .update(&op.collection, &id, &op.payload_without_id())
                        .await
                        .map(|_| ())
                }
                OpKind::Delete => {
                    let id = target_or_permanent(op)?;
                    remote.delete(&op.collection, &id).await
                }
            }
        };
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| RemoteError::Timeout(timeout))?
    }

    /// Returns false when the local entry could not be removed.
    async fn on_applied(&self, op: &QueuedOperation) -> bool {
        let id = op.id;
        let removed = match self.with_store(move |store| store.remove(id)).await {
            Ok(_) => true,
            Err(err) => {
                // The entry stays and will be replayed again.
                error!(%id, error = %err, "applied op could not be removed locally");
                false
            }
        };
        let _ = self.inner.events_tx.send(SyncEvent::Applied {
            id,
            collection: op.collection.clone(),
        });
        let _ = self.inner.events_tx.send(SyncEvent::Invalidated {
            collection: op.collection.clone(),
        });
        removed
    }

    /// Returns true when the entry was dead-lettered.
    async fn on_failed(&self, op: &QueuedOperation, err: &RemoteError) -> bool {
        let id = op.id;
        let message = err.to_string();
        warn!(%id, collection = %op.collection, kind = ?op.kind, error = %message, "remote call failed, op stays queued");

        let permanent = err.is_permanent();
        let counts = match self
            .with_store(move |store| store.record_failure(id, &message, permanent))
            .await
        {
            Ok(counts) => counts,
            Err(store_err) => {
                error!(%id, error = %store_err, "failed to record attempt");
                return false;
            }
        };
        let _ = self.inner.events_tx.send(SyncEvent::Failed {
            id,
            collection: op.collection.clone(),
            permanent,
            attempts: counts.attempts,
        });

        let max = self.inner.config.max_permanent_attempts;
        if !permanent || max == 0 || counts.permanent_attempts < max {
            return false;
        }
        match self.with_store(move |store| store.move_to(id, Bucket::Dead)).await {
            Ok(true) => {
                warn!(
                    %id,
                    collection = %op.collection,
                    attempts = counts.attempts,
                    permanent_attempts = counts.permanent_attempts,
                    "op dead-lettered"
                );
                let _ = self.inner.events_tx.send(SyncEvent::DeadLettered {
                    id,
                    collection: op.collection.clone(),
                });
                true
            }
            Ok(false) => false,
            Err(store_err) => {
                error!(%id, error = %store_err, "failed to dead-letter op");
                false
            }
        }
    }

    /// Pending entries in replay order.
    pub async fn pending(&self) -> Result<Vec<QueuedEntry>, SyncError> {
        Ok(self.with_store(|store| store.load(Bucket::Pending)).await?)
    }

    /// Number of pending entries.
    pub async fn pending_len(&self) -> Result<usize, SyncError> {
        Ok(self.with_store(|store| store.count(Bucket::Pending)).await?)
    }

    /// Entries that exhausted their permanent-failure budget.
    pub async fn dead_letters(&self) -> Result<Vec<QueuedEntry>, SyncError> {
        Ok(self.with_store(|store| store.load(Bucket::Dead)).await?)
    }

    /// Moves a dead entry back to pending with a fresh attempt budget.
    pub async fn requeue_dead(&self, id: OpId) -> Result<(), SyncError> {
        let moved = self
            .with_store(move |store| {
                let is_dead = store.load(Bucket::Dead)?.iter().any(|e| e.op.id == id);
                if !is_dead {
                    return Ok(false);
                }
                store.move_to(id, Bucket::Pending)
            })
            .await?;
        if !moved {
            return Err(SyncError::NotFound(id));
        }
        info!(%id, "dead op requeued");
        Ok(())
    }

    /// Drops a dead entry for good.
    pub async fn discard_dead(&self, id: OpId) -> Result<(), SyncError> {
        let removed = self
            .with_store(move |store| {
                let is_dead = store.load(Bucket::Dead)?.iter().any(|e| e.op.id == id);
                if !is_dead {
                    return Ok(false);
                }
                store.remove(id)
            })
            .await?;
        if !removed {
            return Err(SyncError::NotFound(id));
        }
        info!(%id, "dead op discarded");
        Ok(())
    }

    async fn with_store<T, F>(&self, f: F) -> PersistResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn QueueStore) -> PersistResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || {
            let mut store = store.blocking_lock();
            f(&mut **store)
        })
        .await
        .map_err(|e| PersistError::Message(format!("join error: {e}")))?
    }
}

fn target_or_permanent(op: &QueuedOperation) -> Result<String, RemoteError> {
    op.target_id()
        .ok_or_else(|| RemoteError::Permanent(format!("{:?} without target id", op.kind)))
}
