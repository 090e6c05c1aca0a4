#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Notify, Semaphore, broadcast};

use syncqueue::{
    config::SyncConfig,
    core::queue::SyncQueue,
    op::{QueuedEntry, QueuedOperation},
    persist::{
        Bucket, FailureCounts, PersistError, PersistResult, QueueStore, sqlite::SqliteQueueStore,
    },
    remote::{RemoteBackend, RemoteError},
    runtime::events::{SyncEvent, SyncReport},
    signal::{AuthState, Clock, Connectivity},
    types::{OpId, OpKind, Payload},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Insert { collection: String, payload: Payload },
    Update { collection: String, id: String, payload: Payload },
    Delete { collection: String, id: String },
}

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    scripted: Mutex<VecDeque<Option<RemoteError>>>,
    fail_ids: Mutex<Vec<(String, RemoteError)>>,
    gate: Option<Arc<Semaphore>>,
    started: Notify,
    panic_next: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for a permit on `gate` before completing.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Outcomes consumed one per call, in order. `None` means success.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Option<RemoteError>>) {
        self.scripted.lock().unwrap().extend(outcomes);
    }

    /// Every call whose payload or target id equals `id` fails with `err`.
    pub fn fail_record(&self, id: &str, err: RemoteError) {
        self.fail_ids.lock().unwrap().push((id.to_string(), err));
    }

    pub fn heal(&self) {
        self.fail_ids.lock().unwrap().clear();
        self.scripted.lock().unwrap().clear();
    }

    /// The next call panics instead of returning.
    pub fn panic_next_call(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    async fn handle(&self, call: Call, record_id: Option<String>) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        self.started.notify_one();
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("remote backend blew up");
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate").forget();
        }
        if let Some(id) = record_id {
            let fail = self
                .fail_ids
                .lock()
                .unwrap()
                .iter()
                .find(|(fid, _)| *fid == id)
                .map(|(_, err)| err.clone());
            if let Some(err) = fail {
                return Err(err);
            }
        }
        match self.scripted.lock().unwrap().pop_front() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

fn payload_id(payload: &Payload) -> Option<String> {
    payload.get("id").and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl RemoteBackend for FakeBackend {
    async fn insert(&self, collection: &str, payload: &Payload) -> Result<Value, RemoteError> {
        let call = Call::Insert {
            collection: collection.to_string(),
            payload: payload.clone(),
        };
        self.handle(call, payload_id(payload)).await?;
        Ok(Value::Object(payload.clone()))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        payload: &Payload,
    ) -> Result<Value, RemoteError> {
        let call = Call::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            payload: payload.clone(),
        };
        self.handle(call, Some(id.to_string())).await?;
        Ok(Value::Object(payload.clone()))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let call = Call::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        self.handle(call, Some(id.to_string())).await
    }
}

pub struct StepClock(AtomicU64);

impl StepClock {
    pub fn new() -> Self {
        Self(AtomicU64::new(1_000))
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Switches that make a [`FlakyStore`] fail its writes.
#[derive(Clone, Default)]
pub struct StoreFaults {
    pub put: Arc<AtomicBool>,
    pub remove: Arc<AtomicBool>,
}

/// SQLite store whose `put` and `remove` fail while the matching switch is on.
pub struct FlakyStore {
    inner: SqliteQueueStore,
    faults: StoreFaults,
}

impl FlakyStore {
    pub fn new(faults: StoreFaults) -> Self {
        Self {
            inner: SqliteQueueStore::open_in_memory().expect("open store"),
            faults,
        }
    }
}

fn injected(what: &str) -> PersistError {
    PersistError::Message(format!("disk full during {what}"))
}

impl QueueStore for FlakyStore {
    fn put(&mut self, op: &QueuedOperation) -> PersistResult<()> {
        if self.faults.put.load(Ordering::SeqCst) {
            return Err(injected("put"));
        }
        self.inner.put(op)
    }

    fn load(&self, bucket: Bucket) -> PersistResult<Vec<QueuedEntry>> {
        self.inner.load(bucket)
    }

    fn remove(&mut self, id: OpId) -> PersistResult<bool> {
        if self.faults.remove.load(Ordering::SeqCst) {
            return Err(injected("remove"));
        }
        self.inner.remove(id)
    }

    fn record_failure(
        &mut self,
        id: OpId,
        error: &str,
        permanent: bool,
    ) -> PersistResult<FailureCounts> {
        self.inner.record_failure(id, error, permanent)
    }

    fn move_to(&mut self, id: OpId, bucket: Bucket) -> PersistResult<bool> {
        self.inner.move_to(id, bucket)
    }

    fn count(&self, bucket: Bucket) -> PersistResult<usize> {
        self.inner.count(bucket)
    }
}

pub struct Harness {
    pub queue: SyncQueue,
    pub backend: Arc<FakeBackend>,
    pub connectivity: Connectivity,
    pub auth: AuthState,
}

/// Offline, signed-in queue over an in-memory SQLite store.
pub fn harness(backend: FakeBackend, config: SyncConfig) -> Harness {
    let store = SqliteQueueStore::open_in_memory().expect("open store");
    harness_with_store(Box::new(store), backend, config)
}

pub fn harness_with_store(
    store: Box<dyn QueueStore>,
    backend: FakeBackend,
    config: SyncConfig,
) -> Harness {
    let backend = Arc::new(backend);
    let connectivity = Connectivity::new(false);
    let auth = AuthState::new();
    auth.sign_in("user-1");
    let queue = SyncQueue::new(
        store,
        backend.clone(),
        connectivity.clone(),
        auth.clone(),
        Arc::new(StepClock::new()),
        config,
    );
    Harness {
        queue,
        backend,
        connectivity,
        auth,
    }
}

pub fn payload(id: &str, text: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("id".to_string(), json!(id));
    p.insert("text".to_string(), json!(text));
    p
}

pub fn id_only(id: &str) -> Payload {
    let mut p = Payload::new();
    p.insert("id".to_string(), json!(id));
    p
}

pub async fn enqueue_insert(h: &Harness, collection: &str, id: &str) {
    h.queue
        .enqueue(collection, OpKind::Insert, payload(id, "text"))
        .await
        .expect("enqueue");
}

pub async fn next_finished(rx: &mut broadcast::Receiver<SyncEvent>) -> SyncReport {
    loop {
        let evt = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event timeout")
            .expect("recv");
        if let SyncEvent::SyncFinished { report } = evt {
            return report;
        }
    }
}
