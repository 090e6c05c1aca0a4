use serde_json::json;
use tempfile::TempDir;

use syncqueue::{
    op::QueuedOperation,
    persist::{Bucket, QueueStore, sqlite::SqliteQueueStore},
    types::{OpKind, Payload},
};

fn op(collection: &str, kind: OpKind, id: &str, ts: u64) -> QueuedOperation {
    let mut payload = Payload::new();
    payload.insert("id".to_string(), json!(id));
    payload.insert("mood".to_string(), json!("calm"));
    QueuedOperation::new(collection, kind, payload, ts).expect("op")
}

#[test]
fn pending_ops_survive_reopen_in_insertion_order() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("outbox.db");

    let ops = vec![
        op("journal_entries", OpKind::Insert, "e1", 30),
        op("mood_logs", OpKind::Update, "m1", 10),
        op("journal_entries", OpKind::Delete, "e0", 20),
    ];
    let mut store = SqliteQueueStore::open(&db_path).expect("open sqlite");
    for o in &ops {
        store.put(o).expect("put");
    }
    drop(store);

    let reopened = SqliteQueueStore::open(&db_path).expect("reopen");
    let loaded: Vec<QueuedOperation> = reopened
        .load(Bucket::Pending)
        .expect("load")
        .into_iter()
        .map(|e| e.op)
        .collect();
    assert_eq!(loaded, ops);
}

#[test]
fn remove_is_idempotent() {
    let mut store = SqliteQueueStore::open_in_memory().expect("open");
    let o = op("journal_entries", OpKind::Insert, "e1", 1);
    store.put(&o).expect("put");

    assert!(store.remove(o.id).expect("remove"));
    assert!(!store.remove(o.id).expect("remove again"));
    assert_eq!(store.count(Bucket::Pending).expect("count"), 0);
}

#[test]
fn failures_accumulate_and_reset_on_requeue() {
    let mut store = SqliteQueueStore::open_in_memory().expect("open");
    let first = op("journal_entries", OpKind::Insert, "e1", 1);
    let second = op("journal_entries", OpKind::Insert, "e2", 2);
    store.put(&first).expect("put");
    store.put(&second).expect("put");

    let counts = store.record_failure(first.id, "boom", false).expect("fail");
    assert_eq!((counts.attempts, counts.permanent_attempts), (1, 0));
    let counts = store.record_failure(first.id, "boom again", true).expect("fail");
    assert_eq!((counts.attempts, counts.permanent_attempts), (2, 1));

    assert!(store.move_to(first.id, Bucket::Dead).expect("dead"));
    assert_eq!(store.count(Bucket::Pending).expect("count"), 1);
    let dead = store.load(Bucket::Dead).expect("load dead");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 2);
    assert_eq!(dead[0].permanent_attempts, 1);
    assert_eq!(dead[0].last_error.as_deref(), Some("boom again"));

    assert!(store.move_to(first.id, Bucket::Pending).expect("requeue"));
    let pending = store.load(Bucket::Pending).expect("load");
    assert_eq!(
        pending.iter().map(|e| e.op.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );
    assert_eq!(pending[0].attempts, 0);
    assert_eq!(pending[0].permanent_attempts, 0);
    assert_eq!(pending[0].last_error, None);
}

#[test]
fn unknown_ids_are_reported() {
    let mut store = SqliteQueueStore::open_in_memory().expect("open");
    let ghost = op("journal_entries", OpKind::Insert, "ghost", 1);

    assert!(store.record_failure(ghost.id, "x", true).is_err());
    assert!(!store.move_to(ghost.id, Bucket::Dead).expect("move"));
}

#[test]
fn unopenable_store_fails_loudly() {
    let tmp = TempDir::new().expect("tmp");
    assert!(SqliteQueueStore::open(tmp.path()).is_err());
}
