//! Offline write-sync queue: buffers remote mutations in a durable local store
//! and replays them once connectivity and authentication allow.
//!
//! # Examples
//!
//! Queue with a SQLite store, replayed by the signal-driven driver:
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use syncqueue::{
//!     config::SyncConfig,
//!     core::queue::SyncQueue,
//!     persist::sqlite::SqliteQueueStore,
//!     remote::{RemoteBackend, RemoteError},
//!     runtime::handle::spawn_sync_driver,
//!     signal::{AuthState, Connectivity, SystemClock},
//!     types::{OpKind, Payload},
//! };
//!
//! struct Backend;
//!
//! #[async_trait]
//! impl RemoteBackend for Backend {
//!     async fn insert(&self, _c: &str, p: &Payload) -> Result<Value, RemoteError> {
//!         Ok(Value::Object(p.clone()))
//!     }
//!     async fn update(&self, _c: &str, _id: &str, p: &Payload) -> Result<Value, RemoteError> {
//!         Ok(Value::Object(p.clone()))
//!     }
//!     async fn delete(&self, _c: &str, _id: &str) -> Result<(), RemoteError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteQueueStore::open("outbox.db").expect("open sqlite");
//! let connectivity = Connectivity::new(false);
//! let auth = AuthState::new();
//! let queue = SyncQueue::new(
//!     Box::new(store),
//!     Arc::new(Backend),
//!     connectivity.clone(),
//!     auth.clone(),
//!     Arc::new(SystemClock),
//!     SyncConfig::default(),
//! );
//! let driver = spawn_sync_driver(queue.clone());
//!
//! let mut payload = Payload::new();
//! payload.insert("id".into(), json!("e1"));
//! payload.insert("text".into(), json!("hi"));
//! queue.enqueue("journal_entries", OpKind::Insert, payload).await.expect("enqueue");
//!
//! auth.sign_in("user-1");
//! connectivity.set_online(true);
//! driver.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Queue and driver tuning.
pub mod config;
/// Sync queue core.
pub mod core;
/// Queued operation model and persistence wrapper types.
pub mod op;
/// Local store abstraction and SQLite implementation.
pub mod persist;
/// Remote backend abstraction.
pub mod remote;
/// Driver runtime and events.
pub mod runtime;
/// Connectivity, auth and clock inputs.
pub mod signal;
/// Shared primitive types and enums.
pub mod types;
