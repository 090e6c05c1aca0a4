//! Connectivity, authentication and clock inputs of the queue.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, watch};

use crate::types::UserId;

/// Shared online/offline flag fed by the host environment.
///
/// Clones observe and update the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Creates the signal with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Current state as last reported by the host.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Reports a connectivity change. Repeating the current state is a no-op.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|cur| {
            if *cur == online {
                false
            } else {
                *cur = online;
                true
            }
        });
        if changed {
            if online {
                tracing::info!("connectivity: online");
            } else {
                tracing::warn!("connectivity: offline");
            }
        }
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Auth state-change notifications from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user session was established.
    SignedIn {
        /// Signed-in user.
        user: UserId,
    },
    /// The session ended.
    SignedOut,
    /// The session token was renewed; the user is unchanged.
    TokenRefreshed,
}

/// Current user plus a stream of [`AuthEvent`]s.
#[derive(Debug, Clone)]
pub struct AuthState {
    user: Arc<watch::Sender<Option<UserId>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthState {
    /// Creates a signed-out state.
    pub fn new() -> Self {
        let (user, _) = watch::channel(None);
        let (events, _) = broadcast::channel(64);
        Self {
            user: Arc::new(user),
            events,
        }
    }

    /// Currently signed-in user, if any.
    pub fn current_user(&self) -> Option<UserId> {
        self.user.borrow().clone()
    }

    /// Records a sign-in and emits [`AuthEvent::SignedIn`].
    pub fn sign_in(&self, user: impl Into<UserId>) {
        let user = user.into();
        self.user.send_replace(Some(user.clone()));
        let _ = self.events.send(AuthEvent::SignedIn { user });
    }

    /// Records a sign-out and emits [`AuthEvent::SignedOut`].
    pub fn sign_out(&self) {
        self.user.send_replace(None);
        let _ = self.events.send(AuthEvent::SignedOut);
    }

    /// Forwards a token refresh notification.
    pub fn token_refreshed(&self) {
        let _ = self.events.send(AuthEvent::TokenRefreshed);
    }

    /// Receiver of subsequent auth events.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of enqueue timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
