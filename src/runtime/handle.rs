use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    core::queue::{SyncError, SyncOutcome, SyncQueue},
    signal::AuthEvent,
};

use super::events::SyncEvent;

/// Handle to the task that turns connectivity and auth signals into sync passes.
pub struct SyncDriverHandle {
    cmd_tx: mpsc::Sender<Command>,
    queue: SyncQueue,
}

impl Clone for SyncDriverHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            queue: self.queue.clone(),
        }
    }
}

enum Command {
    Trigger {
        resp: oneshot::Sender<SyncOutcome>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Spawns the driver for `queue`.
///
/// A pass runs immediately when online, then on every offline-to-online
/// transition, on every [`AuthEvent::SignedIn`], and every
/// `retry_interval_ms` when that is non-zero.
pub fn spawn_sync_driver(queue: SyncQueue) -> SyncDriverHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(32);
    let mut online_rx = queue.connectivity().subscribe();
    let mut auth_rx = queue.auth().subscribe();
    let interval_ms = queue.config().retry_interval_ms;
    let driver_queue = queue.clone();

    tokio::spawn(async move {
        let queue = driver_queue;
        let mut was_online = *online_rx.borrow_and_update();
        let retry_every = Duration::from_millis(interval_ms);
        let mut next_retry = Instant::now() + retry_every;

        if was_online {
            queue.spawn_sync();
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Trigger { resp }) => {
                            let pass = queue.clone();
                            tokio::spawn(async move {
                                let _ = resp.send(pass.sync().await);
                            });
                        }
                        Some(Command::Shutdown { resp }) => {
                            let _ = resp.send(());
                            break;
                        }
                        None => break,
                    }
                }
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online && !was_online {
                        info!("back online, replaying queued ops");
                        queue.spawn_sync();
                    }
                    was_online = online;
                }
                event = auth_rx.recv() => {
                    match event {
                        Ok(AuthEvent::SignedIn { user }) => {
                            debug!(%user, "signed in, replaying queued ops");
                            queue.spawn_sync();
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "auth events lagged");
                            queue.spawn_sync();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = tokio::time::sleep_until(next_retry), if interval_ms > 0 => {
                    queue.spawn_sync();
                    next_retry = Instant::now() + retry_every;
                }
            }
        }
        debug!("sync driver stopped");
    });

    SyncDriverHandle { cmd_tx, queue }
}

impl SyncDriverHandle {
    /// Queue driven by this handle.
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Receiver of subsequent [`SyncEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.queue.subscribe()
    }

    /// Runs a pass on its own task and waits for its outcome.
    ///
    /// The driver keeps serving signals and [`Self::shutdown`] meanwhile.
    pub async fn trigger(&self) -> Result<SyncOutcome, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Trigger { resp: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Stops the driver. Queued operations stay persisted.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }
}
