use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};

use super::{ConnectivityState, KeyValueStore, StoreError};

/// Coordinates access to a [`KeyValueStore`].
///
/// Reads and resets are awaited and propagate store errors. Increments are
/// dispatched in the background and never report back to the caller. A
/// supervisor task owns the connection lifecycle: it retries refused connects
/// at a fixed interval and reconnects whenever an operation reports the
/// connection as lost.
pub struct StoreClient<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for StoreClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    store: Arc<S>,
    reconnect_interval: Duration,
    state: watch::Sender<ConnectivityState>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<S: KeyValueStore> StoreClient<S> {
    pub fn new(store: Arc<S>, reconnect_interval: Duration) -> Self {
        let (state, _) = watch::channel(ConnectivityState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                store,
                reconnect_interval,
                state,
                supervisor: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.borrow()
    }

    /// Starts connecting in the background.
    ///
    /// The returned receiver resolves once, the first time the store becomes
    /// reachable. Later reconnects happen silently.
    pub fn connect(&self) -> oneshot::Receiver<()> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(supervise(Arc::clone(&self.inner), ready_tx));

        if let Some(previous) = self.inner.replace_supervisor(Some(handle)) {
            previous.abort();
        }
        ready_rx
    }

    /// Current value of `key`, straight from the store.
    pub async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.inner
            .store
            .get(key)
            .await
            .inspect_err(|err| self.inner.note_failure(err))
    }

    /// Adds `delta` to `key` without waiting for the store to acknowledge it.
    pub fn increment(&self, key: &str, delta: u64) {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = inner.store.incr_by(&key, delta).await {
                inner.note_failure(&err);
                warn!(key = %key, delta, error = %err, "dropped counter increment");
            }
        });
    }

    /// Sets `key` back to zero.
    pub async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.inner
            .store
            .set(key, 0)
            .await
            .inspect_err(|err| self.inner.note_failure(err))
    }

    /// Stops reconnecting and ends the connection. Safe to call when never connected.
    pub async fn close(&self) -> Result<(), StoreError> {
        if let Some(supervisor) = self.inner.replace_supervisor(None) {
            supervisor.abort();
        }

        let previous = self.inner.state.send_replace(ConnectivityState::Disconnected);
        if previous != ConnectivityState::Connected {
            return Ok(());
        }

        self.inner.store.quit().await?;
        info!("store connection closed");
        Ok(())
    }
}

impl<S: KeyValueStore> Inner<S> {
    fn replace_supervisor(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *supervisor, handle)
    }

    /// Flags a live connection as lost so the supervisor reconnects it.
    fn note_failure(&self, err: &StoreError) {
        if !err.is_connectivity() {
            return;
        }
        let lost = self.state.send_if_modified(|state| {
            if *state == ConnectivityState::Connected {
                *state = ConnectivityState::Disconnected;
                true
            } else {
                false
            }
        });
        if lost {
            warn!(error = %err, "store connection lost");
        }
    }

    /// Retries until the store accepts a connection.
    async fn establish(&self) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            self.state.send_replace(ConnectivityState::Connecting);

            match self.store.connect().await {
                Ok(()) => {
                    self.state.send_replace(ConnectivityState::Connected);
                    info!(attempt, "connected to store");
                    return;
                }
                Err(err) if err.is_connection_refusal() => {
                    warn!(
                        attempt,
                        retry_in = ?self.reconnect_interval,
                        "{err}; store not answering, will retry"
                    );
                }
                Err(err) => {
                    warn!(attempt, error = %err, "store connection failed");
                }
            }

            self.state.send_replace(ConnectivityState::Disconnected);
            sleep(self.reconnect_interval).await;
        }
    }
}

async fn supervise<S: KeyValueStore>(inner: Arc<Inner<S>>, ready: oneshot::Sender<()>) {
    let mut ready = Some(ready);
    let mut state = inner.state.subscribe();

    loop {
        inner.establish().await;

        if let Some(ready) = ready.take() {
            let _ = ready.send(());
        }

        let lost = state
            .wait_for(|current| *current == ConnectivityState::Disconnected)
            .await
            .is_ok();
        if !lost {
            return;
        }
        debug!("reconnecting to store");
    }
}
