//! Startup and shutdown sequencing.
//!
//! Startup runs strictly in order, each step gating the next:
//! open the audit sink, connect the store (retrying until it answers), reset
//! the counter, then bind the HTTP listener. Shutdown stops the listener,
//! closes the store, then the sink, all under a deadline.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    audit::{AuditError, AuditSink},
    config::ServiceConfig,
    http::{COUNTER_KEY, router},
    listener::{HttpListener, ListenerError},
    store::{KeyValueStore, StoreClient, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("service is already running")]
    AlreadyRunning,

    #[error("cannot start a service that is {0:?}")]
    InvalidState(LifecycleState),

    #[error("audit sink: {0}")]
    Sink(#[from] AuditError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// How a shutdown ended.
#[derive(Debug)]
pub enum ShutdownOutcome {
    /// Every resource closed before the deadline.
    Clean,
    /// A resource failed to close.
    CleanupFailed(LifecycleError),
    /// The deadline passed with closes still in flight.
    DeadlineExpired(Duration),
}

impl ShutdownOutcome {
    pub fn exit_status(&self) -> u8 {
        match self {
            ShutdownOutcome::Clean => 0,
            ShutdownOutcome::CleanupFailed(_) | ShutdownOutcome::DeadlineExpired(_) => 1,
        }
    }

    /// Closes were still pending at the deadline; exit without dropping the runtime.
    pub fn forces_exit(&self) -> bool {
        matches!(self, ShutdownOutcome::DeadlineExpired(_))
    }
}

/// Owns every process-wide resource and the only handles able to close them.
pub struct Coordinator<S> {
    config: ServiceConfig,
    backend: Arc<S>,
    state: LifecycleState,
    sink: Option<Arc<AuditSink>>,
    store: Option<StoreClient<S>>,
    listener: Option<HttpListener>,
}

impl<S: KeyValueStore> Coordinator<S> {
    pub fn new(config: ServiceConfig, backend: Arc<S>) -> Self {
        Self {
            config,
            backend,
            state: LifecycleState::Idle,
            sink: None,
            store: None,
            listener: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Address the HTTP listener is bound to, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(HttpListener::local_addr)
    }

    /// Runs the startup sequence and returns the bound HTTP address.
    ///
    /// Blocks for as long as the store stays unreachable. Aborts on the first
    /// failing step, leaving already opened resources for [`Coordinator::shutdown`].
    pub async fn start(&mut self) -> Result<SocketAddr, LifecycleError> {
        match self.state {
            LifecycleState::Idle => {}
            LifecycleState::Running => return Err(LifecycleError::AlreadyRunning),
            other => return Err(LifecycleError::InvalidState(other)),
        }
        self.state = LifecycleState::Initializing;

        let sink = Arc::new(AuditSink::open(&self.config.dump_file).await?);
        info!(path = %sink.path().display(), "audit sink open");
        self.sink = Some(Arc::clone(&sink));

        let store = StoreClient::new(Arc::clone(&self.backend), self.config.reconnect_interval);
        self.store = Some(store.clone());
        store
            .connect()
            .await
            .map_err(|_| LifecycleError::Store(StoreError::NotConnected))?;

        store.reset(COUNTER_KEY).await?;
        info!(key = COUNTER_KEY, "counter reset to zero");

        let listener = self
            .listener
            .insert(HttpListener::new(self.config.listen_addr(), router(store, sink)));
        let addr = listener.start().await?;

        self.state = LifecycleState::Running;
        Ok(addr)
    }

    /// Stops the service. The outcome's exit status is what the process should exit with.
    ///
    /// May be called from any state; resources never opened are skipped and
    /// each resource is closed at most once.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        if matches!(
            self.state,
            LifecycleState::ShuttingDown | LifecycleState::Terminated
        ) {
            return ShutdownOutcome::Clean;
        }
        self.state = LifecycleState::ShuttingDown;
        info!("application shutting down");

        if let Some(listener) = self.listener.as_mut() {
            listener.stop();
        }

        let deadline = self.config.shutdown_timeout;
        let store = self.store.take();
        let sink = self.sink.take();

        let outcome = match timeout(deadline, close_resources(store, sink)).await {
            Ok(Ok(())) => ShutdownOutcome::Clean,
            Ok(Err(err)) => {
                warn!(error = %err, "error in cleanup");
                ShutdownOutcome::CleanupFailed(err)
            }
            Err(_) => {
                warn!(?deadline, "graceful shutdown failed, exiting now");
                ShutdownOutcome::DeadlineExpired(deadline)
            }
        };

        self.state = LifecycleState::Terminated;
        outcome
    }
}

async fn close_resources<S: KeyValueStore>(
    store: Option<StoreClient<S>>,
    sink: Option<Arc<AuditSink>>,
) -> Result<(), LifecycleError> {
    if let Some(store) = store {
        store.close().await?;
    }
    if let Some(sink) = sink {
        sink.close().await?;
    }
    Ok(())
}
