use std::{io, net::SocketAddr};

use axum::Router;
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener already running")]
    AlreadyRunning,

    #[error("failed to bind HTTP listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// A single HTTP listener serving a router on a fixed address.
///
/// At most one server runs per listener: a second `start` while running is
/// rejected.
pub struct HttpListener {
    addr: SocketAddr,
    router: Router,
    running: Option<RunningServer>,
}

struct RunningServer {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HttpListener {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self {
            addr,
            router,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound, once running. Differs from the configured one for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    pub async fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        if self.running.is_some() {
            return Err(ListenerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: self.addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind {
                addr: self.addr,
                source,
            })?;

        let (stop, stopped) = oneshot::channel::<()>();
        let router = self.router.clone();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stopped.await;
            };
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = ?err, "HTTP server exited with error");
            }
        });

        info!(addr = %local_addr, "HTTP server listening");
        self.running = Some(RunningServer {
            local_addr,
            stop,
            task,
        });
        Ok(local_addr)
    }

    /// Stops accepting new connections. In-flight requests are left to finish
    /// on their own. Returns the server task so callers may wait for it.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        let running = self.running.take()?;
        let _ = running.stop.send(());
        info!(addr = %running.local_addr, "HTTP server stopped accepting connections");
        Some(running.task)
    }
}
