use std::fmt;

use tracing::warn;

/// Process signal that asked the service to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Hangup,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Hangup => write!(f, "SIGHUP"),
        }
    }
}

/// Resolves with the first SIGINT, SIGTERM, or SIGHUP the process receives.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> ShutdownSignal {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
        ShutdownSignal::Interrupt
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;

        tokio::select! {
            signal = interrupt => signal,
            signal = unix_signal(SignalKind::terminate(), ShutdownSignal::Terminate) => signal,
            signal = unix_signal(SignalKind::hangup(), ShutdownSignal::Hangup) => signal,
        }
    }

    #[cfg(not(unix))]
    {
        interrupt.await
    }
}

#[cfg(unix)]
async fn unix_signal(
    kind: tokio::signal::unix::SignalKind,
    signal: ShutdownSignal,
) -> ShutdownSignal {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!(%signal, error = ?err, "failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_display() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(ShutdownSignal::Hangup.to_string(), "SIGHUP");
    }
}
