use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use tokio::select;
use tracing::{error, info};

use counter_service::{
    cli::Cli,
    lifecycle::{Coordinator, ShutdownOutcome},
    signal::shutdown_signal,
    store::RedisStore,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let config = Cli::parse().into_config();
    let backend = match RedisStore::new(&config.redis_host, config.redis_port) {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            error!(error = %err, "invalid redis address");
            return ExitCode::FAILURE;
        }
    };
    info!(redis = backend.addr(), dump_file = %config.dump_file.display(), "starting");

    let mut coordinator = Coordinator::new(config, backend);
    let signal = shutdown_signal();
    tokio::pin!(signal);

    let started = select! {
        result = coordinator.start() => Some(result),
        signal = &mut signal => {
            info!(%signal, "signal received during startup");
            None
        }
    };

    match started {
        Some(Ok(addr)) => {
            info!("listening on {addr}");
            let signal = signal.await;
            info!(%signal, "signal received");
            finish(coordinator.shutdown().await)
        }
        Some(Err(err)) => {
            error!(error = %err, "error launching application");
            let outcome = coordinator.shutdown().await;
            if outcome.forces_exit() {
                std::process::exit(i32::from(outcome.exit_status()));
            }
            ExitCode::FAILURE
        }
        None => finish(coordinator.shutdown().await),
    }
}

fn finish(outcome: ShutdownOutcome) -> ExitCode {
    if outcome.forces_exit() {
        std::process::exit(i32::from(outcome.exit_status()));
    }
    ExitCode::from(outcome.exit_status())
}
