use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::Parser;

use crate::config::{DEFAULT_DUMP_FILE, DEFAULT_HTTP_PORT, DEFAULT_REDIS_PORT, ServiceConfig};

/// Counts `/track` hits in Redis and dumps their query parameters to a file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// HTTP server port.
    #[arg(
        short = 'l',
        long,
        env = "HTTP_PORT",
        default_value_t = DEFAULT_HTTP_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub listen_on: u16,

    /// Interface the HTTP server binds to.
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Host of the Redis server holding the counter.
    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    /// Port of the Redis server holding the counter.
    #[arg(
        short = 'r',
        long,
        env = "REDIS_PORT",
        default_value_t = DEFAULT_REDIS_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub redis_port: u16,

    /// File into which /track request parameters are dumped.
    #[arg(short = 'd', long, env = "DUMP_FILE", default_value = DEFAULT_DUMP_FILE)]
    pub dump_file: PathBuf,

    /// Milliseconds to wait for a graceful shutdown before exiting with an error.
    #[arg(long, env = "SHUTDOWN_TIMEOUT_MS", default_value_t = 2000)]
    pub shutdown_timeout_ms: u64,

    /// Milliseconds between attempts to reach an unavailable Redis server.
    #[arg(long, env = "RECONNECT_INTERVAL_MS", default_value_t = 1000)]
    pub reconnect_interval_ms: u64,
}

impl Cli {
    pub fn into_config(self) -> ServiceConfig {
        ServiceConfig {
            bind_address: self.bind_address,
            http_port: self.listen_on,
            redis_host: self.redis_host,
            redis_port: self.redis_port,
            dump_file: self.dump_file,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
        }
    }
}
