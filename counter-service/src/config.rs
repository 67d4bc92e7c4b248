use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_DUMP_FILE: &str = "trackdata.txt";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Runtime settings for the counter service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_address: IpAddr,
    /// Port 0 binds an ephemeral port.
    pub http_port: u16,
    pub redis_host: String,
    pub redis_port: u16,
    /// File receiving one JSON line per `/track` request.
    pub dump_file: PathBuf,
    /// Longest a graceful shutdown may take before the process gives up on it.
    pub shutdown_timeout: Duration,
    pub reconnect_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: DEFAULT_HTTP_PORT,
            redis_host: Ipv4Addr::LOCALHOST.to_string(),
            redis_port: DEFAULT_REDIS_PORT,
            dump_file: PathBuf::from(DEFAULT_DUMP_FILE),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl ServiceConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.http_port)
    }
}
