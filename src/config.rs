//! Stream configuration options

use std::time::Duration;

use crate::protocol::constants::DEFAULT_INGEST_PORT;

/// Tunables for the control channel and keepalive cadence
#[derive(Debug, Clone)]
pub struct FtlConfig {
    /// TCP port the ingest control service listens on
    pub ingest_port: u16,

    /// DNS resolution must complete within this time
    pub resolve_timeout: Duration,

    /// TCP connect budget per resolved candidate
    pub connect_timeout: Duration,

    /// Handshake response budget per request
    pub response_timeout: Duration,

    /// Time between keepalive pings
    pub keepalive_interval: Duration,

    /// A ping response must arrive within this time to count
    pub keepalive_timeout: Duration,

    /// Consecutive missed pings before the connection is declared lost
    pub keepalive_miss_budget: u32,

    /// Budget for the best-effort DISCONNECT exchange on teardown
    pub disconnect_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for FtlConfig {
    fn default() -> Self {
        Self {
            ingest_port: DEFAULT_INGEST_PORT,
            resolve_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(5), // Protocol cadence
            keepalive_timeout: Duration::from_secs(5),
            keepalive_miss_budget: 3,
            disconnect_timeout: Duration::from_secs(2),
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl FtlConfig {
    /// Set the ingest control port
    pub fn ingest_port(mut self, port: u16) -> Self {
        self.ingest_port = port;
        self
    }

    /// Set the DNS resolution timeout
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Set the per-candidate TCP connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handshake response timeout
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the keepalive ping interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the per-ping response timeout
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    /// Set the consecutive-miss budget (floors at 1)
    pub fn keepalive_miss_budget(mut self, budget: u32) -> Self {
        self.keepalive_miss_budget = budget.max(1);
        self
    }

    /// Set the teardown DISCONNECT budget
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }
}
