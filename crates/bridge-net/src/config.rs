//! Settings for a [`SessionClient`](crate::SessionClient).

use std::time::Duration;

use crate::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::reconnection::ReconnectConfig;

/// Connection and retry settings for one session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Authority host name or address. Default: `localhost`.
    pub server_address: String,
    /// Authority TCP port. Default: 12345.
    pub server_port: u16,
    /// Upper bound on TCP connect. Default: 5 s.
    pub connect_timeout: Duration,
    /// Bytes requested per socket read. Default: 4096.
    pub read_buffer_size: usize,
    /// Cap on a partial inbound line. Default: 64 KiB.
    pub max_line_length: usize,
    /// How long to wait for a stopping worker before moving on. Default: 1 s.
    pub worker_join_grace: Duration,
    /// Automatic reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_address: "localhost".to_string(),
            server_port: 12345,
            connect_timeout: Duration::from_secs(5),
            read_buffer_size: 4096,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            worker_join_grace: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SessionConfig {
    /// `host:port` as dialed.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_address, self.server_port)
    }
}
