//! Mapping from the on-disk [`Config`] to the session client's settings.

use std::time::Duration;

use bridge_config::Config;
use bridge_net::{ReconnectConfig, SessionConfig};

/// Build the [`SessionConfig`] described by `config`.
pub fn session_config(config: &Config) -> SessionConfig {
    let network = &config.network;
    let reconnect = &config.reconnect;
    SessionConfig {
        server_address: network.server_address.clone(),
        server_port: network.server_port,
        connect_timeout: Duration::from_millis(network.connect_timeout_ms),
        read_buffer_size: network.read_buffer_size.max(1),
        max_line_length: network.max_line_length.max(1),
        worker_join_grace: Duration::from_millis(reconnect.worker_join_grace_ms),
        reconnect: ReconnectConfig {
            max_attempts: reconnect.max_attempts,
            delay: Duration::from_millis(reconnect.delay_ms),
            tick: Duration::from_millis(reconnect.tick_ms.max(1)),
        },
    }
}
