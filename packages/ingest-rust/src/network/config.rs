//! Network configuration types for the ingest channel.

use std::time::Duration;

/// Top-level network configuration for the request channel.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// WebSocket endpoint of the remote graph store.
    pub endpoint: String,
    /// Maximum time allowed for the TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,
    /// Per-connection settings.
    pub connection: ConnectionConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8007".to_string(),
            connect_timeout: Duration::from_secs(10),
            connection: ConnectionConfig::default(),
        }
    }
}

/// Per-connection configuration controlling backpressure.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bounded mpsc channel capacity for outbound frames.
    pub outbound_channel_capacity: usize,
    /// Bounded mpsc channel capacity for inbound events.
    pub inbound_channel_capacity: usize,
    /// Maximum time to wait when enqueueing an outbound frame.
    pub send_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 64,
            inbound_channel_capacity: 256,
            send_timeout: Duration::from_secs(5),
        }
    }
}
