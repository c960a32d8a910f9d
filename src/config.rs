//! Runtime configuration shared across connections.
//!
//! Plugins are constructed once at startup from these configs and handed to
//! the broker as `Arc`s; nothing here is mutated per-connection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// WebSocket framing limits, enforced by [`crate::message::MessageStream`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Cap on a single frame's declared payload length.
    pub max_frame_size: usize,
    /// Cap on a fully reassembled message (after defragmentation).
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: 16 << 20,
            max_message_size: 2 << 20,
        }
    }
}

/// TLS material for the listener side (client-facing).
#[derive(Clone)]
pub struct TlsConfig {
    pub server_config: Arc<rustls::ServerConfig>,
    /// When true, a connection whose first byte does not look like TLS is
    /// closed instead of being served as plaintext.
    pub tls_only: bool,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("tls_only", &self.tls_only)
            .finish_non_exhaustive()
    }
}

/// Static file serving behavior for the plain-HTTP (non-upgrade) path.
#[derive(Debug, Clone, Default)]
pub struct StaticServeConfig {
    pub web_root: Option<PathBuf>,
    /// Reject everything but the upgrade (405 on any GET/HEAD for a file).
    pub only_upgrade: bool,
    /// Serve files but never a directory listing (404 instead).
    pub file_only: bool,
}

/// Where (if anywhere) to write the per-connection VNC-style frame log.
#[derive(Debug, Clone, Default)]
pub struct RecordConfig {
    pub directory: Option<PathBuf>,
}

/// `SO_KEEPALIVE` tuning applied to every accepted client socket.
#[derive(Debug, Clone)]
pub struct TcpKeepaliveConfig {
    pub enabled: bool,
    /// `TCP_KEEPIDLE`: idle time before the first probe.
    pub idle: Duration,
    /// `TCP_KEEPINTVL`: interval between probes.
    pub interval: Duration,
    /// `TCP_KEEPCNT`: probes sent before the connection is dropped.
    pub count: u32,
}

impl Default for TcpKeepaliveConfig {
    fn default() -> Self {
        TcpKeepaliveConfig {
            enabled: true,
            idle: Duration::from_secs(60),
            interval: Duration::from_secs(10),
            count: 3,
        }
    }
}

/// Top-level server configuration, assembled once at startup.
#[derive(Clone)]
pub struct ServerConfig {
    pub web_socket: WebSocketConfig,
    pub tls: Option<TlsConfig>,
    pub static_serve: StaticServeConfig,
    pub record: RecordConfig,
    pub tcp_keepalive: TcpKeepaliveConfig,
    /// Subprotocols the server is willing to select, in preference order.
    /// Defaults to exactly `"binary"`.
    pub subprotocols: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            web_socket: WebSocketConfig::default(),
            tls: None,
            static_serve: StaticServeConfig::default(),
            record: RecordConfig::default(),
            tcp_keepalive: TcpKeepaliveConfig::default(),
            subprotocols: vec!["binary".to_string()],
        }
    }
}
