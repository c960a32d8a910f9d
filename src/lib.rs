//! A bidirectional bridge between a WebSocket client and a raw TCP/UNIX
//! target, with HTTP upgrade handling and pluggable token/auth resolution.
//!
//! It's an async library based on the tokio runtime: a listener accepts
//! plain or TLS-wrapped connections, speaks just enough HTTP/1.1 to perform
//! the [WebSocket Protocol RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455)
//! upgrade handshake, resolves the client's token to a backend address
//! through a pluggable [`plugins::TokenResolver`], and then pumps framed
//! WebSocket messages against raw target bytes until either side closes.

pub mod broker;
pub mod config;
pub mod error;
pub mod frame;
pub mod http;
pub mod message;
pub mod plugins;
pub mod record;
pub mod stream;
