//! Client-facing transport: a plain TCP stream, or one wrapped in TLS after
//! a peek-based sniff, so the listener doesn't need TLS pre-negotiated for
//! it ahead of time.

use crate::config::{TcpKeepaliveConfig, TlsConfig};
use crate::error::Error;
use socket2::{SockRef, TcpKeepalive};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Applies `SO_KEEPALIVE` and the `TCP_KEEPIDLE`/`TCP_KEEPINTVL`/`TCP_KEEPCNT`
/// tuning in `cfg` to a freshly accepted socket. A no-op if `cfg.enabled` is
/// false.
pub fn apply_keepalive(stream: &TcpStream, cfg: &TcpKeepaliveConfig) -> Result<(), Error> {
    if !cfg.enabled {
        return Ok(());
    }
    let keepalive = TcpKeepalive::new()
        .with_time(cfg.idle)
        .with_interval(cfg.interval)
        .with_retries(cfg.count);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    Ok(())
}

/// Peeks the first byte of a freshly accepted TCP connection and, depending
/// on configuration, wraps it in TLS. `0x16` (TLS handshake record) and
/// `0x80` (SSLv2) are the two recognized leading bytes.
pub async fn sniff_and_wrap(stream: TcpStream, tls: Option<&TlsConfig>) -> Result<Transport, Error> {
    let mut peek_buf = [0u8; 1];
    let n = stream.peek(&mut peek_buf).await?;
    let looks_like_tls = n == 1 && matches!(peek_buf[0], 0x16 | 0x80);

    match tls {
        Some(cfg) if looks_like_tls => {
            let acceptor = TlsAcceptor::from(cfg.server_config.clone());
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| Error::TargetTlsError(e.to_string()))?;
            Ok(Transport::Tls(Box::new(tls_stream)))
        }
        Some(cfg) if cfg.tls_only => Err(Error::Config(
            "non-SSL connection received but disallowed".to_string(),
        )),
        _ => Ok(Transport::Plain(stream)),
    }
}
