//! Connection broker: owns one accepted connection end to end — HTTP
//! upgrade, token/origin/auth validation, target dial, and the full-duplex
//! pump between client and target once both sides are live.
//!
//! Validation order is extract token, resolve target, validate origin, run
//! auth, then connect and pump; each accepted connection runs as its own
//! `tokio::spawn`ed task, with `tokio::select!` racing the two read halves.

use crate::config::ServerConfig;
use crate::error::Error;
use crate::frame::OpCode;
use crate::http::{self, UpgradeRequest};
use crate::message::{MessageStream, Received};
use crate::plugins::{AuthValidator, OriginValidator, TargetDescriptor, TokenResolver, TrafficInterceptor};
use crate::record::{Direction, Recorder};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrokerState {
    Init,
    Validated,
    Authed,
    Connected,
    Pumping,
    Closing,
    Closed,
}

/// Plugins wired in for one server instance; shared across all connections
/// via `Arc`.
pub struct Plugins {
    pub token_resolver: Arc<dyn TokenResolver>,
    pub origin_validator: Option<Arc<dyn OriginValidator>>,
    pub auth_validator: Option<Arc<dyn AuthValidator>>,
    pub interceptor: Option<Arc<dyn TrafficInterceptor>>,
}

pub struct Broker {
    config: Arc<ServerConfig>,
    plugins: Arc<Plugins>,
}

impl Broker {
    pub fn new(config: Arc<ServerConfig>, plugins: Arc<Plugins>) -> Self {
        Broker { config, plugins }
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Drives one connection from its first HTTP bytes through close.
    /// `connection_id` is used only for logging and the recording filename.
    pub async fn handle<T>(&self, mut transport: T, connection_id: &str) -> Result<(), Error>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        log::debug!("connection {connection_id}: {:?}", BrokerState::Init);
        let (mut request, leftover) = http::read_request(&mut transport).await?;

        if request.method != "GET" && request.method != "HEAD" {
            let response = http::build_error_response(405, "Method Not Allowed", &[]);
            transport.write_all(&response).await?;
            return Err(Error::MalformedHttpRequest(format!(
                "unsupported method: {}",
                request.method
            )));
        }

        if !request.is_upgrade_request() {
            return self.handle_plain_http(&mut transport, &request).await;
        }

        let target_desc = match extract_token(&request.target) {
            Some(token) => self.plugins.token_resolver.lookup(&token).await,
            None => None,
        };
        let Some(target_desc) = target_desc else {
            let response = http::build_error_response(400, "ignored: no token match", &[]);
            transport.write_all(&response).await?;
            return Err(Error::UnknownToken);
        };
        log::debug!("connection {connection_id}: {:?}", BrokerState::Validated);

        if let Some(origin_validator) = &self.plugins.origin_validator {
            if let Err(e) = origin_validator.validate(request.header("origin")).await {
                let response = http::build_error_response(403, &e.to_string(), &[]);
                transport.write_all(&response).await?;
                return Err(Error::InvalidOrigin(e.to_string()));
            }
        }

        let (target_host, target_port) = match &target_desc {
            TargetDescriptor::Tcp { host, port, .. } => (host.clone(), *port),
            TargetDescriptor::Unix { path } => (path.display().to_string(), 0),
        };

        if let Some(auth_validator) = &self.plugins.auth_validator {
            inject_client_cn(&mut request);
            if let Err(e) = auth_validator
                .authenticate(&request.headers, &target_host, target_port)
                .await
            {
                let response = http::build_error_response(e.status, &e.message, &e.headers);
                transport.write_all(&response).await?;
                return Err(Error::AuthRejected(e.to_string()));
            }
        }
        log::debug!("connection {connection_id}: {:?}", BrokerState::Authed);

        let target = match connect_target(&target_desc).await {
            Ok(t) => t,
            Err(e) => {
                let response = http::build_error_response(502, &e.to_string(), &[]);
                transport.write_all(&response).await?;
                return Err(e);
            }
        };
        log::debug!("connection {connection_id}: {:?}", BrokerState::Connected);

        let accept_key = request
            .header("sec-websocket-key")
            .ok_or(Error::MissingWebSocketKey)?;
        let accept = http::sec_websocket_accept(accept_key);
        let subprotocol = http::select_subprotocol(&request.protocols, &self.config.subprotocols);
        transport
            .write_all(&http::build_101_response(&accept, subprotocol.as_deref()))
            .await?;

        let recorder = match &self.config.record.directory {
            Some(dir) => Some(Recorder::create(dir, connection_id).await?),
            None => None,
        };

        log::debug!("connection {connection_id}: {:?}", BrokerState::Pumping);
        let result = self.pump(transport, target, leftover, recorder).await;
        log::debug!(
            "connection {connection_id}: {:?} -> {:?}",
            BrokerState::Closing,
            BrokerState::Closed
        );
        result
    }

    async fn handle_plain_http<T>(&self, transport: &mut T, request: &UpgradeRequest) -> Result<(), Error>
    where
        T: AsyncWrite + Unpin,
    {
        if self.config.static_serve.only_upgrade {
            let response = http::build_error_response(405, "upgrade required", &[]);
            transport.write_all(&response).await?;
            return Ok(());
        }
        let Some(web_root) = &self.config.static_serve.web_root else {
            let response = http::build_error_response(404, "Not Found", &[]);
            transport.write_all(&response).await?;
            return Ok(());
        };
        http::serve_static(transport, web_root, &request.target, self.config.static_serve.file_only).await
    }

    /// Full-duplex pump: client WebSocket messages become raw bytes toward
    /// the target, and raw bytes from the target become binary frames
    /// toward the client. Runs until either side closes.
    async fn pump<T, U>(
        &self,
        client: T,
        mut target: U,
        leftover: bytes::BytesMut,
        mut recorder: Option<Recorder>,
    ) -> Result<(), Error>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
        U: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if !leftover.is_empty() {
            log::debug!("pipelined {} bytes following the upgrade request", leftover.len());
        }
        let mut stream = MessageStream::with_leftover(client, self.config.web_socket.clone(), leftover);

        let mut target_buf = vec![0u8; 16 * 1024];
        let outcome: Result<(), Error> = loop {
            tokio::select! {
                received = stream.receive_message() => {
                    let received = match received {
                        Ok(r) => r,
                        Err(e) => {
                            let _ = stream.close(close_code_for(&e), "").await;
                            let _ = target.shutdown().await;
                            break Err(e);
                        }
                    };
                    match received {
                        Received::Closed { .. } => {
                            let _ = target.shutdown().await;
                            break Ok(());
                        }
                        Received::Message { payload, .. } => {
                            let outgoing = match &self.plugins.interceptor {
                                Some(interceptor) => {
                                    let out = interceptor.from_client(payload).await;
                                    if let Some(inject) = out.inject_to_client {
                                        if let Err(e) = stream.send_message(OpCode::Binary, &inject).await {
                                            break Err(e);
                                        }
                                    }
                                    out.forward
                                }
                                None => Some(payload),
                            };
                            if let Some(bytes) = outgoing {
                                if let Some(rec) = recorder.as_mut() {
                                    if let Err(e) = rec.record(Direction::FromClient, &bytes).await {
                                        break Err(e);
                                    }
                                }
                                if let Err(e) = target.write_all(&bytes).await {
                                    let _ = stream.close(1011, "target write failed").await;
                                    break Err(e.into());
                                }
                            }
                        }
                    }
                }
                n = target.read(&mut target_buf) => {
                    let n = match n {
                        Ok(n) => n,
                        Err(e) => {
                            let _ = stream.close(1011, "target read failed").await;
                            break Err(e.into());
                        }
                    };
                    if n == 0 {
                        let _ = stream.close(1011, "target closed connection").await;
                        break Ok(());
                    }
                    let chunk = &target_buf[..n];
                    let outgoing = match &self.plugins.interceptor {
                        Some(interceptor) => {
                            let out = interceptor.from_target(chunk.to_vec()).await;
                            if let Some(inject) = out.inject_to_target {
                                if let Err(e) = target.write_all(&inject).await {
                                    break Err(e.into());
                                }
                            }
                            out.forward
                        }
                        None => Some(chunk.to_vec()),
                    };
                    if let Some(bytes) = outgoing {
                        if let Some(rec) = recorder.as_mut() {
                            if let Err(e) = rec.record(Direction::ToClient, &bytes).await {
                                break Err(e);
                            }
                        }
                        if let Err(e) = stream.send_message(OpCode::Binary, &bytes).await {
                            break Err(e);
                        }
                    }
                }
            }
        };

        if let Some(rec) = recorder {
            rec.close().await?;
        }
        outcome
    }
}

/// Maps a mid-session error to a WebSocket close code: malformed frames are
/// a protocol error (1002), an oversized message gets its own code (1009),
/// everything else (I/O, target trouble) is 1011.
fn close_code_for(error: &Error) -> u16 {
    match error {
        Error::MessageTooLarge(..) => 1009,
        Error::RsvNotZero
        | Error::InvalidOpcode(_)
        | Error::ControlFrameFragmented
        | Error::ControlFramePayloadTooLarge
        | Error::FrameTooLarge(..)
        | Error::UnmaskedClientFrame
        | Error::NonMinimalLength16
        | Error::NonMinimalLength64
        | Error::InvalidCloseLength
        | Error::InvalidContinuationFrame
        | Error::FragmentedInProgress
        | Error::InvalidUtf8 { .. } => 1002,
        _ => 1011,
    }
}

fn extract_token(target: &str) -> Option<String> {
    let query = target.split_once('?')?.1;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

/// TLS-layer CN extraction isn't plumbed through the generic transport type
/// yet; callers that terminate TLS with client-cert auth enabled should set
/// `request.ssl_client_cn` before calling `handle`. This mirrors that value
/// into the header map `ClientCertCnAuth` reads.
fn inject_client_cn(request: &mut UpgradeRequest) {
    if let Some(cn) = request.ssl_client_cn.clone() {
        request.headers.insert("x-ssl-client-cn".to_string(), cn);
    }
}

async fn connect_target(target: &TargetDescriptor) -> Result<Box<dyn AsyncReadWrite>, Error> {
    match target {
        TargetDescriptor::Tcp { host, port, .. } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|e| Error::TargetUnreachable(format!("{host}:{port}: {e}")))?;
            Ok(Box::new(stream))
        }
        TargetDescriptor::Unix { path } => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| Error::TargetUnreachable(format!("{}: {e}", path.display())))?;
            Ok(Box::new(stream))
        }
    }
}

/// Object-safe union of `TcpStream`/`UnixStream` so `connect_target` can
/// return either without the broker's pump loop being generic over it.
trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_query_string() {
        assert_eq!(
            extract_token("/websockify?foo=bar&token=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_token("/websockify"), None);
    }

    #[test]
    fn decodes_percent_encoded_token() {
        assert_eq!(
            extract_token("/websockify?token=abc%3Ddef"),
            Some("abc=def".to_string())
        );
    }
}
