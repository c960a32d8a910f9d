//! Stateful adapter over a duplex byte transport: reassembles fragments,
//! answers pings, performs the close handshake. One struct instead of a
//! separate reader/writer pair.
//!
//! A cooperative, readiness-driven state machine maps naturally onto
//! tokio: every transport read is a suspension point, and under tokio
//! that's simply `.await` — a task yields to the runtime instead of
//! spinning on an explicit would-block value. Fragment reassembly,
//! ping/pong handling and close idempotence are otherwise unchanged.

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::frame::{self, Decode, OpCode};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Message { opcode: OpCode, payload: Vec<u8> },
    Closed { code: u16, reason: String },
}

struct PartialMessage {
    opcode: OpCode,
    payload: Vec<u8>,
}

pub struct MessageStream<T> {
    transport: T,
    recv_buf: BytesMut,
    partial: Option<PartialMessage>,
    close_sent: bool,
    close_received: bool,
    close_code: Option<u16>,
    close_reason: Option<String>,
    config: WebSocketConfig,
}

impl<T: AsyncRead + AsyncWrite + Unpin> MessageStream<T> {
    pub fn new(transport: T, config: WebSocketConfig) -> Self {
        Self::with_leftover(transport, config, BytesMut::new())
    }

    /// Like [`Self::new`], but seeds the receive buffer with bytes already
    /// read off the transport (e.g. pipelined past the HTTP upgrade
    /// request) before any frame has been decoded from them.
    pub fn with_leftover(transport: T, config: WebSocketConfig, leftover: BytesMut) -> Self {
        let mut recv_buf = BytesMut::with_capacity(READ_CHUNK.max(leftover.len()));
        recv_buf.extend_from_slice(&leftover);
        MessageStream {
            transport,
            recv_buf,
            partial: None,
            close_sent: false,
            close_received: false,
            close_code: None,
            close_reason: None,
            config,
        }
    }

    /// True when the receive buffer already holds at least one more whole
    /// frame, so the caller needn't wait on the transport before calling
    /// `receive_message` again.
    pub fn pending(&self) -> bool {
        matches!(
            frame::decode(&self.recv_buf, self.config.max_frame_size as u64),
            Decode::Frame { .. }
        )
    }

    /// Encode and send one non-fragmented data frame.
    pub async fn send_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        self.write_frame(opcode, payload).await
    }

    async fn write_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        let encoded = frame::encode(opcode, payload, false);
        self.transport.write_all(&encoded).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Queue a CLOSE frame. Idempotent — subsequent calls are no-ops.
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), Error> {
        if self.close_sent {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        self.write_frame(OpCode::Close, &payload).await?;
        self.close_sent = true;
        Ok(())
    }

    async fn read_more(&mut self) -> Result<usize, Error> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.transport.read(&mut chunk).await?;
        self.recv_buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    async fn next_frame(&mut self) -> Result<frame::Frame, Error> {
        loop {
            match frame::decode(&self.recv_buf, self.config.max_frame_size as u64) {
                Decode::Frame { frame, consumed } => {
                    let _ = self.recv_buf.split_to(consumed);
                    if !frame.masked {
                        return Err(Error::UnmaskedClientFrame);
                    }
                    return Ok(frame);
                }
                Decode::NeedMore(_) => {
                    if self.read_more().await? == 0 {
                        return Err(Error::Io {
                            source: std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "transport closed mid-frame",
                            ),
                        });
                    }
                }
                Decode::ProtocolError(e) => return Err(e),
            }
        }
    }

    /// Read, reassemble and dispatch frames until one full message (or the
    /// close handshake) is ready to surface to the caller.
    pub async fn receive_message(&mut self) -> Result<Received, Error> {
        if self.close_received {
            return Ok(Received::Closed {
                code: self.close_code.unwrap_or(1005),
                reason: self.close_reason.clone().unwrap_or_default(),
            });
        }

        loop {
            let frame = self.next_frame().await?;
            match frame.opcode {
                OpCode::Text | OpCode::Binary if !frame.fin => {
                    if self.partial.is_some() {
                        return Err(Error::FragmentedInProgress);
                    }
                    self.partial = Some(PartialMessage {
                        opcode: frame.opcode,
                        payload: frame.payload,
                    });
                }
                OpCode::Continue => {
                    let Some(partial) = self.partial.as_mut() else {
                        return Err(Error::InvalidContinuationFrame);
                    };
                    partial.payload.extend_from_slice(&frame.payload);
                    if partial.payload.len() > self.config.max_message_size {
                        return Err(Error::MessageTooLarge(
                            partial.payload.len(),
                            self.config.max_message_size,
                        ));
                    }
                    if frame.fin {
                        let partial = self.partial.take().unwrap();
                        return Ok(Received::Message {
                            opcode: partial.opcode,
                            payload: partial.payload,
                        });
                    }
                }
                OpCode::Text | OpCode::Binary => {
                    if self.partial.is_some() {
                        return Err(Error::FragmentedInProgress);
                    }
                    if frame.payload.len() > self.config.max_message_size {
                        return Err(Error::MessageTooLarge(
                            frame.payload.len(),
                            self.config.max_message_size,
                        ));
                    }
                    if frame.opcode == OpCode::Text {
                        String::from_utf8(frame.payload.clone())?;
                    }
                    return Ok(Received::Message {
                        opcode: frame.opcode,
                        payload: frame.payload,
                    });
                }
                OpCode::Ping => {
                    // Jumps the queue ahead of any pending data: answered
                    // inline, before the loop considers another data frame.
                    self.write_frame(OpCode::Pong, &frame.payload).await?;
                }
                OpCode::Pong => {
                    // Discarded.
                }
                OpCode::Close => {
                    let (code, reason) = parse_close_payload(&frame.payload);
                    self.close_received = true;
                    self.close_code = Some(code);
                    self.close_reason = Some(reason.clone());
                    if !self.close_sent {
                        self.close(code, "").await?;
                    }
                    return Ok(Received::Closed { code, reason });
                }
            }
        }
    }
}

fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    if payload.len() >= 2 {
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
        (code, reason)
    } else {
        (1005, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode;
    use tokio::io::duplex;

    fn masked_client_frame(opcode: OpCode, fin: bool, payload: &[u8]) -> Vec<u8> {
        // Re-encode as client would (masked), reusing the server encoder's
        // length-prefix logic and then masking manually for test purposes.
        let unmasked = encode(opcode, payload, false);
        let header_len = unmasked.len() - payload.len();
        let mut out = unmasked[..header_len].to_vec();
        out[0] = (fin as u8) << 7 | opcode.as_u8();
        out[1] |= 0x80;
        let key = [0x11u8, 0x22, 0x33, 0x44];
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        out
    }

    #[tokio::test]
    async fn fragmented_message_reassembles() {
        let (client, server) = duplex(4096);
        let mut stream = MessageStream::new(server, WebSocketConfig::default());

        let mut input = masked_client_frame(OpCode::Text, false, b"Hel");
        input.extend(masked_client_frame(OpCode::Continue, true, b"lo"));

        let mut client = client;
        client.write_all(&input).await.unwrap();

        let received = stream.receive_message().await.unwrap();
        assert_eq!(
            received,
            Received::Message {
                opcode: OpCode::Text,
                payload: b"Hello".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut client, server) = duplex(4096);
        let mut stream = MessageStream::new(server, WebSocketConfig::default());

        let mut payload = 1000u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"bye");
        client
            .write_all(&masked_client_frame(OpCode::Close, true, &payload))
            .await
            .unwrap();

        let first = stream.receive_message().await.unwrap();
        assert_eq!(
            first,
            Received::Closed {
                code: 1000,
                reason: "bye".to_string()
            }
        );
        let second = stream.receive_message().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (mut client, server) = duplex(4096);
        let mut stream = MessageStream::new(server, WebSocketConfig::default());

        client
            .write_all(&masked_client_frame(OpCode::Ping, true, b"hi"))
            .await
            .unwrap();
        client
            .write_all(&masked_client_frame(OpCode::Text, true, b"after"))
            .await
            .unwrap();

        let received = stream.receive_message().await.unwrap();
        assert_eq!(
            received,
            Received::Message {
                opcode: OpCode::Text,
                payload: b"after".to_vec()
            }
        );

        let mut pong_buf = [0u8; 16];
        let n = client.read(&mut pong_buf).await.unwrap();
        match frame::decode(&pong_buf[..n], u64::MAX) {
            Decode::Frame { frame, .. } => {
                assert_eq!(frame.opcode, OpCode::Pong);
                assert_eq!(frame.payload, b"hi");
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }
}
