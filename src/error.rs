//! Crate-wide error taxonomy: protocol errors (malformed HTTP/WebSocket),
//! auth errors (token/auth/origin rejection), target errors (DNS/connect/TLS
//! failures talking to the backend), transport errors (client socket
//! failures) and config errors (fatal at startup, not per-connection).

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // --- Protocol errors: malformed HTTP, malformed frames, bad upgrade ---
    #[error("RSV bits must be zero")]
    RsvNotZero,

    #[error("reserved or unknown opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("control frame must not be fragmented")]
    ControlFrameFragmented,

    #[error("control frame payload exceeds 125 bytes")]
    ControlFramePayloadTooLarge,

    #[error("declared frame length exceeds the configured cap ({0} > {1})")]
    FrameTooLarge(u64, u64),

    #[error("message exceeds the configured cap ({0} > {1})")]
    MessageTooLarge(usize, usize),

    #[error("client sent an unmasked data frame")]
    UnmaskedClientFrame,

    #[error("length marker 126 used for a length that fits in 7 bits")]
    NonMinimalLength16,

    #[error("length marker 127 used with the top bit of the 64-bit length set")]
    NonMinimalLength64,

    #[error("close frame payload length must be 0 or >= 2, got 1")]
    InvalidCloseLength,

    #[error("invalid continuation frame: no fragmented message in progress")]
    InvalidContinuationFrame,

    #[error("text/binary frame received while a fragmented message is in progress")]
    FragmentedInProgress,

    #[error("text payload is not valid UTF-8: {source}")]
    InvalidUtf8 {
        #[from]
        source: std::string::FromUtf8Error,
    },

    #[error("malformed HTTP request: {0}")]
    MalformedHttpRequest(String),

    #[error("HTTP request exceeds the header size cap")]
    HttpRequestTooLarge,

    #[error("missing Sec-WebSocket-Key header")]
    MissingWebSocketKey,

    #[error("unsupported Sec-WebSocket-Version (only 13 is supported)")]
    UnsupportedWebSocketVersion,

    #[error("missing or invalid Upgrade/Connection headers")]
    NotAnUpgradeRequest,

    // --- Auth errors ---
    #[error("no target registered for token")]
    UnknownToken,

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("origin '{0}' is not allowed")]
    InvalidOrigin(String),

    // --- Target errors ---
    #[error("failed to resolve or connect to target: {0}")]
    TargetUnreachable(String),

    #[error("TLS handshake with target failed: {0}")]
    TargetTlsError(String),

    // --- Transport / IO ---
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("operation would block")]
    WouldBlock,

    #[error("operation timed out")]
    Timeout,

    // --- Config errors, fatal at startup ---
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid URL: {source}")]
    UrlParse {
        #[from]
        source: url::ParseError,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("JWT error: {source}")]
    Jwt {
        #[from]
        source: jsonwebtoken::errors::Error,
    },

    #[error("Redis error: {source}")]
    Redis {
        #[from]
        source: redis::RedisError,
    },

    #[error("HTTP client error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
