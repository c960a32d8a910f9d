//! Plugin contracts: the narrow interfaces the broker (`crate::broker`) and
//! upgrade handler (`crate::http`) call into. Each trait is an explicit
//! capability interface, so token resolution, origin checks and
//! authentication can be swapped independently.
//!
//! Constructors for the implementations below take just the plugin's
//! configuration string (`source`).

mod basic_auth;
mod client_cert;
mod htpasswd;
mod origin;
mod token_file;
mod token_http;
mod token_jwt;
mod token_redis;
mod token_unix_dir;

pub use basic_auth::BasicHttpAuth;
pub use client_cert::ClientCertCnAuth;
pub use htpasswd::HtpasswdAuth;
pub use origin::AllowListOrigin;
pub use token_file::TokenFileResolver;
pub use token_http::HttpJsonTokenResolver;
pub use token_jwt::JwtTokenResolver;
pub use token_redis::RedisTokenResolver;
pub use token_unix_dir::UnixSocketDirectoryResolver;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Resolved backend address. Produced by a [`TokenResolver`] from the
/// WebSocket URL's `token` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDescriptor {
    Tcp { host: String, port: u16, tls: bool },
    Unix { path: PathBuf },
}

/// `lookup(token) -> Option<TargetDescriptor>`. May perform I/O (file read,
/// HTTP GET, Redis GET) but must be safe to call concurrently from many
/// connections; any per-lookup caching is the implementor's responsibility
/// to synchronize internally.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn lookup(&self, token: &str) -> Option<TargetDescriptor>;
}

/// Carries the HTTP status and extra response headers an [`AuthValidator`]
/// or [`OriginValidator`] wants surfaced — pre-upgrade as the literal HTTP
/// response, post-upgrade collapsed to a WebSocket CLOSE 1008.
#[derive(Debug, Clone)]
pub struct AuthenticationError {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub message: String,
}

impl AuthenticationError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        AuthenticationError {
            status,
            headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for AuthenticationError {}

/// Distinct diagnostic subtype for origin rejection, kept separate from
/// [`AuthenticationError`] so callers can tell the two rejection causes apart.
#[derive(Debug, Clone)]
pub struct InvalidOriginError {
    pub expected: Vec<String>,
    pub actual: Option<String>,
}

impl fmt::Display for InvalidOriginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid Origin Header: expected one of {:?}, got {:?}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for InvalidOriginError {}

impl From<InvalidOriginError> for AuthenticationError {
    fn from(e: InvalidOriginError) -> Self {
        AuthenticationError::new(403, e.to_string())
    }
}

/// `authenticate(headers, target_host, target_port) -> Result<(), AuthenticationError>`.
#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn authenticate(
        &self,
        headers: &HashMap<String, String>,
        target_host: &str,
        target_port: u16,
    ) -> Result<(), AuthenticationError>;
}

/// Same shape as [`AuthValidator`], kept distinct so origin rejection can
/// report [`InvalidOriginError`] instead of a generic auth failure.
#[async_trait]
pub trait OriginValidator: Send + Sync {
    async fn validate(&self, origin: Option<&str>) -> Result<(), InvalidOriginError>;
}

/// What an interceptor wants done with one direction's payload: forward it
/// (possibly rewritten), drop it, and/or inject extra bytes toward either
/// peer (e.g. to transparently answer a target-side auth challenge).
#[derive(Debug, Clone, Default)]
pub struct InterceptOutput {
    pub forward: Option<Vec<u8>>,
    pub inject_to_client: Option<Vec<u8>>,
    pub inject_to_target: Option<Vec<u8>>,
}

impl InterceptOutput {
    pub fn passthrough(bytes: Vec<u8>) -> Self {
        InterceptOutput {
            forward: Some(bytes),
            ..Default::default()
        }
    }

    pub fn drop() -> Self {
        InterceptOutput::default()
    }
}

/// Optional per-connection middleman that may rewrite, drop or inject bytes
/// on either pumping direction.
#[async_trait]
pub trait TrafficInterceptor: Send + Sync {
    async fn from_client(&self, bytes: Vec<u8>) -> InterceptOutput;
    async fn from_target(&self, bytes: Vec<u8>) -> InterceptOutput;
}
