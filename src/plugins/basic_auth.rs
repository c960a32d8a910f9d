//! Plain HTTP Basic auth: `source` is a literal `"user:pass"` string,
//! checked against the `Authorization: Basic <base64>` request header.

use super::{AuthValidator, AuthenticationError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;

pub struct BasicHttpAuth {
    expected: String,
}

impl BasicHttpAuth {
    pub fn new(source: impl Into<String>) -> Self {
        BasicHttpAuth { expected: source.into() }
    }

    /// A malformed `Authorization` header (wrong scheme, bad base64, no
    /// `:` separator) is a plain 403 with no challenge.
    fn auth_error(&self) -> AuthenticationError {
        AuthenticationError::new(403, "Forbidden")
    }

    /// A missing header, or a well-formed one whose credentials don't
    /// match, gets the 401 challenge so a browser will prompt for
    /// credentials.
    fn demand_auth(&self) -> AuthenticationError {
        AuthenticationError::new(401, "Unauthorized")
            .with_header("WWW-Authenticate", "Basic realm=\"Websockify\"")
    }

    fn validate_creds(&self, user_pass: &str) -> bool {
        user_pass == self.expected
    }
}

#[async_trait]
impl AuthValidator for BasicHttpAuth {
    async fn authenticate(
        &self,
        headers: &HashMap<String, String>,
        _target_host: &str,
        _target_port: u16,
    ) -> Result<(), AuthenticationError> {
        let Some(value) = headers.get("authorization") else {
            return Err(self.demand_auth());
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return Err(self.auth_error());
        };
        let decoded = BASE64.decode(encoded.trim()).map_err(|_| self.auth_error())?;
        let user_pass = String::from_utf8(decoded).map_err(|_| self.auth_error())?;
        if user_pass.splitn(2, ':').count() != 2 {
            return Err(self.auth_error());
        }

        if self.validate_creds(&user_pass) {
            Ok(())
        } else {
            Err(self.demand_auth())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_auth(value: &str) -> HashMap<String, String> {
        let mut h = HashMap::new();
        h.insert("authorization".to_string(), value.to_string());
        h
    }

    #[tokio::test]
    async fn accepts_matching_credentials() {
        let auth = BasicHttpAuth::new("admin:secret");
        let encoded = BASE64.encode("admin:secret");
        let headers = headers_with_auth(&format!("Basic {encoded}"));
        assert!(auth.authenticate(&headers, "host", 1).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let auth = BasicHttpAuth::new("admin:secret");
        let headers = HashMap::new();
        let err = auth.authenticate(&headers, "host", 1).await.unwrap_err();
        assert_eq!(err.status, 401);
    }

    #[tokio::test]
    async fn rejects_wrong_credentials_with_challenge() {
        let auth = BasicHttpAuth::new("admin:secret");
        let encoded = BASE64.encode("admin:wrong");
        let headers = headers_with_auth(&format!("Basic {encoded}"));
        let err = auth.authenticate(&headers, "host", 1).await.unwrap_err();
        assert_eq!(err.status, 401);
    }

    #[tokio::test]
    async fn rejects_non_basic_scheme_without_challenge() {
        let auth = BasicHttpAuth::new("admin:secret");
        let headers = headers_with_auth("Bearer sometoken");
        let err = auth.authenticate(&headers, "host", 1).await.unwrap_err();
        assert_eq!(err.status, 403);
        assert!(err.headers.is_empty());
    }

    #[tokio::test]
    async fn rejects_malformed_base64_without_challenge() {
        let auth = BasicHttpAuth::new("admin:secret");
        let headers = headers_with_auth("Basic not-valid-base64!!");
        let err = auth.authenticate(&headers, "host", 1).await.unwrap_err();
        assert_eq!(err.status, 403);
    }
}
