//! JWT token resolver: the token carries `host`/`port` claims plus optional
//! `nbf`/`exp`, checked unconditionally against wall-clock time whenever
//! present.
//!
//! `jsonwebtoken` only verifies JWS (signed) tokens, not JWE (encrypted)
//! ones. A JWE token (it fails to parse as a JWS) is logged and rejected
//! rather than silently mishandled.

use super::{TargetDescriptor, TokenResolver};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
struct Claims {
    host: String,
    port: u16,
    nbf: Option<i64>,
    exp: Option<i64>,
}

pub struct JwtTokenResolver {
    key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtTokenResolver {
    /// `source` is a path to a PEM public key (RS256/ES256) or a raw secret
    /// file treated as an HMAC (HS256) key: PEM is detected first, with a
    /// fall back to treating the bytes as an HMAC secret.
    pub fn from_key_file(source: &str) -> Result<Self, crate::error::Error> {
        let key_data = std::fs::read(source)
            .map_err(|e| crate::error::Error::Config(format!("failed to read JWT key file: {e}")))?;

        if key_data.starts_with(b"-----BEGIN") {
            let key = DecodingKey::from_rsa_pem(&key_data)
                .map_err(|e| crate::error::Error::Config(format!("invalid PEM key: {e}")))?;
            Ok(JwtTokenResolver {
                key,
                algorithm: Algorithm::RS256,
            })
        } else {
            Ok(JwtTokenResolver {
                key: DecodingKey::from_secret(&key_data),
                algorithm: Algorithm::HS256,
            })
        }
    }
}

#[async_trait]
impl TokenResolver for JwtTokenResolver {
    async fn lookup(&self, token: &str) -> Option<TargetDescriptor> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();

        let data = match jsonwebtoken::decode::<Claims>(token, &self.key, &validation) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("failed to parse token: {e}");
                return None;
            }
        };
        let claims = data.claims;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Some(nbf) = claims.nbf {
            if now < nbf {
                log::warn!("token can not be used yet");
                return None;
            }
        }
        if let Some(exp) = claims.exp {
            if now > exp {
                log::warn!("token has expired");
                return None;
            }
        }

        Some(TargetDescriptor::Tcp {
            host: claims.host,
            port: claims.port,
            tls: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use std::io::Write;

    #[derive(Serialize)]
    struct TestClaims {
        host: String,
        port: u16,
        nbf: i64,
        exp: i64,
    }

    fn make_token(secret: &[u8], nbf: i64, exp: i64) -> String {
        let claims = TestClaims {
            host: "backend.local".to_string(),
            port: 5901,
            nbf,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    async fn resolver_with_secret(secret: &[u8]) -> JwtTokenResolver {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(secret).unwrap();
        JwtTokenResolver::from_key_file(file.path().to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn enforces_nbf_and_exp() {
        let secret = b"test-secret";
        let resolver = resolver_with_secret(secret).await;

        let not_yet = make_token(secret, 200, 300);
        assert!(resolver.lookup(&not_yet).await.is_none());

        let expired = make_token(secret, 0, 10);
        assert!(resolver.lookup(&expired).await.is_none());

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let valid = make_token(secret, now - 100, now + 100);
        assert_eq!(
            resolver.lookup(&valid).await,
            Some(TargetDescriptor::Tcp {
                host: "backend.local".to_string(),
                port: 5901,
                tls: false,
            })
        );
    }
}
