//! htpasswd file auth: supports the two schemes that cover modern
//! `htpasswd -B` (bcrypt) and the legacy `{SHA}` Apache scheme; `crypt`/
//! APR1-MD5 entries are rejected with a warning rather than silently
//! treated as a match.

use super::{AuthValidator, AuthenticationError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::PathBuf;

pub struct HtpasswdAuth {
    path: PathBuf,
}

impl HtpasswdAuth {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        HtpasswdAuth { path: source.into() }
    }

    async fn verify(&self, user: &str, password: &str) -> bool {
        let Ok(contents) = tokio::fs::read_to_string(&self.path).await else {
            log::warn!("could not read htpasswd file {}", self.path.display());
            return false;
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((entry_user, hash)) = line.split_once(':') else {
                continue;
            };
            if entry_user != user {
                continue;
            }
            return verify_hash(hash, password);
        }
        false
    }
}

fn verify_hash(hash: &str, password: &str) -> bool {
    if let Some(legacy_sha) = hash.strip_prefix("{SHA}") {
        let mut hasher = Sha1::new();
        hasher.update(password.as_bytes());
        return BASE64.encode(hasher.finalize()) == legacy_sha;
    }
    if hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$") {
        return bcrypt::verify(password, hash).unwrap_or(false);
    }
    log::warn!("unsupported htpasswd hash scheme, rejecting: {hash}");
    false
}

#[async_trait]
impl AuthValidator for HtpasswdAuth {
    async fn authenticate(
        &self,
        headers: &HashMap<String, String>,
        _target_host: &str,
        _target_port: u16,
    ) -> Result<(), AuthenticationError> {
        let auth_error = || AuthenticationError::new(403, "Forbidden");
        let demand_auth = || {
            AuthenticationError::new(401, "Unauthorized")
                .with_header("WWW-Authenticate", "Basic realm=\"Websockify\"")
        };

        let Some(value) = headers.get("authorization") else {
            return Err(demand_auth());
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return Err(auth_error());
        };
        let decoded = BASE64.decode(encoded.trim()).map_err(|_| auth_error())?;
        let credentials = String::from_utf8(decoded).map_err(|_| auth_error())?;
        let Some((user, password)) = credentials.split_once(':') else {
            return Err(auth_error());
        };

        if self.verify(user, password).await {
            Ok(())
        } else {
            Err(demand_auth())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_legacy_sha_scheme() {
        let mut hasher = Sha1::new();
        hasher.update(b"secret");
        let encoded = BASE64.encode(hasher.finalize());
        let hash = format!("{{SHA}}{encoded}");
        assert!(verify_hash(&hash, "secret"));
        assert!(!verify_hash(&hash, "wrong"));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(!verify_hash("$1$abcd$whatever", "secret"));
    }

    #[tokio::test]
    async fn reads_matching_user_from_file() {
        let mut hasher = Sha1::new();
        hasher.update(b"secret");
        let encoded = BASE64.encode(hasher.finalize());
        let contents = format!("alice:{{SHA}}{encoded}\n# comment\nbob:{{SHA}}notreal\n");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("htpasswd");
        tokio::fs::write(&path, contents).await.unwrap();

        let auth = HtpasswdAuth::new(&path);
        assert!(auth.verify("alice", "secret").await);
        assert!(!auth.verify("alice", "wrong").await);
        assert!(!auth.verify("carol", "secret").await);
    }

    #[tokio::test]
    async fn missing_header_gets_401_challenge_malformed_gets_403() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("htpasswd");
        tokio::fs::write(&path, "").await.unwrap();
        let auth = HtpasswdAuth::new(&path);

        let err = auth
            .authenticate(&HashMap::new(), "host", 1)
            .await
            .unwrap_err();
        assert_eq!(err.status, 401);

        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer xyz".to_string());
        let err = auth.authenticate(&headers, "host", 1).await.unwrap_err();
        assert_eq!(err.status, 403);
    }
}
