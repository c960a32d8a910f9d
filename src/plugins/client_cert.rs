//! Client certificate CN auth: validates the peer's TLS client certificate
//! common name against an allow-list. The broker (`crate::broker`) copies
//! the CN extracted during the TLS handshake into the request's header map
//! under `x-ssl-client-cn` before authentication runs, since there's no CGI
//! environment to read it from here.

use super::{AuthValidator, AuthenticationError};
use async_trait::async_trait;
use std::collections::HashMap;

pub struct ClientCertCnAuth {
    allowed: Vec<String>,
}

impl ClientCertCnAuth {
    pub fn new(source: &str) -> Self {
        ClientCertCnAuth {
            allowed: source.split(',').map(|s| s.trim().to_string()).collect(),
        }
    }
}

#[async_trait]
impl AuthValidator for ClientCertCnAuth {
    async fn authenticate(
        &self,
        headers: &HashMap<String, String>,
        _target_host: &str,
        _target_port: u16,
    ) -> Result<(), AuthenticationError> {
        let cn = headers.get("x-ssl-client-cn");
        let matches = cn.map(|cn| self.allowed.iter().any(|a| a == cn)).unwrap_or(false);

        if matches {
            Ok(())
        } else {
            Err(AuthenticationError::new(
                403,
                format!("client certificate CN {cn:?} not in allow-list"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cn(cn: &str) -> HashMap<String, String> {
        let mut h = HashMap::new();
        h.insert("x-ssl-client-cn".to_string(), cn.to_string());
        h
    }

    #[tokio::test]
    async fn accepts_allowed_cn() {
        let auth = ClientCertCnAuth::new("alice,bob");
        let headers = headers_with_cn("bob");
        assert!(auth.authenticate(&headers, "host", 1).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_missing_or_unlisted_cn() {
        let auth = ClientCertCnAuth::new("alice");
        assert!(auth.authenticate(&HashMap::new(), "host", 1).await.is_err());
        assert!(auth.authenticate(&headers_with_cn("eve"), "host", 1).await.is_err());
    }
}
