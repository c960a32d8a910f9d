//! HTTP JSON token resolver: `source` is a URL template containing a single
//! `%s` (or, if it contains none, the token is appended as a path segment);
//! the response body is decoded as `{"host": ..., "port": ...}`.

use super::{TargetDescriptor, TokenResolver};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    host: String,
    port: u16,
}

pub struct HttpJsonTokenResolver {
    client: reqwest::Client,
    url_template: String,
}

impl HttpJsonTokenResolver {
    pub fn new(source: impl Into<String>) -> Self {
        HttpJsonTokenResolver {
            client: reqwest::Client::new(),
            url_template: source.into(),
        }
    }

    fn build_url(&self, token: &str) -> String {
        if self.url_template.contains("%s") {
            self.url_template.replacen("%s", token, 1)
        } else {
            format!("{}/{}", self.url_template.trim_end_matches('/'), token)
        }
    }
}

#[async_trait]
impl TokenResolver for HttpJsonTokenResolver {
    async fn lookup(&self, token: &str) -> Option<TargetDescriptor> {
        let url = self.build_url(token);
        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("token lookup request to {url} failed: {e}");
                return None;
            }
        };
        if !response.status().is_success() {
            log::warn!("token lookup {url} returned {}", response.status());
            return None;
        }
        match response.json::<TokenResponse>().await {
            Ok(parsed) => Some(TargetDescriptor::Tcp {
                host: parsed.host,
                port: parsed.port,
                tls: false,
            }),
            Err(e) => {
                log::warn!("malformed token lookup response from {url}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url_from_placeholder_template() {
        let resolver = HttpJsonTokenResolver::new("https://api.example/tokens/%s/resolve");
        assert_eq!(
            resolver.build_url("abc123"),
            "https://api.example/tokens/abc123/resolve"
        );
    }

    #[test]
    fn appends_token_when_no_placeholder() {
        let resolver = HttpJsonTokenResolver::new("https://api.example/tokens");
        assert_eq!(resolver.build_url("abc123"), "https://api.example/tokens/abc123");
    }
}
