//! Redis token resolver: `source` is `host[:port[:db[:password[:namespace]]]]`;
//! the token itself is the key (prefixed with `namespace:` when one is
//! configured), and the stored value is either a literal `"host:port"`
//! string or a JSON object `{"host": "host:port"}` — in both cases a single
//! combined field, split on its last `:`.

use super::{TargetDescriptor, TokenResolver};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenValue {
    host: String,
}

pub struct RedisTokenResolver {
    client: redis::Client,
    db: i64,
    namespace: Option<String>,
}

impl RedisTokenResolver {
    pub fn new(source: &str) -> Result<Self, crate::error::Error> {
        let mut parts = source.split(':');
        let host = parts.next().unwrap_or("localhost").to_string();
        let port: u16 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(6379);
        let db: i64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let password = parts.next().filter(|p| !p.is_empty());
        let namespace = parts.next().filter(|p| !p.is_empty()).map(str::to_string);

        let url = match password {
            Some(pw) => format!("redis://:{pw}@{host}:{port}/{db}"),
            None => format!("redis://{host}:{port}/{db}"),
        };
        let client = redis::Client::open(url)
            .map_err(|e| crate::error::Error::Config(format!("invalid redis source {source}: {e}")))?;

        Ok(RedisTokenResolver { client, db, namespace })
    }

    fn key_for(&self, token: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{token}"),
            None => token.to_string(),
        }
    }
}

fn parse_value(raw: &str) -> Option<TargetDescriptor> {
    let combo = match serde_json::from_str::<TokenValue>(raw) {
        Ok(parsed) => parsed.host,
        Err(_) => raw.to_string(),
    };
    let (host, port) = combo.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some(TargetDescriptor::Tcp {
        host: host.to_string(),
        port,
        tls: false,
    })
}

#[async_trait]
impl TokenResolver for RedisTokenResolver {
    async fn lookup(&self, token: &str) -> Option<TargetDescriptor> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("failed to connect to redis (db {}): {e}", self.db);
                return None;
            }
        };
        let key = self.key_for(token);
        let raw: Option<String> = match conn.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("redis GET {key} failed: {e}");
                return None;
            }
        };
        raw.and_then(|v| parse_value(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_host_port_value() {
        assert_eq!(
            parse_value("backend.local:5901"),
            Some(TargetDescriptor::Tcp {
                host: "backend.local".to_string(),
                port: 5901,
                tls: false,
            })
        );
    }

    #[test]
    fn parses_json_value() {
        assert_eq!(
            parse_value(r#"{"host":"backend.local:5901"}"#),
            Some(TargetDescriptor::Tcp {
                host: "backend.local".to_string(),
                port: 5901,
                tls: false,
            })
        );
    }

    #[test]
    fn key_uses_namespace_prefix() {
        let resolver = RedisTokenResolver::new("localhost:6379:0::rooms").unwrap();
        assert_eq!(resolver.key_for("abc"), "rooms:abc");
    }
}
