//! HTTP/1.1 upgrade handshake: an explicit, growable-buffer request parser
//! (no line-based blocking reader, no external HTTP parser crate — a
//! hand-rolled state machine that never blocks past the header size cap),
//! classification into upgrade/static-file/405, and the 101 response /
//! static file writers.
//!
//! Request parsing follows the read-until-CRLFCRLF shape and the GUID-based
//! Sec-WebSocket-Accept computation from RFC 6455; static serving semantics
//! (`only_upgrade`, directory-listing suppression) are configurable per
//! [`crate::config::StaticServeConfig`].

use crate::error::Error;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEADER_BYTES: usize = 8 * 1024;
const DELIMITER: &[u8] = b"\r\n\r\n";
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub protocols: Vec<String>,
    /// Passed through from the TLS layer, if a client certificate was
    /// presented; not populated by the HTTP parser itself.
    pub ssl_client_cn: Option<String>,
}

impl UpgradeRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn is_upgrade_request(&self) -> bool {
        let has_upgrade = self
            .header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let has_connection = self
            .header("connection")
            .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);
        has_upgrade && has_connection
    }
}

/// Reads raw bytes from `transport` into `buf` until a blank line terminates
/// the header block or the size cap is hit, then parses the request line and
/// headers. Returns the parsed request plus any bytes read past the header
/// block (the start of the WebSocket frame stream, if pipelined).
pub async fn read_request<T: AsyncRead + Unpin>(
    transport: &mut T,
) -> Result<(UpgradeRequest, BytesMut), Error> {
    let mut buf = BytesMut::with_capacity(4096);
    let header_end = loop {
        if let Some(pos) = find_subslice(&buf, DELIMITER) {
            break pos;
        }
        if buf.len() >= MAX_HEADER_BYTES {
            return Err(Error::HttpRequestTooLarge);
        }
        let mut chunk = [0u8; 2048];
        let n = transport.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::MalformedHttpRequest(
                "connection closed before headers completed".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let header_bytes = buf.split_to(header_end + DELIMITER.len());
    let leftover = buf;
    let header_text = String::from_utf8_lossy(&header_bytes[..header_end]).into_owned();

    let request = parse_headers(&header_text)?;
    Ok((request, leftover))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_headers(header_text: &str) -> Result<UpgradeRequest, Error> {
    let mut lines = header_text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| Error::MalformedHttpRequest("empty request".to_string()))?;

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::MalformedHttpRequest("missing HTTP method".to_string()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| Error::MalformedHttpRequest("missing request target".to_string()))?
        .to_string();
    let version = parts
        .next()
        .ok_or_else(|| Error::MalformedHttpRequest("missing HTTP version".to_string()))?
        .to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::MalformedHttpRequest(format!("malformed header line: {line}")));
        };
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let protocols = headers
        .get("sec-websocket-protocol")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    Ok(UpgradeRequest {
        method,
        target,
        version,
        headers,
        protocols,
        ssl_client_cn: None,
    })
}

/// `base64(SHA1(key || GUID))`, the RFC 6455 accept-key computation.
pub fn sec_websocket_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Picks the first subprotocol the client offered that the server also
/// allows, in the server's preference order. The default policy (server
/// allows only `"binary"`) falls out of `ServerConfig::default`.
pub fn select_subprotocol(offered: &[String], allowed: &[String]) -> Option<String> {
    allowed
        .iter()
        .find(|candidate| offered.iter().any(|o| o.eq_ignore_ascii_case(candidate)))
        .cloned()
}

pub fn build_101_response(accept: &str, subprotocol: Option<&str>) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Server: WebSockify\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n"
    );
    if let Some(proto) = subprotocol {
        response.push_str(&format!("Sec-WebSocket-Protocol: {proto}\r\n"));
    }
    response.push_str("\r\n");
    response.into_bytes()
}

pub fn build_error_response(status: u16, reason: &str, extra_headers: &[(String, String)]) -> Vec<u8> {
    let status_text = status_text(status);
    let mut response = format!(
        "HTTP/1.1 {status} {status_text}\r\n\
         Server: WebSockify\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n",
        reason.len()
    );
    for (k, v) in extra_headers {
        response.push_str(&format!("{k}: {v}\r\n"));
    }
    response.push_str("Connection: close\r\n\r\n");
    response.push_str(reason);
    response.into_bytes()
}

/// Minimal `SimpleHTTPRequestHandler`-style directory listing: an HTML page
/// linking each entry, sorted by name.
async fn directory_listing(dir: &Path, requested: &str) -> Result<String, Error> {
    let mut names = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let title = html_escape(requested);
    let mut body = format!("<html><head><title>Directory listing for {title}</title></head><body>\n");
    body.push_str(&format!("<h1>Directory listing for {title}</h1>\n<hr>\n<ul>\n"));
    for name in &names {
        let escaped = html_escape(name);
        body.push_str(&format!("<li><a href=\"{escaped}\">{escaped}</a></li>\n"));
    }
    body.push_str("</ul>\n<hr>\n</body></html>\n");
    Ok(body)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

/// Resolves `target_path` under `web_root`, rejecting any path that would
/// escape it, and streams the file back with a minimal response. `file_only`
/// suppresses directory listings (serves 404 for a directory instead).
pub async fn serve_static<T: AsyncWrite + Unpin>(
    transport: &mut T,
    web_root: &Path,
    target_path: &str,
    file_only: bool,
) -> Result<(), Error> {
    let requested = target_path.split('?').next().unwrap_or("/");
    let relative = requested.trim_start_matches('/');

    let root = tokio::fs::canonicalize(web_root).await.map_err(|e| {
        Error::Config(format!("web root {} is not accessible: {e}", web_root.display()))
    })?;
    let candidate: PathBuf = root.join(relative);

    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(p) => p,
        Err(_) => {
            transport
                .write_all(&build_error_response(404, "Not Found", &[]))
                .await?;
            return Ok(());
        }
    };

    if !resolved.starts_with(&root) {
        transport
            .write_all(&build_error_response(403, "Forbidden", &[]))
            .await?;
        return Ok(());
    }

    let metadata = tokio::fs::metadata(&resolved).await?;
    if metadata.is_dir() {
        if file_only {
            transport
                .write_all(&build_error_response(404, "Not Found", &[]))
                .await?;
            return Ok(());
        }
        let listing = directory_listing(&resolved, requested).await?;
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nServer: WebSockify\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            listing.len()
        )
        .into_bytes();
        response.extend_from_slice(listing.as_bytes());
        transport.write_all(&response).await?;
        return Ok(());
    }

    let body = tokio::fs::read(&resolved).await?;
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nServer: WebSockify\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(&body);
    transport.write_all(&response).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_reference_vector() {
        assert_eq!(
            sec_websocket_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn parses_upgrade_request() {
        let text = "GET /websockify?token=abc HTTP/1.1\r\n\
                     Host: example.com\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                     Sec-WebSocket-Version: 13\r\n\
                     Sec-WebSocket-Protocol: binary, base64\r\n";
        let req = parse_headers(text).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/websockify?token=abc");
        assert!(req.is_upgrade_request());
        assert_eq!(req.header("sec-websocket-version"), Some("13"));
        assert_eq!(req.protocols, vec!["binary".to_string(), "base64".to_string()]);
    }

    #[test]
    fn subprotocol_prefers_binary() {
        let offered = vec!["base64".to_string(), "binary".to_string()];
        let allowed = vec!["binary".to_string()];
        assert_eq!(select_subprotocol(&offered, &allowed), Some("binary".to_string()));
        assert_eq!(select_subprotocol(&["base64".to_string()], &allowed), None);
    }

    #[tokio::test]
    async fn reads_request_with_trailing_pipelined_bytes() {
        let body = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nEXTRA";
        let mut cursor = std::io::Cursor::new(body.to_vec());
        let (req, leftover) = read_request(&mut cursor).await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(&leftover[..], b"EXTRA");
    }
}
