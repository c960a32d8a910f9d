//! Per-connection traffic recording: every frame pumped in either direction
//! is appended to a file as a JS source fragment so a replay tool can load
//! it directly with a `<script>` tag.

use crate::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub struct Recorder {
    file: File,
    started_at_ms: u128,
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Direction a frame travels, as recorded: `ToClient` entries are wrapped in
/// `{...{`, `FromClient` entries in `}...}`, matching the two brace styles a
/// replay tool distinguishes sends from receives by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToClient,
    FromClient,
}

impl Recorder {
    pub async fn create(directory: &Path, connection_id: &str) -> Result<Self, Error> {
        tokio::fs::create_dir_all(directory).await?;
        let path: PathBuf = directory.join(format!("{connection_id}.{}", now_ms() / 1000));

        let mut file = File::create(&path).await?;
        file.write_all(b"var VNC_frame_data = [\n").await?;

        Ok(Recorder {
            file,
            started_at_ms: now_ms(),
        })
    }

    pub async fn record(&mut self, direction: Direction, payload: &[u8]) -> Result<(), Error> {
        let tdelta = now_ms().saturating_sub(self.started_at_ms);
        let brace = match direction {
            Direction::ToClient => '{',
            Direction::FromClient => '}',
        };
        let escaped = escape_payload(payload);
        let line = format!("'{brace}{tdelta}{brace}{escaped}',\n");
        self.file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), Error> {
        self.file.write_all(b"'EOF'];\n").await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// Mirrors Python's `repr()` escaping of a byte string: printable ASCII
/// passes through, `\`/`'`/`\n`/`\r` get their short escapes, everything
/// else becomes `\xHH`.
fn escape_payload(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len());
    for &b in payload {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_frame_as_js_array_literal() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::create(dir.path(), "conn-1").await.unwrap();
        recorder.record(Direction::FromClient, b"hi").await.unwrap();
        recorder.close().await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        let contents = tokio::fs::read_to_string(entry.path()).await.unwrap();
        assert!(contents.starts_with("var VNC_frame_data = [\n"));
        assert!(contents.contains("}hi',"));
        assert!(contents.trim_end().ends_with("'EOF'];"));
    }

    #[test]
    fn escapes_non_printable_bytes() {
        assert_eq!(escape_payload(b"\x01\x02AB"), "\\x01\\x02AB");
        assert_eq!(escape_payload(b"it's\\"), "it\\'s\\\\");
    }
}
