//! Token file resolver: one `watch` flag selects whether the file is
//! reloaded on every lookup or parsed once at construction, rather than
//! exposing that as two separate types.

use super::{TargetDescriptor, TokenResolver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub struct TokenFileResolver {
    source: PathBuf,
    watch: bool,
    targets: RwLock<Option<HashMap<String, TargetDescriptor>>>,
}

impl TokenFileResolver {
    /// `watch = true` reparses `source` on every lookup (matches the
    /// original `TokenFile`); `watch = false` parses once and caches
    /// (matches `ReadOnlyTokenFile`).
    pub fn new(source: impl Into<PathBuf>, watch: bool) -> Self {
        TokenFileResolver {
            source: source.into(),
            watch,
            targets: RwLock::new(None),
        }
    }

    async fn load(&self) -> HashMap<String, TargetDescriptor> {
        let mut files = Vec::new();
        if let Ok(metadata) = tokio::fs::metadata(&self.source).await {
            if metadata.is_dir() {
                if let Ok(mut entries) = tokio::fs::read_dir(&self.source).await {
                    while let Ok(Some(entry)) = entries.next_entry().await {
                        files.push(entry.path());
                    }
                }
            } else {
                files.push(self.source.clone());
            }
        }

        let mut targets = HashMap::new();
        for file in files {
            if let Ok(contents) = tokio::fs::read_to_string(&file).await {
                parse_into(&file, &contents, &mut targets);
            }
        }
        targets
    }

    async fn targets(&self) -> HashMap<String, TargetDescriptor> {
        if self.watch {
            return self.load().await;
        }
        {
            let guard = self.targets.read().await;
            if let Some(targets) = guard.as_ref() {
                return targets.clone();
            }
        }
        let loaded = self.load().await;
        *self.targets.write().await = Some(loaded.clone());
        loaded
    }
}

fn parse_into(file: &Path, contents: &str, out: &mut HashMap<String, TargetDescriptor>) {
    for (lineno, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some((token, target)) => {
                out.insert(token, target);
            }
            None => {
                log::warn!(
                    "syntax error in {} on line {}",
                    file.display(),
                    lineno + 1
                );
            }
        }
    }
}

fn parse_line(line: &str) -> Option<(String, TargetDescriptor)> {
    let (token, rest) = line.split_once(':')?;
    let token = token.trim().to_string();
    let rest = rest.trim();
    if rest == "unix_socket" {
        return None;
    }
    if let Some((kind, path)) = rest.split_once(':') {
        if kind.trim() == "unix_socket" {
            return Some((
                token,
                TargetDescriptor::Unix {
                    path: PathBuf::from(path.trim()),
                },
            ));
        }
    }
    let (host, port) = rest.rsplit_once(':')?;
    let port: u16 = port.trim().parse().ok()?;
    Some((
        token,
        TargetDescriptor::Tcp {
            host: host.trim().to_string(),
            port,
            tls: false,
        },
    ))
}

#[async_trait]
impl TokenResolver for TokenFileResolver {
    async fn lookup(&self, token: &str) -> Option<TargetDescriptor> {
        self.targets().await.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn resolves_known_token_and_rejects_unknown() {
        let mut file = tempfile_with_contents("tok1: host.example:5901\n# comment\n\nbad_line\n");
        file.flush().unwrap();
        let resolver = TokenFileResolver::new(file.path(), false);

        assert_eq!(
            resolver.lookup("tok1").await,
            Some(TargetDescriptor::Tcp {
                host: "host.example".to_string(),
                port: 5901,
                tls: false,
            })
        );
        assert_eq!(resolver.lookup("other").await, None);
    }

    fn tempfile_with_contents(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
