//! UNIX socket directory resolver: `source` names a directory, the token is
//! a filename within it (no `..`/`/` allowed), and a match only resolves if
//! the entry exists and is actually a UNIX domain socket.

use super::{TargetDescriptor, TokenResolver};
use async_trait::async_trait;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

pub struct UnixSocketDirectoryResolver {
    directory: PathBuf,
}

impl UnixSocketDirectoryResolver {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        UnixSocketDirectoryResolver {
            directory: source.into(),
        }
    }
}

#[async_trait]
impl TokenResolver for UnixSocketDirectoryResolver {
    async fn lookup(&self, token: &str) -> Option<TargetDescriptor> {
        if token.is_empty() || token.contains('/') || token.contains("..") {
            log::warn!("rejecting token with path separators: {token}");
            return None;
        }

        let candidate = self.directory.join(token);
        let metadata = tokio::fs::metadata(&candidate).await.ok()?;
        if !metadata.file_type().is_socket() {
            log::warn!("{} is not a unix socket", candidate.display());
            return None;
        }

        Some(TargetDescriptor::Unix { path: candidate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_traversal_attempts() {
        let resolver = UnixSocketDirectoryResolver::new("/tmp/sockets");
        assert_eq!(resolver.lookup("../etc/passwd").await, None);
        assert_eq!(resolver.lookup("a/b").await, None);
        assert_eq!(resolver.lookup("").await, None);
    }

    #[tokio::test]
    async fn rejects_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = UnixSocketDirectoryResolver::new(dir.path());
        assert_eq!(resolver.lookup("nonexistent").await, None);
    }
}
