use crate::group::{CacheError, Loader};
use async_trait::async_trait;
use std::path::PathBuf;

/// Canonical source backed by a directory: the bytes for `key` are the
/// contents of `{root}/{key}`.
pub struct DirLoader {
    root: PathBuf,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Loader for DirLoader {
    async fn load(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        // Keys are plain file names; refuse anything that could escape the root.
        if key.contains("..") || key.starts_with('/') {
            return Err(CacheError::Loader(format!("invalid key: {key:?}")));
        }

        tokio::fs::read(self.root.join(key))
            .await
            .map_err(|e| CacheError::Loader(format!("reading {key:?}: {e}")))
    }
}
