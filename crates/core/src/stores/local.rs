use crate::error::StoreError;
use crate::traits::BlobStore;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Blobs stored as plain files below `root`, keyed by relative path.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let location = self.resolve(path)?;
        match tokio::fs::read(&location).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::MissingObject(path.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let location = self.resolve(path)?;
        if let Some(parent) = location.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&location, bytes).await?;
        Ok(())
    }
}
