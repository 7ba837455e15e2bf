//! Rule files on the local filesystem

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::{FileTransport, StorageError, UploadOutcome};

/// Serves rule files from a root directory
///
/// Paths are relative to the root; absolute paths and `..` are refused.
/// Uploads write a temporary sibling file and rename it over the target.
#[derive(Debug, Clone)]
pub struct FsTransport {
    root: PathBuf,
}

impl FsTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if path.is_empty() || !is_plain {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileTransport for FsTransport {
    async fn read_file(&self, path: &str) -> Result<String, StorageError> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("File {} not found", path)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<UploadOutcome, StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = full.with_extension("upload");
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &full).await?;
        tracing::debug!("Wrote {} bytes to {}", content.len(), full.display());
        Ok(UploadOutcome::from_response(path, &format!("OK|{}", path)))
    }
}
