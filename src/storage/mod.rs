// Uploaded file bytes, addressed by opaque locators


use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{RagError, Result};

/// Prefix of every locator issued by [`LocalStorage`]
pub const LOCAL_PREFIX: &str = "local:";

/// Size of the pieces yielded by [`FileStorage::stream`]
pub const STREAM_CHUNK_SIZE: usize = 8192;

pub type ByteStream = BoxStream<'static, io::Result<Vec<u8>>>;

/// Durable storage for raw upload bytes
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `bytes` under `name` and return the locator to fetch them with
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<String>;

    async fn exists(&self, locator: &str) -> Result<bool>;

    async fn read(&self, locator: &str) -> Result<Vec<u8>>;

    /// Stream the stored bytes in [`STREAM_CHUNK_SIZE`] pieces
    async fn stream(&self, locator: &str) -> Result<ByteStream>;

    /// Remove the stored bytes; `false` if nothing was there
    async fn delete(&self, locator: &str) -> Result<bool>;
}

/// Files on the local disk under one root directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a locator issued by this storage
    #[inline]
    pub fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = locator.strip_prefix(LOCAL_PREFIX).ok_or_else(|| {
            RagError::Storage(format!("Locator {:?} is not a local locator", locator))
        })?;
        Ok(self.root.join(checked_relative_path(relative)?))
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let relative = checked_relative_path(name)?;
        let path = self.root.join(&relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RagError::Storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        tokio::fs::write(&path, bytes).await.map_err(|e| {
            RagError::Storage(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("{}{}", LOCAL_PREFIX, name))
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        let path = self.resolve(locator)?;
        tokio::fs::try_exists(&path).await.map_err(|e| {
            RagError::Storage(format!("Failed to check {}: {}", path.display(), e))
        })
    }

    async fn read(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RagError::not_found("file", locator),
            _ => RagError::Storage(format!("Failed to read {}: {}", path.display(), e)),
        })
    }

    async fn stream(&self, locator: &str) -> Result<ByteStream> {
        let path = self.resolve(locator)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => RagError::not_found("file", locator),
                _ => RagError::Storage(format!("Failed to open {}: {}", path.display(), e)),
            })?;

        let stream = futures::stream::try_unfold(file, |mut file| async move {
            let mut buffer = vec![0_u8; STREAM_CHUNK_SIZE];
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                return Ok::<_, io::Error>(None);
            }
            buffer.truncate(read);
            Ok(Some((buffer, file)))
        });

        Ok(stream.boxed())
    }

    async fn delete(&self, locator: &str) -> Result<bool> {
        let path = self.resolve(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("File {} already gone", path.display());
                Ok(false)
            }
            Err(e) => Err(RagError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Storage name for an upload: `<kb>/<upload id>-<sanitized file name>`.
///
/// Each upload gets its own object, so deleting one document never touches
/// the bytes of another.
#[inline]
pub fn object_name(kb_id: Uuid, upload_id: Uuid, file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload");
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}/{}-{}", kb_id, upload_id.simple(), sanitized)
}

fn checked_relative_path(name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(RagError::Storage("Empty storage name".to_string()));
    }

    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(RagError::Storage(format!(
                    "Storage name {:?} escapes the storage root",
                    name
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RagError::Storage(format!(
                    "Storage name {:?} must be relative",
                    name
                )));
            }
        }
    }

    Ok(path.to_path_buf())
}
