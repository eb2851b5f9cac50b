use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::instrument;

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object handle: {0}")]
    InvalidHandle(String),
}

/// The engine names objects; the store persists bytes. Handles are
/// slash-separated relative paths such as `logos/a1b2c3d4e5f6.png` or
/// `invoices/00042.pdf`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, handle: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    async fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError>;
    async fn delete(&self, handle: &str) -> Result<(), StorageError>;

    /// Public URL under which the object is served.
    fn url_for(&self, handle: &str) -> String;
}

fn validate_handle(handle: &str) -> Result<(), StorageError> {
    if handle.is_empty() || handle.contains("..") || handle.starts_with('/') {
        return Err(StorageError::InvalidHandle(handle.to_string()));
    }
    Ok(())
}

/// Filesystem-backed object store rooted at a media directory.
pub struct FsObjectStore {
    root: PathBuf,
    public_base: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into(),
        }
    }

    fn path_for(&self, handle: &str) -> PathBuf {
        self.root.join(handle)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[instrument(skip(self, bytes), fields(handle = %handle, size = bytes.len()))]
    async fn put(&self, handle: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        validate_handle(handle)?;
        let path = self.path_for(handle);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError> {
        validate_handle(handle)?;
        let path = self.path_for(handle);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(handle.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, handle: &str) -> Result<(), StorageError> {
        validate_handle(handle)?;
        match tokio::fs::remove_file(self.path_for(handle)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url_for(&self, handle: &str) -> String {
        format!("{}/{}", self.public_base.trim_end_matches('/'), handle)
    }
}

/// In-memory object store used by tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.objects.contains_key(handle)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, handle: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        validate_handle(handle)?;
        self.objects.insert(handle.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, handle: &str) -> Result<Vec<u8>, StorageError> {
        validate_handle(handle)?;
        self.objects
            .get(handle)
            .map(|entry| entry.clone())
            .ok_or_else(|| StorageError::NotFound(handle.to_string()))
    }

    async fn delete(&self, handle: &str) -> Result<(), StorageError> {
        self.objects.remove(handle);
        Ok(())
    }

    fn url_for(&self, handle: &str) -> String {
        format!("memory://{}", handle)
    }
}
