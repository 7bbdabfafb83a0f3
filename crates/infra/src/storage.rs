//! Object storage for receipts, product images and store logos.
//!
//! Objects live at `<bucket>/<path>`. The local backend writes them under a
//! root directory and serves them from a configured public base URL; the
//! in-memory backend keeps bytes in a map for tests and development.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Largest object accepted by any backend.
pub const MAX_OBJECT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    Receipts,
    ProductImages,
    StoreLogos,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Receipts => "receipts",
            Bucket::ProductImages => "product-images",
            Bucket::StoreLogos => "store-logos",
        }
    }

    /// Content types each bucket accepts. Receipts may also be PDFs.
    pub fn accepts(self, content_type: &str) -> bool {
        let image = matches!(content_type, "image/jpeg" | "image/png" | "image/webp");
        match self {
            Bucket::Receipts => image || content_type == "application/pdf",
            Bucket::ProductImages | Bucket::StoreLogos => image,
        }
    }
}

impl core::fmt::Display for Bucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Bucket {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipts" => Ok(Bucket::Receipts),
            "product-images" => Ok(Bucket::ProductImages),
            "store-logos" => Ok(Bucket::StoreLogos),
            other => Err(StorageError::InvalidPath(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub bucket: Bucket,
    pub path: String,
    pub public_url: String,
}

/// Bytes of a stored object, as served back under its public URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectBytes {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("content type {content_type} is not accepted in bucket {bucket}")]
    UnsupportedContentType { bucket: Bucket, content_type: String },

    #[error("object is empty")]
    Empty,

    #[error("object exceeds {MAX_OBJECT_BYTES} bytes")]
    TooLarge,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(
        &self,
        bucket: Bucket,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// `None` when nothing is stored at `path`.
    async fn read(&self, bucket: Bucket, path: &str) -> Result<Option<ObjectBytes>, StorageError>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, bucket: Bucket, path: &str) -> Result<(), StorageError>;
}

/// Check an upload before any backend touches it.
fn validate_put(
    bucket: Bucket,
    path: &str,
    bytes: &[u8],
    content_type: &str,
) -> Result<(), StorageError> {
    validate_path(path)?;
    if bytes.is_empty() {
        return Err(StorageError::Empty);
    }
    if bytes.len() > MAX_OBJECT_BYTES {
        return Err(StorageError::TooLarge);
    }
    if !bucket.accepts(content_type) {
        return Err(StorageError::UnsupportedContentType {
            bucket,
            content_type: content_type.to_string(),
        });
    }
    Ok(())
}

/// Relative, non-empty, no `..` and no leading slash.
fn validate_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    let ok = Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Content type of a file written by the local backend, from its extension.
fn content_type_for(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn public_url(base: &str, bucket: Bucket, path: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, path)
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct InMemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<(Bucket, String), (String, Vec<u8>)>>,
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn contains(&self, bucket: Bucket, path: &str) -> bool {
        self.objects
            .read()
            .map(|m| m.contains_key(&(bucket, path.to_string())))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(
        &self,
        bucket: Bucket,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_put(bucket, path, &bytes, content_type)?;
        self.objects
            .write()
            .map_err(|_| std::io::Error::other("storage lock poisoned"))?
            .insert((bucket, path.to_string()), (content_type.to_string(), bytes));

        Ok(StoredObject {
            bucket,
            path: path.to_string(),
            public_url: public_url(&self.base_url, bucket, path),
        })
    }

    async fn read(&self, bucket: Bucket, path: &str) -> Result<Option<ObjectBytes>, StorageError> {
        validate_path(path)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| std::io::Error::other("storage lock poisoned"))?;
        Ok(objects
            .get(&(bucket, path.to_string()))
            .map(|(content_type, bytes)| ObjectBytes {
                content_type: content_type.clone(),
                bytes: bytes.clone(),
            }))
    }

    async fn delete(&self, bucket: Bucket, path: &str) -> Result<(), StorageError> {
        validate_path(path)?;
        self.objects
            .write()
            .map_err(|_| std::io::Error::other("storage lock poisoned"))?
            .remove(&(bucket, path.to_string()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Local filesystem
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalFsObjectStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalFsObjectStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn object_path(&self, bucket: Bucket, path: &str) -> PathBuf {
        self.root.join(bucket.as_str()).join(path)
    }
}

#[async_trait]
impl ObjectStorage for LocalFsObjectStorage {
    async fn put(
        &self,
        bucket: Bucket,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_put(bucket, path, &bytes, content_type)?;
        let target = self.object_path(bucket, path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        debug!(bucket = %bucket, path, size = bytes.len(), "object stored");

        Ok(StoredObject {
            bucket,
            path: path.to_string(),
            public_url: public_url(&self.base_url, bucket, path),
        })
    }

    async fn read(&self, bucket: Bucket, path: &str) -> Result<Option<ObjectBytes>, StorageError> {
        validate_path(path)?;
        match tokio::fs::read(self.object_path(bucket, path)).await {
            Ok(bytes) => Ok(Some(ObjectBytes {
                content_type: content_type_for(path).to_string(),
                bytes,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: Bucket, path: &str) -> Result<(), StorageError> {
        validate_path(path)?;
        match tokio::fs::remove_file(self.object_path(bucket, path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
