/// Attachment blob storage
///
/// Handlers talk to an [`AttachmentStorage`] trait object held in
/// `AppState`; the database row only records the returned relative path.
/// [`LocalDiskStorage`] writes under a configured root as
/// `{root}/{task_id}/{attachment_id}_{sanitized file name}`.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Where attachment bytes live
#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    /// Stores `data` and returns the path to record on the attachment row.
    async fn put(&self, task_id: Uuid, attachment_id: Uuid, file_name: &str, data: Bytes) -> StorageResult<String>;

    /// Removes a stored blob. Missing blobs are not an error.
    async fn remove(&self, storage_path: &str) -> StorageResult<()>;
}

/// Stores attachments on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, storage_path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(storage_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));

        if escapes || storage_path.is_empty() {
            return Err(StorageError::InvalidPath(storage_path.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AttachmentStorage for LocalDiskStorage {
    async fn put(&self, task_id: Uuid, attachment_id: Uuid, file_name: &str, data: Bytes) -> StorageResult<String> {
        let storage_path = format!("{}/{}_{}", task_id, attachment_id, sanitize_file_name(file_name));
        let full_path = self.resolve(&storage_path)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, &data).await?;

        tracing::debug!(
            path = %full_path.display(),
            size_bytes = data.len(),
            "Attachment written to disk"
        );

        Ok(storage_path)
    }

    async fn remove(&self, storage_path: &str) -> StorageResult<()> {
        let full_path = self.resolve(storage_path)?;

        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduces a client-supplied file name to a safe single path segment.
///
/// Directory parts are stripped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`. An empty result becomes `file`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
