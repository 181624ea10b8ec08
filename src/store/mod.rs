//! Flat file-transfer sandbox.
//!
//! Every operation confines itself to one root directory. Names are checked
//! by [`validate_name`] before any filesystem call, so `..`, path separators
//! and other multi-component names never reach the disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::error::{ErrorKind, RpcError};

/// Prefix of in-flight upload files. Reserved: hidden from listings and
/// rejected as a client file name.
const UPLOAD_TEMP_PREFIX: &str = ".rexec-upload-";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid filename - only simple filenames allowed, no paths: {0:?}")]
    InvalidName(String),

    #[error("File too large: {size} bytes. Maximum size: {limit} bytes ({:.1} MB)", megabytes(.limit))]
    TooLarge { size: u64, limit: u64 },

    #[error("File already exists: {0}. Set overwrite=true to replace.")]
    AlreadyExists(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("File store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn megabytes(bytes: &u64) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidName(_) => ErrorKind::InvalidName,
            StoreError::TooLarge { .. } => ErrorKind::TooLarge,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::NotFound(_) | StoreError::NotAFile(_) => ErrorKind::NotFound,
            StoreError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        RpcError::new(err.kind(), err.to_string())
    }
}

/// A regular file in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    pub size: u64,
    pub overwritten: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteReceipt {
    pub deleted_count: usize,
    pub deleted_files: Vec<String>,
}

/// Accept only a single, plain path component.
pub fn validate_name(name: &str) -> Result<&str, StoreError> {
    let invalid = || StoreError::InvalidName(name.to_string());

    if name.is_empty() || name == "." || name.contains("..") {
        return Err(invalid());
    }
    if name.starts_with(UPLOAD_TEMP_PREFIX) {
        return Err(invalid());
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(invalid());
    }
    if Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name) {
        return Err(invalid());
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    max_file_size: u64,
}

impl FileStore {
    /// Open the store, creating the root directory if needed. Staging files
    /// left behind by an interrupted upload are removed.
    pub fn open(root: impl Into<PathBuf>, max_file_size: u64) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        remove_stale_uploads(&root)?;
        Ok(Self {
            root,
            max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn check_size(&self, size: u64) -> Result<(), StoreError> {
        if size > self.max_file_size {
            return Err(StoreError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    pub async fn upload(
        &self,
        name: &str,
        data: &[u8],
        overwrite: bool,
    ) -> Result<UploadReceipt, StoreError> {
        let name = validate_name(name)?;
        self.check_size(data.len() as u64)?;

        let target = self.root.join(name);
        let overwritten = fs::try_exists(&target).await?;
        if overwritten && !overwrite {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        if overwritten && !fs::symlink_metadata(&target).await?.is_file() {
            return Err(StoreError::NotAFile(name.to_string()));
        }

        // Write beside the target and rename, so readers never see a partial file.
        let staging = self
            .root
            .join(format!("{}{}", UPLOAD_TEMP_PREFIX, Uuid::new_v4()));
        if let Err(e) = fs::write(&staging, data).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&staging, &target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        tracing::info!(filename = name, size = data.len(), overwritten, "File uploaded");
        Ok(UploadReceipt {
            filename: name.to_string(),
            size: data.len() as u64,
            overwritten,
        })
    }

    pub async fn download(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let name = validate_name(name)?;
        let path = self.root.join(name);

        let metadata = match fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(StoreError::NotAFile(name.to_string()));
        }
        self.check_size(metadata.len())?;

        let data = fs::read(&path).await?;
        // The file may have grown between stat and read.
        self.check_size(data.len() as u64)?;

        tracing::info!(filename = name, size = data.len(), "File downloaded");
        Ok(data)
    }

    pub async fn list(&self) -> Result<Vec<FileRecord>, StoreError> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(UPLOAD_TEMP_PREFIX) {
                continue;
            }
            // Entries removed by a concurrent delete are skipped.
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            records.push(FileRecord {
                name,
                size: metadata.len(),
                modified,
            });
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub async fn delete(&self, name: &str) -> Result<String, StoreError> {
        let name = validate_name(name)?;
        let path = self.root.join(name);

        match fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Err(StoreError::NotAFile(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(&path).await?;

        tracing::info!(filename = name, "File deleted");
        Ok(name.to_string())
    }

    /// Remove every regular file. Files that cannot be removed are skipped.
    pub async fn delete_all(&self) -> Result<BulkDeleteReceipt, StoreError> {
        let mut receipt = BulkDeleteReceipt::default();
        for record in self.list().await? {
            match fs::remove_file(self.root.join(&record.name)).await {
                Ok(()) => {
                    receipt.deleted_files.push(record.name);
                    receipt.deleted_count += 1;
                }
                Err(e) => {
                    tracing::warn!(filename = %record.name, error = %e, "Failed to delete file");
                }
            }
        }

        tracing::info!(deleted = receipt.deleted_count, "Deleted all files");
        Ok(receipt)
    }
}

fn remove_stale_uploads(root: &Path) -> Result<(), StoreError> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let is_staging = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(UPLOAD_TEMP_PREFIX));
        if !is_staging {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => tracing::info!(path = %entry.path().display(), "Removed stale upload"),
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove stale upload")
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_accepts_plain_names() {
        for name in ["a.txt", "data.bin", "with space.csv", ".hidden", "x"] {
            assert_eq!(validate_name(name).unwrap(), name);
        }
    }

    #[test]
    fn validate_name_rejects_paths_and_traversal() {
        for name in [
            "",
            ".",
            "..",
            "../etc/passwd",
            "a/b.txt",
            "/abs.txt",
            "dir\\file.txt",
            "file..txt",
            "nul\0byte",
            "trailing/",
            ".rexec-upload-mine",
        ] {
            assert!(
                matches!(validate_name(name), Err(StoreError::InvalidName(_))),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn too_large_message_reports_megabytes() {
        let err = StoreError::TooLarge {
            size: 6 * 1024 * 1024,
            limit: 5 * 1024 * 1024,
        };
        assert!(err.to_string().contains("(5.0 MB)"));
        assert_eq!(err.kind(), ErrorKind::TooLarge);
    }
}
