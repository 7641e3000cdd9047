//! File Storage
//! Mission: Persist uploaded attachments and hand back a stable reference string
//!
//! Stored names are `<uuid>_<sanitized client name>` so two uploads never collide and a
//! client-chosen name can never escape the storage directory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const FALLBACK_NAME: &str = "upload";
const MAX_NAME_LEN: usize = 100;

/// Sink for attachment bytes
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `bytes` under a name derived from `name` and return its reference
    async fn store(&self, name: &str, bytes: &[u8]) -> Result<String>;

    /// Remove a previously stored file. Missing files are not an error.
    async fn remove(&self, reference: &str) -> Result<()>;
}

/// Remove every reference in `references`, logging (not failing) on error
pub async fn remove_all(storage: &dyn FileStorage, references: &[String]) {
    for reference in references {
        if let Err(e) = storage.remove(reference).await {
            warn!("Failed to remove stored file {}: {:#}", reference, e);
        }
    }
}

/// Reduce a client filename to a safe final component
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");

    let cleaned: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_NAME_LEN)
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Local-disk storage rooted at one directory
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Only paths directly inside `root` are ours to delete
    fn owned_path(&self, reference: &str) -> Option<PathBuf> {
        let path = Path::new(reference);
        let file_name = path.file_name()?;
        if path.parent()? != self.root.as_path() {
            return None;
        }
        Some(self.root.join(file_name))
    }
}

#[async_trait]
impl FileStorage for DiskStorage {
    async fn store(&self, name: &str, bytes: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create upload dir {}", self.root.display()))?;

        let stored_name = format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(name));
        let path = self.root.join(stored_name);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.flush().await?;

        debug!("💾 Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let Some(path) = self.owned_path(reference) else {
            warn!("Refusing to remove foreign path {}", reference);
            return Ok(());
        };

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\bob\\hw 1.docx"), "hw1.docx");
        assert_eq!(sanitize_filename("..."), FALLBACK_NAME);
        assert_eq!(sanitize_filename(""), FALLBACK_NAME);
        assert_eq!(sanitize_filename(".env"), "env");
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().join("uploaded_files"));

        let reference = storage.store("notes.txt", b"hello").await.unwrap();
        assert!(reference.ends_with("_notes.txt"));
        assert_eq!(tokio::fs::read(&reference).await.unwrap(), b"hello");

        storage.remove(&reference).await.unwrap();
        assert!(!Path::new(&reference).exists());

        // second remove is a no-op
        storage.remove(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_name_twice_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path());

        let a = storage.store("hw.pdf", b"first").await.unwrap();
        let b = storage.store("hw.pdf", b"second").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(&b).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_traversal_name_stays_inside_root() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().join("inner"));

        let reference = storage.store("../../escape.txt", b"x").await.unwrap();
        assert_eq!(Path::new(&reference).parent().unwrap(), storage.root());
    }

    #[tokio::test]
    async fn test_remove_ignores_foreign_paths() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("keep.txt");
        tokio::fs::write(&outside, b"keep").await.unwrap();

        let storage = DiskStorage::new(dir.path().join("inner"));
        storage.remove(outside.to_str().unwrap()).await.unwrap();

        assert!(outside.exists());
    }
}
