use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::Backend;
use crate::config::DiskConfig;

/// Disk rooted at a local directory. Objects are plain files under the
/// root; the directory is created on construction.
#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Build from disk config. Requires `path`.
    pub fn from_config(config: &DiskConfig) -> Result<Self> {
        let path = config.require_str("path")?;
        Self::init(path)
    }

    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create directory: {}", root.display()))?;
        Ok(Self { root })
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn relative_path(&self, full: &Path) -> Option<String> {
        let rel = full.strip_prefix(&self.root).ok()?;
        let rel = rel.to_str()?;
        // Backends address objects with forward slashes regardless of host.
        Some(rel.replace(std::path::MAIN_SEPARATOR, "/"))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("failed to read: {}", full.display()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, data)
            .await
            .with_context(|| format!("failed to write: {}", full.display()))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }

    /// Walks the prefix directory recursively and returns relative file
    /// paths, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = self.full_path(prefix);
        if !start.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut read_dir = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("failed to list: {}", dir.display()))?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Some(rel) = self.relative_path(&path) {
                    entries.push(rel);
                }
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        if full.is_file() {
            tokio::fs::remove_file(&full).await?;
        }
        Ok(())
    }
}
