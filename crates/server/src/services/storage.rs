//! Object-store seam: the publisher talks to storage through a trait so
//! the backing store can be swapped (and doubled in tests) instead of
//! living behind a global client.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::error::{AppError, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `data` under `key`, overwriting any previous object.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// Deletes every object whose key starts with `prefix`. Deleting an
    /// absent prefix is a no-op.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

/// Filesystem-backed store keyed by path-like strings under a base
/// directory.
pub struct FsObjectStore {
    base_path: PathBuf,
}

impl FsObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create storage directory: {e}")))?;
        Ok(())
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create directories: {e}")))?;
        }
        fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write object {key}: {e}")))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let path = self.key_path(prefix);
        if path.exists() {
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to delete prefix {prefix}: {e}")))?;
        }
        Ok(())
    }
}

/// Derives a content type from the key's extension, defaulting to an
/// opaque binary type.
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("mjs") => "text/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// In-memory store used by tests; optionally fails after a fixed number
/// of successful puts, or on every delete, to exercise failure paths.
pub struct MemoryObjectStore {
    pub objects: std::sync::Mutex<Vec<(String, String)>>,
    fail_after: Option<usize>,
    fail_deletes: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: std::sync::Mutex::new(Vec::new()),
            fail_after: None,
            fail_deletes: false,
        }
    }

    pub fn failing_after(puts: usize) -> Self {
        Self {
            objects: std::sync::Mutex::new(Vec::new()),
            fail_after: Some(puts),
            fail_deletes: false,
        }
    }

    pub fn failing_deletes() -> Self {
        Self {
            objects: std::sync::Mutex::new(Vec::new()),
            fail_after: None,
            fail_deletes: true,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, _data: &[u8], content_type: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if objects.len() >= limit {
                return Err(AppError::Internal("object store unavailable".to_string()));
            }
        }
        objects.push((key.to_string(), content_type.to_string()));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        if self.fail_deletes {
            return Err(AppError::Internal("object store unavailable".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .retain(|(k, _)| !k.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("projects/demo/index.html"), "text/html");
        assert_eq!(content_type_for("a/b/style.css"), "text/css");
        assert_eq!(content_type_for("app.js"), "text/javascript");
        assert_eq!(content_type_for("logo.png"), "image/png");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
        assert_eq!(content_type_for("data.unknown"), "application/octet-stream");
    }

    #[tokio::test]
    async fn fs_store_put_and_delete_prefix() {
        let base = std::env::temp_dir().join(format!("siteforge-test-{}", uuid::Uuid::new_v4()));
        let store = FsObjectStore::new(&base);
        store.init().await.unwrap();

        store
            .put("projects/demo/index.html", b"<html>", "text/html")
            .await
            .unwrap();
        store
            .put("projects/demo/assets/a.js", b"js", "text/javascript")
            .await
            .unwrap();
        assert!(base.join("projects/demo/assets/a.js").exists());

        store.delete_prefix("projects/demo/").await.unwrap();
        assert!(!base.join("projects/demo").exists());

        // Absent prefix is a no-op
        store.delete_prefix("projects/missing/").await.unwrap();

        tokio::fs::remove_dir_all(&base).await.ok();
    }
}
