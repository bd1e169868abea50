//! The file-system seam.
//!
//! The directory picker and file CRUD live outside the core; the workbench
//! reaches them through [`FsAdapter`]. `MemoryFs` is the in-memory backend
//! used by tests and by the plugin host's scratch storage.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

/// Loaded file content: text for editable files, bytes for everything else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Text view of the content, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

/// Errors crossing the file-system seam.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file not readable: {0}")]
    NotReadable(String),
    #[error("file not writable: {0}")]
    NotWritable(String),
    #[error("file already exists: {0}")]
    AlreadyExists(String),
}

/// The external file-system adapter.
///
/// Paths are vault-relative, `/`-separated. Implementations must be safe to
/// call from any task; the core only awaits them, never blocks on them.
#[async_trait]
pub trait FsAdapter: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Content, FsError>;
    async fn write_file(&self, path: &str, content: Content) -> Result<(), FsError>;
    async fn create_file(&self, path: &str, content: Content) -> Result<(), FsError>;
    async fn delete_file(&self, path: &str) -> Result<(), FsError>;
    async fn rename_file(&self, old: &str, new: &str) -> Result<(), FsError>;
    async fn list_files(&self) -> Result<Vec<String>, FsError>;
}

/// In-memory file system for tests and plugin scratch space.
#[derive(Default)]
pub struct MemoryFs {
    files: RwLock<HashMap<String, Content>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file synchronously (test setup).
    pub fn seed(&self, path: impl Into<String>, content: impl Into<Content>) {
        self.files.write().insert(path.into(), content.into());
    }
}

/// File system rooted at a local directory.
///
/// Vault-relative paths are resolved under the root; components that would
/// escape it (`..`, absolute paths) are rejected as unreadable.
pub struct LocalFs {
    root: std::path::PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<std::path::PathBuf, FsError> {
        let relative = std::path::Path::new(path);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes {
            return Err(FsError::NotReadable(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FsAdapter for LocalFs {
    async fn read_file(&self, path: &str) -> Result<Content, FsError> {
        let full = self.resolve(path)?;
        let bytes = tokio::fs::read(&full)
            .await
            .map_err(|_| FsError::NotFound(path.to_string()))?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => Content::Text(text),
            Err(e) => Content::Bytes(e.into_bytes()),
        })
    }

    async fn write_file(&self, path: &str, content: Content) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|_| FsError::NotWritable(path.to_string()))?;
        }
        let bytes = match content {
            Content::Text(text) => text.into_bytes(),
            Content::Bytes(bytes) => bytes,
        };
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|_| FsError::NotWritable(path.to_string()))
    }

    async fn create_file(&self, path: &str, content: Content) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        if tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        self.write_file(path, content).await
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|_| FsError::NotFound(path.to_string()))
    }

    async fn rename_file(&self, old: &str, new: &str) -> Result<(), FsError> {
        let from = self.resolve(old)?;
        let to = self.resolve(new)?;
        if let Some(parent) = to.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|_| FsError::NotFound(old.to_string()))
    }

    async fn list_files(&self) -> Result<Vec<String>, FsError> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|_| FsError::NotReadable(dir.display().to_string()))?;
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    out.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[async_trait]
impl FsAdapter for MemoryFs {
    async fn read_file(&self, path: &str) -> Result<Content, FsError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, content: Content) -> Result<(), FsError> {
        self.files.write().insert(path.to_string(), content);
        Ok(())
    }

    async fn create_file(&self, path: &str, content: Content) -> Result<(), FsError> {
        let mut files = self.files.write();
        if files.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        files.insert(path.to_string(), content);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        self.files
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn rename_file(&self, old: &str, new: &str) -> Result<(), FsError> {
        let mut files = self.files.write();
        let content = files
            .remove(old)
            .ok_or_else(|| FsError::NotFound(old.to_string()))?;
        files.insert(new.to_string(), content);
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>, FsError> {
        let mut paths: Vec<String> = self.files.read().keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}

// ============================================================================
// Tests
// ============================================================================
