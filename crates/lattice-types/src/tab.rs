//! Tabs: the binding between a pane and an open file.

use serde::{Deserialize, Serialize};

use crate::ids::{FileHandle, TabId};

/// A tab inside a pane.
///
/// Two tabs may reference the same path (in the same pane or different
/// panes); each carries its own dirty flag and its own content-cache entry,
/// so concurrent edits to the same file can diverge per tab.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    /// Stable tab identifier — the content cache key.
    pub id: TabId,
    /// Vault-relative path of the open file.
    pub path: String,
    /// Opaque handle from the file-system adapter.
    pub handle: FileHandle,
    /// Whether the tab has unsaved edits.
    pub dirty: bool,
    /// Optional display title override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Tab {
    /// Open a clean tab on a file.
    pub fn new(handle: FileHandle, path: impl Into<String>) -> Self {
        Self {
            id: TabId::new(),
            path: path.into(),
            handle,
            dirty: false,
            title: None,
        }
    }

    /// Title shown in the tab strip: the override if set, else the file
    /// name portion of the path.
    pub fn display_title(&self) -> &str {
        if let Some(t) = &self.title {
            return t;
        }
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tab_is_clean() {
        let tab = Tab::new(FileHandle::new(), "notes/a.md");
        assert!(!tab.dirty);
        assert_eq!(tab.path, "notes/a.md");
        assert!(tab.title.is_none());
    }

    #[test]
    fn test_display_title_from_path() {
        let tab = Tab::new(FileHandle::new(), "notes/deep/chapter one.md");
        assert_eq!(tab.display_title(), "chapter one.md");
    }

    #[test]
    fn test_display_title_bare_name() {
        let tab = Tab::new(FileHandle::new(), "todo.md");
        assert_eq!(tab.display_title(), "todo.md");
    }

    #[test]
    fn test_display_title_override() {
        let mut tab = Tab::new(FileHandle::new(), "notes/a.md");
        tab.title = Some("Scratch".into());
        assert_eq!(tab.display_title(), "Scratch");
    }

    #[test]
    fn test_same_path_distinct_ids() {
        let h = FileHandle::new();
        let a = Tab::new(h, "notes/a.md");
        let b = Tab::new(h, "notes/a.md");
        assert_ne!(a.id, b.id);
    }
}
