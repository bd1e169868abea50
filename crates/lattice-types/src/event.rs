//! Vault lifecycle events.
//!
//! A vault event is a file-lifecycle notification produced by the workspace
//! and fanned out to subscribers (decoration engine, plugin host, UI). Each
//! event carries a dotted subject for bus pattern-matching and a stable wire
//! name for the plugin event channel.

use serde::{Deserialize, Serialize};

/// A file-lifecycle notification.
///
/// Paths are vault-relative, `/`-separated strings — the same form the
/// file-system adapter and the plugin RPC bridge use on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VaultEvent {
    /// A file was opened in a tab.
    FileOpen { path: String },
    /// A tab holding this file was closed.
    FileClose { path: String },
    /// A file's content was persisted.
    FileSave { path: String },
    /// A file's content changed on disk.
    FileChange { path: String },
    /// A file was renamed or moved.
    FileRename { old: String, new: String },
    /// A file was deleted.
    FileDelete { path: String },
    /// The active file changed; `None` when no tab is active.
    ActiveFileChange { path: Option<String> },
    /// A vault directory was opened as the workspace root.
    WorkspaceOpen { name: String },
}

impl VaultEvent {
    /// Dotted subject for bus pattern-matching (`vault.*`, `vault.>`).
    pub fn subject(&self) -> &'static str {
        match self {
            VaultEvent::FileOpen { .. } => "vault.file.open",
            VaultEvent::FileClose { .. } => "vault.file.close",
            VaultEvent::FileSave { .. } => "vault.file.save",
            VaultEvent::FileChange { .. } => "vault.file.change",
            VaultEvent::FileRename { .. } => "vault.file.rename",
            VaultEvent::FileDelete { .. } => "vault.file.delete",
            VaultEvent::ActiveFileChange { .. } => "vault.active",
            VaultEvent::WorkspaceOpen { .. } => "vault.workspace.open",
        }
    }

    /// Stable event name used on the plugin RPC channel.
    pub fn wire_name(&self) -> &'static str {
        match self {
            VaultEvent::FileOpen { .. } => "file-open",
            VaultEvent::FileClose { .. } => "file-close",
            VaultEvent::FileSave { .. } => "file-save",
            VaultEvent::FileChange { .. } => "vault-change",
            VaultEvent::FileRename { .. } => "vault-rename",
            VaultEvent::FileDelete { .. } => "vault-delete",
            VaultEvent::ActiveFileChange { .. } => "active-file-change",
            VaultEvent::WorkspaceOpen { .. } => "workspace-open",
        }
    }

    /// The primary path this event concerns, if any.
    ///
    /// For renames this is the *old* path; for `ActiveFileChange(None)` and
    /// `WorkspaceOpen` there is no path.
    pub fn path(&self) -> Option<&str> {
        match self {
            VaultEvent::FileOpen { path }
            | VaultEvent::FileClose { path }
            | VaultEvent::FileSave { path }
            | VaultEvent::FileChange { path }
            | VaultEvent::FileDelete { path } => Some(path),
            VaultEvent::FileRename { old, .. } => Some(old),
            VaultEvent::ActiveFileChange { path } => path.as_deref(),
            VaultEvent::WorkspaceOpen { .. } => None,
        }
    }

    /// Serialize to the plugin event-channel wire form:
    /// `{type: "event", event: "...", path, newPath?}`.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), "event".into());
        obj.insert("event".into(), self.wire_name().into());
        match self {
            VaultEvent::FileRename { old, new } => {
                obj.insert("path".into(), old.as_str().into());
                obj.insert("newPath".into(), new.as_str().into());
            }
            VaultEvent::ActiveFileChange { path } => {
                obj.insert(
                    "path".into(),
                    path.as_deref().map_or(serde_json::Value::Null, Into::into),
                );
            }
            VaultEvent::WorkspaceOpen { name } => {
                obj.insert("path".into(), name.as_str().into());
            }
            other => {
                if let Some(p) = other.path() {
                    obj.insert("path".into(), p.into());
                }
            }
        }
        serde_json::Value::Object(obj)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_are_vault_scoped() {
        let events = [
            VaultEvent::FileOpen { path: "a.md".into() },
            VaultEvent::FileClose { path: "a.md".into() },
            VaultEvent::FileSave { path: "a.md".into() },
            VaultEvent::FileChange { path: "a.md".into() },
            VaultEvent::FileRename { old: "a.md".into(), new: "b.md".into() },
            VaultEvent::FileDelete { path: "a.md".into() },
            VaultEvent::ActiveFileChange { path: None },
            VaultEvent::WorkspaceOpen { name: "notes".into() },
        ];
        for ev in &events {
            assert!(ev.subject().starts_with("vault."), "{}", ev.subject());
        }
    }

    #[test]
    fn test_wire_rename_carries_new_path() {
        let ev = VaultEvent::FileRename { old: "notes/x.md".into(), new: "notes/y.md".into() };
        let wire = ev.to_wire();
        assert_eq!(wire["type"], "event");
        assert_eq!(wire["event"], "vault-rename");
        assert_eq!(wire["path"], "notes/x.md");
        assert_eq!(wire["newPath"], "notes/y.md");
    }

    #[test]
    fn test_wire_active_file_change_null_path() {
        let wire = VaultEvent::ActiveFileChange { path: None }.to_wire();
        assert_eq!(wire["event"], "active-file-change");
        assert!(wire["path"].is_null());
    }

    #[test]
    fn test_path_accessor() {
        let ev = VaultEvent::FileRename { old: "a".into(), new: "b".into() };
        assert_eq!(ev.path(), Some("a"));
        assert_eq!(VaultEvent::WorkspaceOpen { name: "v".into() }.path(), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let ev = VaultEvent::FileSave { path: "notes/a.md".into() };
        let json = serde_json::to_string(&ev).unwrap();
        let parsed: VaultEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, parsed);
    }
}
