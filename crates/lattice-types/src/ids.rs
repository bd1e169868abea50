//! Typed identifiers for panes, tabs, layout nodes, and file handles.
//!
//! All ID types wrap UUIDs and are opaque to callers. Layout ids (`NodeId`,
//! `PaneId`, `TabId`) are UUIDv7 so debug listings come out in creation
//! order. `FileHandle` and `DirHandle` are UUIDv4 — they are minted by the
//! external file-system adapter and carry no ordering meaning. The `short()`
//! form (first 8 hex chars) is for human-facing display only, never lookup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A layout-tree node identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(uuid::Uuid);

/// A pane identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaneId(uuid::Uuid);

/// A tab identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(uuid::Uuid);

/// An opaque file handle minted by the file-system adapter (UUIDv4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHandle(uuid::Uuid);

/// An opaque directory handle minted by the file-system adapter (UUIDv4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirHandle(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal, $ctor:expr) => {
        impl $T {
            /// Create a new unique ID.
            pub fn new() -> Self {
                Self($ctor)
            }

            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Parse from a hex string (32 chars) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// A nil / zero ID — for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(NodeId, "NodeId", uuid::Uuid::now_v7());
impl_typed_id!(PaneId, "PaneId", uuid::Uuid::now_v7());
impl_typed_id!(TabId, "TabId", uuid::Uuid::now_v7());
impl_typed_id!(FileHandle, "FileHandle", uuid::Uuid::new_v4());
impl_typed_id!(DirHandle, "DirHandle", uuid::Uuid::new_v4());

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = PaneId::new();
        let b = PaneId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_8_chars() {
        assert_eq!(TabId::new().short().len(), 8);
    }

    #[test]
    fn test_hex_is_32_chars() {
        assert_eq!(NodeId::new().to_hex().len(), 32);
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = PaneId::new();
        assert_eq!(PaneId::parse(&id.to_hex()).unwrap(), id);
        assert_eq!(PaneId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_nil() {
        assert!(TabId::nil().is_nil());
        assert!(!TabId::new().is_nil());
    }

    #[test]
    fn test_layout_ids_are_time_ordered() {
        let ids: Vec<PaneId> = (0..10).map(|_| PaneId::new()).collect();
        for i in 1..ids.len() {
            assert!(ids[i] >= ids[i - 1]);
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = FileHandle::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: FileHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_debug_shows_type_and_short() {
        let id = DirHandle::new();
        let debug = format!("{:?}", id);
        assert!(debug.starts_with("DirHandle("));
        assert!(debug.ends_with(')'));
    }

    #[test]
    fn test_hash_usable_as_map_key() {
        use std::collections::HashMap;
        let id = TabId::new();
        let mut map = HashMap::new();
        map.insert(id, "tab");
        assert_eq!(map.get(&id), Some(&"tab"));
    }
}
