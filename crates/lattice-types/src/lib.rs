//! # lattice-types
//!
//! Shared identity, event, and document types for the Lattice workbench
//! runtime. Everything here is plain data: typed ids, tabs, the vault file
//! tree, vault lifecycle events, the annotation sidecar model, and the
//! notebook document model with its nbformat (de)serialization. The
//! subsystem crates (workspace, markdown, kernel, plugins) all depend on
//! this one and on nothing else of ours.

pub mod annotation;
pub mod event;
pub mod filetree;
pub mod ids;
pub mod notebook;
pub mod tab;

pub use annotation::{Annotation, AnnotationSet, is_annotation_id, new_annotation_id};
pub use event::VaultEvent;
pub use filetree::{DirEntry, FileEntry, TreeNode, build_tree, find_file, normalize};
pub use ids::{DirHandle, FileHandle, NodeId, PaneId, TabId};
pub use notebook::{
    Cell, CellKind, Metadata, MimeBundle, Notebook, NotebookFormatError, Output, StreamName,
    parse_notebook, serialize_notebook,
};
pub use tab::Tab;

/// Current Unix time in milliseconds. Returns 0 if the clock is before epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
