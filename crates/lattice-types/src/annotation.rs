//! Annotation sidecar model.
//!
//! Renderers (PDF, image, handwriting — all external) write annotations to a
//! JSON sidecar keyed by file id. The core consumes them for
//! `[[file#ann-id]]` links in markdown and exposes them to plugins over the
//! RPC bridge. Annotation ids are always `ann-<uuid>`.

use serde::{Deserialize, Serialize};

/// Prefix every annotation id carries.
pub const ANNOTATION_ID_PREFIX: &str = "ann-";

/// A single annotation on a file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// `ann-<uuid>`.
    pub id: String,
    /// What the annotation anchors to (page/region/stroke — renderer-defined).
    pub target: serde_json::Value,
    /// Presentation style (renderer-defined).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
    /// Annotation body.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

impl Annotation {
    /// Mint a new annotation with a generated `ann-<uuid>` id.
    pub fn new(target: serde_json::Value, content: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: new_annotation_id(),
            target,
            style: None,
            content: content.into(),
            author: author.into(),
            created_at: crate::now_millis(),
        }
    }
}

/// The per-file annotation list, versioned for sidecar migrations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

fn default_version() -> u32 {
    1
}

/// Generate a fresh `ann-<uuid>` id.
pub fn new_annotation_id() -> String {
    format!("{}{}", ANNOTATION_ID_PREFIX, uuid::Uuid::new_v4())
}

/// Check whether a string is a well-formed annotation id.
pub fn is_annotation_id(s: &str) -> bool {
    s.strip_prefix(ANNOTATION_ID_PREFIX)
        .is_some_and(|rest| uuid::Uuid::parse_str(rest).is_ok())
}

// ============================================================================
// Tests
// ============================================================================
