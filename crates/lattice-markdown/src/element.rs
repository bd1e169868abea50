//! Parsed markdown elements.
//!
//! An element is a byte range `[from, to)` into the buffer carrying a tag
//! from a closed set. The range always covers the full syntax including
//! markers (`**bold**` spans both `**`s); `inner` covers the content only,
//! when the element has one. Ranges may nest but never partially overlap
//! siblings of the same kind.

use serde::{Deserialize, Serialize};

/// A half-open byte range `[from, to)` into the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub from: usize,
    pub to: usize,
}

impl Span {
    pub fn new(from: usize, to: usize) -> Self {
        debug_assert!(from < to, "empty or inverted span {from}..{to}");
        Self { from, to }
    }

    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    /// Inclusive containment used by the cursor reveal rule: the cursor
    /// sitting on either boundary still counts as inside.
    pub fn contains_inclusive(&self, pos: usize) -> bool {
        pos >= self.from && pos <= self.to
    }

    /// Whether this span is valid for a buffer of `len` bytes.
    pub fn valid_for(&self, len: usize) -> bool {
        self.from < self.to && self.to <= len
    }
}

/// The closed set of element tags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum ElementKind {
    Heading { level: u8 },
    Bold,
    Italic,
    BoldItalic,
    Strikethrough,
    Highlight,
    InlineCode,
    CodeBlock { language: Option<String> },
    InlineMath { latex: String },
    BlockMath { latex: String },
    Link { href: String },
    Image { src: String, alt: String },
    ListItem { level: u8, ordered: bool, marker: Span },
    Blockquote { level: u8 },
    HorizontalRule,
    Table,
    HtmlBlock,
    AnnotationLink { file_id: String, annotation_id: String },
    Wikilink { target: String },
}

/// A parsed element: tag, full syntax range, optional inner content range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub kind: ElementKind,
    /// Full syntax range including markers.
    pub range: Span,
    /// Content-only range, when the element has one.
    pub inner: Option<Span>,
}

impl Element {
    pub fn new(kind: ElementKind, range: Span) -> Self {
        Self { kind, range, inner: None }
    }

    pub fn with_inner(kind: ElementKind, range: Span, inner: Span) -> Self {
        Self { kind, range, inner: Some(inner) }
    }

    /// Validate the element against a buffer of `len` bytes: non-empty
    /// range in bounds, inner nested within range.
    pub fn is_valid(&self, len: usize) -> bool {
        if !self.range.valid_for(len) {
            return false;
        }
        match self.inner {
            None => true,
            Some(inner) => {
                inner.valid_for(len) && inner.from >= self.range.from && inner.to <= self.range.to
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
