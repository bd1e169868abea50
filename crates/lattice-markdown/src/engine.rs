//! The decoration engine: parse, emit (with per-line caching), reveal.
//!
//! One engine instance is attached to the active markdown tab. Attaching a
//! different document resets every cache before the next emission — stale
//! per-line decorations from the previous file would otherwise duplicate
//! text in the view. Buffer edits re-parse (single linear pass) but reuse
//! cached per-line decoration emission for lines whose text and block
//! context are unchanged; cursor moves re-evaluate suppression bits only.

use std::collections::HashMap;

use tracing::debug;

use lattice_types::TabId;

use crate::decoration::{Decoration, merge};
use crate::element::{Element, Span};
use crate::parser::parse;
use crate::reveal::IntervalIndex;
use crate::{decoration, element::ElementKind};

/// Cached emission for one line, offsets relative to the line start so a
/// hit survives earlier lines changing length.
struct CachedLine {
    text: String,
    /// Whether the line sits inside a content block (fence, block math,
    /// HTML block, table). Such lines are owned by the block's decorations,
    /// not the per-line cache; the entry only forces a recompute when the
    /// block state flips.
    in_block: bool,
    decorations: Vec<Decoration>,
}

/// The live-preview decoration engine.
#[derive(Default)]
pub struct DecorationEngine {
    doc: Option<TabId>,
    buffer: String,
    elements: Vec<Element>,
    index: IntervalIndex,
    line_cache: HashMap<usize, CachedLine>,
    /// Merged decoration set for the current buffer (suppression bits clear).
    decorations: Vec<Decoration>,
    cache_hits: u64,
    cache_misses: u64,
}

impl DecorationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the engine to a document. Switching documents resets all
    /// caches before any emission.
    pub fn attach(&mut self, doc: TabId) {
        if self.doc != Some(doc) {
            debug!(%doc, "decoration engine attached, caches reset");
            *self = Self { doc: Some(doc), ..Self::default() };
        }
    }

    /// The attached document, if any.
    pub fn document(&self) -> Option<TabId> {
        self.doc
    }

    /// Replace the buffer and rebuild decorations (cache-assisted).
    pub fn update_buffer(&mut self, text: &str) {
        self.buffer = text.to_string();
        self.elements = parse(text);
        self.index = IntervalIndex::build(&self.elements);
        self.rebuild_decorations();
    }

    /// Parsed elements, document order.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Per-line cache hit/miss counters (for the performance contract).
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache_hits, self.cache_misses)
    }

    /// The decoration set with suppression evaluated for `cursor`.
    ///
    /// The set is a function of (buffer, cursor); with no cursor it is the
    /// same set with every suppression bit clear. An element is "active"
    /// when the cursor lies inside its full range (inclusive); the hide and
    /// widget decorations of active elements are suppressed so the raw
    /// markdown shows through, while style spans remain.
    pub fn decorations(&self, cursor: Option<usize>) -> Vec<Decoration> {
        let mut out = self.decorations.clone();
        if let Some(pos) = cursor {
            let active = self.index.stab(pos);
            for deco in &mut out {
                deco.suppressed = deco.revealable() && active.contains(&deco.owner);
            }
        }
        out
    }

    // ── Emission ────────────────────────────────────────────────────────────

    fn rebuild_decorations(&mut self) {
        let lines = line_spans(&self.buffer);

        // Block elements are emitted every rebuild, outside the line cache.
        let block_elements: Vec<&Element> = self
            .elements
            .iter()
            .filter(|e| is_block_kind(&e.kind))
            .collect();

        let mut all = Vec::new();
        for el in &block_elements {
            all.extend(decoration::emit(el, &self.buffer));
        }

        // Lines owned by a content block (fence, block math, HTML, table)
        // carry no inline elements; their cache entries exist only so a
        // block-state change forces a recompute. Blockquote lines keep
        // their inline decorations in the per-line pass.
        let content_blocks: Vec<&&Element> = block_elements
            .iter()
            .filter(|e| owns_lines(&e.kind))
            .collect();

        let mut fresh_cache: HashMap<usize, CachedLine> = HashMap::new();
        for (idx, line) in lines.iter().enumerate() {
            let text = &self.buffer[line.from..line.to];
            let in_block = content_blocks
                .iter()
                .any(|e| e.range.from < line.to.max(line.from + 1) && line.from < e.range.to);

            if in_block {
                fresh_cache.insert(
                    idx,
                    CachedLine { text: text.to_string(), in_block: true, decorations: Vec::new() },
                );
                continue;
            }

            let cached = self.line_cache.get(&idx);
            let decos_rel = match cached {
                Some(c) if c.text == text && !c.in_block => {
                    self.cache_hits += 1;
                    c.decorations.clone()
                }
                _ => {
                    self.cache_misses += 1;
                    let mut rel = Vec::new();
                    for el in self
                        .elements
                        .iter()
                        .filter(|e| !is_block_kind(&e.kind))
                        .filter(|e| e.range.from >= line.from && e.range.to <= line.to + 1)
                    {
                        for mut d in decoration::emit(el, &self.buffer) {
                            d.range = shift_back(d.range, line.from);
                            d.owner = shift_back(d.owner, line.from);
                            rel.push(d);
                        }
                    }
                    rel
                }
            };
            // Rebase to absolute offsets for the merged set.
            for d in &decos_rel {
                let mut abs = d.clone();
                abs.range = shift_fwd(abs.range, line.from);
                abs.owner = shift_fwd(abs.owner, line.from);
                all.push(abs);
            }
            fresh_cache.insert(
                idx,
                CachedLine { text: text.to_string(), in_block: false, decorations: decos_rel },
            );
        }
        self.line_cache = fresh_cache;
        self.decorations = merge(all);
    }
}

/// Content spans of each line (newline excluded).
fn line_spans(text: &str) -> Vec<Span> {
    let mut out = Vec::new();
    let mut start = 0;
    for raw in text.split_inclusive('\n') {
        let content_len = raw.strip_suffix('\n').unwrap_or(raw).len();
        out.push(Span { from: start, to: start + content_len });
        start += raw.len();
    }
    if text.is_empty() || text.ends_with('\n') {
        out.push(Span { from: start, to: start });
    }
    out
}

/// Elements emitted by the block pass rather than the per-line cache.
fn is_block_kind(kind: &ElementKind) -> bool {
    matches!(
        kind,
        ElementKind::CodeBlock { .. }
            | ElementKind::BlockMath { .. }
            | ElementKind::HtmlBlock
            | ElementKind::Table
            | ElementKind::Blockquote { .. }
    )
}

/// Blocks whose lines carry no inline elements of their own.
fn owns_lines(kind: &ElementKind) -> bool {
    matches!(
        kind,
        ElementKind::CodeBlock { .. }
            | ElementKind::BlockMath { .. }
            | ElementKind::HtmlBlock
            | ElementKind::Table
    )
}

fn shift_back(span: Span, base: usize) -> Span {
    Span { from: span.from - base, to: span.to - base }
}

fn shift_fwd(span: Span, base: usize) -> Span {
    Span { from: span.from + base, to: span.to + base }
}

// ============================================================================
// Tests
// ============================================================================
