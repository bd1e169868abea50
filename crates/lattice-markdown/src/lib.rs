//! # lattice-markdown
//!
//! The live-preview decoration engine. Given a markdown buffer it produces
//! ranged decorations (hide / widget / style) over the raw bytes; given a
//! cursor position it produces the reveal mask that suppresses hide and
//! widget decorations of the element under the cursor so the raw syntax
//! shows through — siblings stay rendered. The engine is total: malformed
//! input degrades to styled error spans, never an error.

pub mod decoration;
pub mod element;
pub mod engine;
pub mod parser;
pub mod reveal;

pub use decoration::{Decoration, DecorationKind, WidgetSpec, emit, merge};
pub use element::{Element, ElementKind, Span};
pub use engine::DecorationEngine;
pub use parser::parse;
pub use reveal::IntervalIndex;
