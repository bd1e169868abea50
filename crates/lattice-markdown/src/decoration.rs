//! Decoration emission: elements → ranged view instructions.
//!
//! A decoration tells the view layer to hide a range, replace it with a
//! widget, or style it. Widget specs are data, not code; the view layer
//! pattern-matches on them. Every decoration carries its owning element's
//! range so the cursor reveal rule can suppress it, and hide/widget
//! decorations are visibility-off: the hidden bytes keep their layout space
//! so document height and cursor arithmetic stay stable.

use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementKind, Span};

/// Data-only widget descriptions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum WidgetSpec {
    Math { latex: String, display: bool },
    Image { src: String, alt: String },
    CodeBlock { language: Option<String>, body: String },
    Hr,
}

/// What a decoration does to its range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecorationKind {
    /// Hide the bytes (visibility-off, space preserved).
    Hide,
    /// Replace the bytes with a rendered widget.
    Widget(WidgetSpec),
    /// Apply a style class to the bytes.
    Style { class: String },
}

/// A single view instruction over a byte range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decoration {
    pub range: Span,
    pub kind: DecorationKind,
    /// The owning element's full range; drives cursor-context reveal.
    pub owner: Span,
    /// Set by the view mask when the cursor is inside `owner`.
    pub suppressed: bool,
    /// Extra data for the view layer (annotation link ids, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Decoration {
    fn hide(range: Span, owner: Span) -> Self {
        Self { range, kind: DecorationKind::Hide, owner, suppressed: false, meta: None }
    }

    fn style(range: Span, owner: Span, class: impl Into<String>) -> Self {
        Self {
            range,
            kind: DecorationKind::Style { class: class.into() },
            owner,
            suppressed: false,
            meta: None,
        }
    }

    fn widget(range: Span, owner: Span, spec: WidgetSpec) -> Self {
        Self { range, kind: DecorationKind::Widget(spec), owner, suppressed: false, meta: None }
    }

    /// Whether the decoration participates in cursor reveal. Style spans
    /// stay applied on the revealed raw text; hides and widgets lift.
    pub fn revealable(&self) -> bool {
        !matches!(self.kind, DecorationKind::Style { .. })
    }

    /// Hide and widget decorations preserve the layout space of the bytes
    /// they cover.
    pub fn preserves_space(&self) -> bool {
        self.revealable()
    }
}

/// Emit the decorations for one element.
pub fn emit(element: &Element, buffer: &str) -> Vec<Decoration> {
    let range = element.range;
    match &element.kind {
        ElementKind::Heading { level } => {
            let mut out = vec![Decoration::style(range, range, format!("heading-{level}"))];
            if let Some(inner) = element.inner {
                out.push(Decoration::hide(Span::new(range.from, inner.from), range));
            }
            out
        }
        ElementKind::Bold => emphasis(element, "bold"),
        ElementKind::Italic => emphasis(element, "italic"),
        ElementKind::BoldItalic => emphasis(element, "bold-italic"),
        ElementKind::Strikethrough => emphasis(element, "strikethrough"),
        ElementKind::Highlight => emphasis(element, "highlight"),
        ElementKind::InlineCode => emphasis(element, "code-inline"),
        ElementKind::CodeBlock { language } => {
            vec![Decoration::widget(
                range,
                range,
                WidgetSpec::CodeBlock {
                    language: language.clone(),
                    body: fence_body(&buffer[range.from..range.to.min(buffer.len())]),
                },
            )]
        }
        ElementKind::InlineMath { latex } => math(range, latex, false),
        ElementKind::BlockMath { latex } => math(range, latex, true),
        ElementKind::Link { .. } => {
            let mut out = Vec::new();
            match element.inner {
                Some(inner) => {
                    out.push(Decoration::style(inner, range, "link"));
                    out.push(Decoration::hide(Span::new(range.from, inner.from), range));
                    out.push(Decoration::hide(Span::new(inner.to, range.to), range));
                }
                None => out.push(Decoration::style(range, range, "link")),
            }
            out
        }
        ElementKind::Image { src, alt } => {
            vec![Decoration::widget(
                range,
                range,
                WidgetSpec::Image { src: src.clone(), alt: alt.clone() },
            )]
        }
        ElementKind::ListItem { marker, .. } => {
            let mut out = vec![Decoration::hide(*marker, range)];
            if let Some(inner) = element.inner {
                out.push(Decoration::style(inner, range, "list-item"));
            }
            out
        }
        ElementKind::Blockquote { level } => {
            vec![Decoration::style(range, range, format!("blockquote-{level}"))]
        }
        ElementKind::HorizontalRule => {
            vec![Decoration::widget(range, range, WidgetSpec::Hr)]
        }
        ElementKind::Table => vec![Decoration::style(range, range, "table")],
        ElementKind::HtmlBlock => vec![Decoration::style(range, range, "html-block")],
        ElementKind::AnnotationLink { file_id, annotation_id } => {
            let mut deco = Decoration::style(range, range, "annotation-link");
            deco.meta = Some(serde_json::json!({
                "fileId": file_id,
                "annotationId": annotation_id,
            }));
            vec![deco]
        }
        ElementKind::Wikilink { .. } => {
            let mut out = Vec::new();
            match element.inner {
                Some(inner) => {
                    out.push(Decoration::style(inner, range, "wikilink"));
                    out.push(Decoration::hide(Span::new(range.from, inner.from), range));
                    out.push(Decoration::hide(Span::new(inner.to, range.to), range));
                }
                None => out.push(Decoration::style(range, range, "wikilink")),
            }
            out
        }
    }
}

/// Style the inner content, hide the opener and closer markers.
fn emphasis(element: &Element, class: &str) -> Vec<Decoration> {
    let range = element.range;
    let Some(inner) = element.inner else {
        return vec![Decoration::style(range, range, class)];
    };
    vec![
        Decoration::style(inner, range, class),
        Decoration::hide(Span::new(range.from, inner.from), range),
        Decoration::hide(Span::new(inner.to, range.to), range),
    ]
}

/// Math widget, degraded to a `math-error` style span when the latex is
/// empty or carries a null byte. The error path never hides anything.
fn math(range: Span, latex: &str, display: bool) -> Vec<Decoration> {
    if latex.is_empty() || latex.contains('\0') {
        return vec![Decoration::style(range, range, "math-error")];
    }
    vec![Decoration::widget(
        range,
        range,
        WidgetSpec::Math { latex: latex.to_string(), display },
    )]
}

/// Strip the fence delimiter lines from a code block's raw text.
fn fence_body(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.split_inclusive('\n').collect();
    if !lines.is_empty() {
        lines.remove(0); // opening fence
    }
    if let Some(last) = lines.last() {
        if last.trim_end().starts_with("```") {
            lines.pop();
        }
    }
    lines.concat()
}

/// Merge decorations into a deterministic set: sorted by range start, exact
/// duplicates collapsed (emission is idempotent per line, so re-emitting a
/// cached line must not double anything).
pub fn merge(mut decorations: Vec<Decoration>) -> Vec<Decoration> {
    decorations.sort_by(|a, b| {
        a.range
            .from
            .cmp(&b.range.from)
            .then(a.range.to.cmp(&b.range.to))
            .then(kind_rank(&a.kind).cmp(&kind_rank(&b.kind)))
    });
    decorations.dedup();
    decorations
}

fn kind_rank(kind: &DecorationKind) -> u8 {
    match kind {
        DecorationKind::Style { .. } => 0,
        DecorationKind::Widget(_) => 1,
        DecorationKind::Hide => 2,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn emit_all(text: &str) -> Vec<Decoration> {
        let mut out = Vec::new();
        for el in parse(text) {
            out.extend(emit(&el, text));
        }
        merge(out)
    }

    #[test]
    fn test_bold_emission_matches_reveal_scenario() {
        // `**hello**` → exactly StyleSpan(2..7) + Hide(0..2) + Hide(7..9).
        let decos = emit_all("**hello**");
        assert_eq!(decos.len(), 3);
        assert_eq!(decos[0].range, Span::new(0, 2));
        assert_eq!(decos[0].kind, DecorationKind::Hide);
        assert_eq!(decos[1].range, Span::new(2, 7));
        assert_eq!(decos[1].kind, DecorationKind::Style { class: "bold".into() });
        assert_eq!(decos[2].range, Span::new(7, 9));
        assert_eq!(decos[2].kind, DecorationKind::Hide);
    }

    #[test]
    fn test_block_math_widget() {
        // Display math becomes a single widget over the full syntax range.
        let decos = emit_all("$$x^2 + y^2 = z^2$$");
        assert_eq!(decos.len(), 1);
        assert_eq!(decos[0].range, Span::new(0, 19));
        assert_eq!(
            decos[0].kind,
            DecorationKind::Widget(WidgetSpec::Math {
                latex: "x^2 + y^2 = z^2".into(),
                display: true,
            })
        );
    }

    #[test]
    fn test_invalid_math_degrades_to_error_span() {
        let el = Element::new(
            ElementKind::BlockMath { latex: String::new() },
            Span::new(0, 4),
        );
        let decos = emit(&el, "$$$$");
        assert_eq!(decos.len(), 1);
        assert_eq!(decos[0].kind, DecorationKind::Style { class: "math-error".into() });
        // Nothing is hidden on the error path.
        assert!(!decos[0].revealable());
    }

    #[test]
    fn test_null_byte_latex_rejected() {
        let el = Element::new(
            ElementKind::InlineMath { latex: "a\0b".into() },
            Span::new(0, 5),
        );
        let decos = emit(&el, "$a\0b$");
        assert_eq!(decos[0].kind, DecorationKind::Style { class: "math-error".into() });
    }

    #[test]
    fn test_heading_hides_marker_only() {
        let decos = emit_all("## Title\n");
        let hide = decos.iter().find(|d| d.kind == DecorationKind::Hide).unwrap();
        assert_eq!(hide.range, Span::new(0, 3)); // "## " (hashes + one space)
        let style = decos
            .iter()
            .find(|d| matches!(&d.kind, DecorationKind::Style { class } if class == "heading-2"))
            .unwrap();
        assert_eq!(style.range, Span::new(0, 9));
    }

    #[test]
    fn test_code_block_widget_body() {
        let text = "```py\nprint(1)\nprint(2)\n```\n";
        let decos = emit_all(text);
        assert_eq!(decos.len(), 1);
        let DecorationKind::Widget(WidgetSpec::CodeBlock { language, body }) = &decos[0].kind
        else {
            panic!("expected code block widget");
        };
        assert_eq!(language.as_deref(), Some("py"));
        assert_eq!(body, "print(1)\nprint(2)\n");
    }

    #[test]
    fn test_link_hides_brackets_and_url() {
        let decos = emit_all("[text](https://x)");
        let hides: Vec<Span> = decos
            .iter()
            .filter(|d| d.kind == DecorationKind::Hide)
            .map(|d| d.range)
            .collect();
        assert_eq!(hides, vec![Span::new(0, 1), Span::new(5, 17)]);
    }

    #[test]
    fn test_list_marker_hidden() {
        let decos = emit_all("- item\n");
        let hide = decos.iter().find(|d| d.kind == DecorationKind::Hide).unwrap();
        assert_eq!(hide.range, Span::new(0, 2));
    }

    #[test]
    fn test_annotation_link_carries_metadata() {
        let decos = emit_all("[[p.pdf#ann-6a204bd8-9af0-4bb5-8be5-24ce57e0b0d2]]\n");
        let ann = decos
            .iter()
            .find(|d| matches!(&d.kind, DecorationKind::Style { class } if class == "annotation-link"))
            .unwrap();
        let meta = ann.meta.as_ref().unwrap();
        assert_eq!(meta["fileId"], "p.pdf");
        assert_eq!(meta["annotationId"], "ann-6a204bd8-9af0-4bb5-8be5-24ce57e0b0d2");
    }

    #[test]
    fn test_image_and_hr_are_widgets() {
        let decos = emit_all("![alt](p.png)\n");
        assert!(matches!(
            decos[0].kind,
            DecorationKind::Widget(WidgetSpec::Image { .. })
        ));
        let decos = emit_all("\n---\n\n");
        assert!(decos.iter().any(|d| d.kind == DecorationKind::Widget(WidgetSpec::Hr)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let decos = emit_all("**a** *b*\n");
        let doubled: Vec<Decoration> =
            decos.iter().chain(decos.iter()).cloned().collect();
        assert_eq!(merge(doubled), decos);
    }

    #[test]
    fn test_hide_preserves_space() {
        let decos = emit_all("**a**\n");
        for d in decos.iter().filter(|d| d.kind == DecorationKind::Hide) {
            assert!(d.preserves_space());
        }
    }
}
