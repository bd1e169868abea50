//! The markdown parser: a single linear pass emitting elements in document
//! order.
//!
//! Block structure is resolved line by line with a small state stack
//! (code fence, multi-line math, HTML block); inline elements are then
//! matched left-to-right, greedy and non-overlapping, within the remaining
//! text of non-code lines. The parser is total: malformed input yields
//! fewer elements, never an error, and `parse(b) == parse(b)` always.

use std::sync::LazyLock;

use regex::Regex;

use lattice_types::is_annotation_id;

use crate::element::{Element, ElementKind, Span};

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```([A-Za-z0-9_+\-]*)\s*$").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([ \t]*)([-*+]|\d{1,9}[.)]) ").unwrap());
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(>+)\s?").unwrap());
static MATH_SINGLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$\$(.+)\$\$$").unwrap());
static HTML_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<[A-Za-z!/]").unwrap());
static TABLE_ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\|").unwrap());

// Inline patterns, in tie-break priority order (leftmost match still wins).
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").unwrap());
static WIKILINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD_ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*\*([^*]+)\*\*\*").unwrap());
static BOLD_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static BOLD_UNDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__([^_]+)__").unwrap());
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static ITALIC_UNDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_([^_]+)_").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~([^~]+)~~").unwrap());
static HIGHLIGHT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"==([^=]+)==").unwrap());
static INLINE_MATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([^$]+)\$").unwrap());

/// A buffer line with its byte offsets.
#[derive(Clone, Copy, Debug)]
struct Line<'a> {
    /// Offset of the first byte of the line.
    start: usize,
    /// Offset past the last content byte (excluding the newline).
    content_end: usize,
    /// Offset past the line terminator (equals `content_end` on the final
    /// unterminated line).
    full_end: usize,
    text: &'a str,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in text.split_inclusive('\n') {
        let full_end = start + raw.len();
        let content = raw.strip_suffix('\n').unwrap_or(raw);
        lines.push(Line {
            start,
            content_end: start + content.len(),
            full_end,
            text: content,
        });
        start = full_end;
    }
    if text.is_empty() || text.ends_with('\n') {
        // A trailing newline opens one final empty line.
        lines.push(Line { start, content_end: start, full_end: start, text: "" });
    }
    lines
}

/// Parse a buffer into elements, in document order.
pub fn parse(text: &str) -> Vec<Element> {
    let lines = split_lines(text);
    let mut out = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        // ── Code fence ──
        if let Some(caps) = FENCE.captures(line.text) {
            let language = match caps.get(1).map(|m| m.as_str()) {
                Some("") | None => None,
                Some(lang) => Some(lang.to_string()),
            };
            // Find the closing fence; an unterminated fence runs to EOF.
            let mut j = i + 1;
            while j < lines.len() && !FENCE.is_match(lines[j].text) {
                j += 1;
            }
            let (end, close_idx) = if j < lines.len() {
                (lines[j].full_end, j)
            } else {
                (lines[lines.len() - 1].full_end, lines.len() - 1)
            };
            if end > line.start {
                out.push(Element::new(
                    ElementKind::CodeBlock { language },
                    Span::new(line.start, end),
                ));
            }
            i = close_idx + 1;
            continue;
        }

        // ── Multi-line block math: `$$` or `$` alone opens ──
        if line.text == "$$" || line.text == "$" {
            let delim = line.text;
            let mut j = i + 1;
            while j < lines.len() && lines[j].text != delim {
                j += 1;
            }
            if j < lines.len() {
                let latex: Vec<&str> = lines[i + 1..j].iter().map(|l| l.text).collect();
                out.push(Element::new(
                    ElementKind::BlockMath { latex: latex.join("\n") },
                    Span::new(line.start, lines[j].content_end),
                ));
                i = j + 1;
                continue;
            }
            // No closer: the bare delimiter is plain text.
            i += 1;
            continue;
        }

        // ── Single-line block math ──
        if let Some(caps) = MATH_SINGLE_LINE.captures(line.text) {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            out.push(Element::new(
                ElementKind::BlockMath { latex: body.to_string() },
                Span::new(line.start, line.content_end),
            ));
            i += 1;
            continue;
        }

        // ── Horizontal rule (blank lines on both sides) ──
        if (line.text == "---" || line.text == "***")
            && (i == 0 || lines[i - 1].text.trim().is_empty())
            && (i + 1 >= lines.len() || lines[i + 1].text.trim().is_empty())
        {
            out.push(Element::new(
                ElementKind::HorizontalRule,
                Span::new(line.start, line.full_end),
            ));
            i += 1;
            continue;
        }

        // ── Heading ──
        if let Some(caps) = HEADING.captures(line.text) {
            let hashes = caps.get(1).map_or(0, |m| m.len());
            let inner_from = line.start + hashes + 1;
            out.push(Element::with_inner(
                ElementKind::Heading { level: hashes as u8 },
                Span::new(line.start, line.full_end),
                Span::new(inner_from, line.content_end),
            ));
            parse_inline(&text[inner_from..line.content_end], inner_from, &mut out);
            i += 1;
            continue;
        }

        // ── Blockquote group (equal-level run) ──
        if let Some(caps) = BLOCKQUOTE.captures(line.text) {
            let level = caps.get(1).map_or(1, |m| m.len());
            let mut j = i;
            let mut inline_segments = Vec::new();
            while j < lines.len() {
                let Some(c) = BLOCKQUOTE.captures(lines[j].text) else { break };
                if c.get(1).map_or(1, |m| m.len()) != level {
                    break;
                }
                let marker_len = c.get(0).map_or(0, |m| m.len());
                inline_segments.push((lines[j].start + marker_len, lines[j].content_end));
                j += 1;
            }
            let end = lines[j - 1].full_end;
            out.push(Element::new(
                ElementKind::Blockquote { level: level as u8 },
                Span::new(lines[i].start, end),
            ));
            for (from, to) in inline_segments {
                if from < to {
                    parse_inline(&text[from..to], from, &mut out);
                }
            }
            i = j;
            continue;
        }

        // ── List item ──
        if let Some(caps) = LIST_ITEM.captures(line.text) {
            let indent = caps.get(1).map_or(0, |m| m.len());
            let marker = caps.get(2).map_or("", |m| m.as_str());
            let ordered = marker.chars().next().is_some_and(|c| c.is_ascii_digit());
            let marker_from = line.start + indent;
            // The marker range includes its trailing space.
            let marker_to = marker_from + marker.len() + 1;
            let level = (indent / 2) as u8;
            let mut element = Element::new(
                ElementKind::ListItem {
                    level,
                    ordered,
                    marker: Span::new(marker_from, marker_to),
                },
                Span::new(line.start, line.full_end),
            );
            if marker_to < line.content_end {
                element.inner = Some(Span::new(marker_to, line.content_end));
            }
            out.push(element);
            if marker_to < line.content_end {
                parse_inline(&text[marker_to..line.content_end], marker_to, &mut out);
            }
            i += 1;
            continue;
        }

        // ── Table (run of pipe-led lines) ──
        if TABLE_ROW.is_match(line.text) {
            let mut j = i;
            while j < lines.len() && TABLE_ROW.is_match(lines[j].text) {
                j += 1;
            }
            let end = lines[j - 1].full_end;
            out.push(Element::new(ElementKind::Table, Span::new(line.start, end)));
            i = j;
            continue;
        }

        // ── HTML block (runs to the next blank line) ──
        if HTML_OPEN.is_match(line.text) {
            let mut j = i;
            while j < lines.len() && !lines[j].text.trim().is_empty() {
                j += 1;
            }
            let end = lines[j - 1].full_end;
            out.push(Element::new(ElementKind::HtmlBlock, Span::new(line.start, end)));
            i = j;
            continue;
        }

        // ── Plain paragraph line: inline only ──
        if !line.text.is_empty() {
            parse_inline(line.text, line.start, &mut out);
        }
        i += 1;
    }

    // Parents before children: sort by start, wider range first on ties.
    out.sort_by(|a, b| {
        a.range
            .from
            .cmp(&b.range.from)
            .then(b.range.to.cmp(&a.range.to))
    });
    out
}

/// One inline pattern's next candidate match.
struct Candidate {
    start: usize,
    end: usize,
    element: Element,
}

/// Parse inline elements within `segment` (a slice of one line), appending
/// elements with buffer offsets (`base` = segment start in the buffer).
fn parse_inline(segment: &str, base: usize, out: &mut Vec<Element>) {
    let mut pos = 0;
    while pos < segment.len() {
        let mut best: Option<Candidate> = None;
        for finder in [
            find_image,
            find_link,
            find_wikilink,
            find_inline_code,
            find_bold_italic,
            find_bold,
            find_italic,
            find_strike,
            find_highlight,
            find_inline_math,
        ] {
            if let Some(c) = finder(segment, pos, base) {
                let better = match &best {
                    None => true,
                    Some(b) => c.start < b.start,
                };
                if better {
                    best = Some(c);
                }
            }
        }
        match best {
            Some(c) => {
                pos = c.end;
                out.push(c.element);
            }
            None => break,
        }
    }
}

fn span_at(base: usize, m: &regex::Match<'_>) -> Span {
    Span::new(base + m.start(), base + m.end())
}

fn find_image(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    let caps = IMAGE.captures_at(s, pos)?;
    let whole = caps.get(0)?;
    Some(Candidate {
        start: whole.start(),
        end: whole.end(),
        element: Element::new(
            ElementKind::Image {
                src: caps.get(2).map_or(String::new(), |m| m.as_str().to_string()),
                alt: caps.get(1).map_or(String::new(), |m| m.as_str().to_string()),
            },
            span_at(base, &whole),
        ),
    })
}

fn find_link(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    let caps = LINK.captures_at(s, pos)?;
    let whole = caps.get(0)?;
    let text = caps.get(1)?;
    let mut element = Element::new(
        ElementKind::Link {
            href: caps.get(2).map_or(String::new(), |m| m.as_str().to_string()),
        },
        span_at(base, &whole),
    );
    if text.start() < text.end() {
        element.inner = Some(Span::new(base + text.start(), base + text.end()));
    }
    Some(Candidate { start: whole.start(), end: whole.end(), element })
}

fn find_wikilink(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    let caps = WIKILINK.captures_at(s, pos)?;
    let whole = caps.get(0)?;
    let target = caps.get(1)?;
    let kind = match target.as_str().split_once('#') {
        Some((file, ann)) if is_annotation_id(ann) => ElementKind::AnnotationLink {
            file_id: file.to_string(),
            annotation_id: ann.to_string(),
        },
        _ => ElementKind::Wikilink { target: target.as_str().to_string() },
    };
    Some(Candidate {
        start: whole.start(),
        end: whole.end(),
        element: Element::with_inner(
            kind,
            span_at(base, &whole),
            Span::new(base + target.start(), base + target.end()),
        ),
    })
}

fn find_inline_code(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    simple_pair(&INLINE_CODE, ElementKind::InlineCode, s, pos, base)
}

fn find_bold_italic(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    simple_pair(&BOLD_ITALIC, ElementKind::BoldItalic, s, pos, base)
}

fn find_bold(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    earliest(
        simple_pair(&BOLD_STAR, ElementKind::Bold, s, pos, base),
        simple_pair(&BOLD_UNDER, ElementKind::Bold, s, pos, base),
    )
}

fn find_italic(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    earliest(
        simple_pair(&ITALIC_STAR, ElementKind::Italic, s, pos, base),
        simple_pair(&ITALIC_UNDER, ElementKind::Italic, s, pos, base),
    )
}

fn find_strike(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    simple_pair(&STRIKE, ElementKind::Strikethrough, s, pos, base)
}

fn find_highlight(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    simple_pair(&HIGHLIGHT, ElementKind::Highlight, s, pos, base)
}

/// Inline math with the `$` digit-adjacency guards: the opening `$` must not
/// be preceded by a digit and must be followed by a non-whitespace char; the
/// closing `$` must not be followed by a digit. (Keeps `$5 and $6` prose out
/// of math mode.)
fn find_inline_math(s: &str, pos: usize, base: usize) -> Option<Candidate> {
    let mut search = pos;
    while search < s.len() {
        let caps = INLINE_MATH.captures_at(s, search)?;
        let whole = caps.get(0)?;
        let body = caps.get(1)?;
        let before_ok = whole.start() == 0
            || !s[..whole.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_digit());
        let after_ok = !s[whole.end()..].chars().next().is_some_and(|c| c.is_ascii_digit());
        let body_ok = body.as_str().chars().next().is_some_and(|c| !c.is_whitespace());
        if before_ok && after_ok && body_ok {
            return Some(Candidate {
                start: whole.start(),
                end: whole.end(),
                element: Element::with_inner(
                    ElementKind::InlineMath { latex: body.as_str().to_string() },
                    span_at(base, &whole),
                    Span::new(base + body.start(), base + body.end()),
                ),
            });
        }
        search = whole.start() + 1;
    }
    None
}

fn simple_pair(
    re: &Regex,
    kind: ElementKind,
    s: &str,
    pos: usize,
    base: usize,
) -> Option<Candidate> {
    let caps = re.captures_at(s, pos)?;
    let whole = caps.get(0)?;
    let inner = caps.get(1)?;
    Some(Candidate {
        start: whole.start(),
        end: whole.end(),
        element: Element::with_inner(
            kind,
            span_at(base, &whole),
            Span::new(base + inner.start(), base + inner.end()),
        ),
    })
}

fn earliest(a: Option<Candidate>, b: Option<Candidate>) -> Option<Candidate> {
    match (a, b) {
        (Some(x), Some(y)) => Some(if y.start < x.start { y } else { x }),
        (x, None) => x,
        (None, y) => y,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(elements: &[Element]) -> Vec<&ElementKind> {
        elements.iter().map(|e| &e.kind).collect()
    }

    #[test]
    fn test_bold_full_syntax_range() {
        let els = parse("**hello**");
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].kind, ElementKind::Bold);
        assert_eq!(els[0].range, Span::new(0, 9));
        assert_eq!(els[0].inner, Some(Span::new(2, 7)));
    }

    #[test]
    fn test_single_line_block_math() {
        // 19 characters; latex excludes the delimiters.
        let els = parse("$$x^2 + y^2 = z^2$$");
        assert_eq!(els.len(), 1);
        assert_eq!(
            els[0].kind,
            ElementKind::BlockMath { latex: "x^2 + y^2 = z^2".into() }
        );
        assert_eq!(els[0].range, Span::new(0, 19));
    }

    #[test]
    fn test_multi_line_block_math() {
        let text = "$$\na+b\n$$\n";
        let els = parse(text);
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].kind, ElementKind::BlockMath { latex: "a+b".into() });
        assert_eq!(els[0].range, Span::new(0, 9));
    }

    #[test]
    fn test_heading_range_includes_newline_and_markers() {
        let els = parse("## Title\nbody\n");
        assert_eq!(els[0].kind, ElementKind::Heading { level: 2 });
        assert_eq!(els[0].range, Span::new(0, 9));
        assert_eq!(els[0].inner, Some(Span::new(3, 8)));
    }

    #[test]
    fn test_heading_preserves_author_whitespace() {
        // Only the hashes and ONE space belong to the marker.
        let els = parse("#   padded\n");
        assert_eq!(els[0].inner, Some(Span::new(2, 10)));
    }

    #[test]
    fn test_code_fence_single_element_no_inline() {
        let text = "```rust\nlet x = **not bold**;\n```\n";
        let els = parse(text);
        assert_eq!(els.len(), 1);
        assert_eq!(
            els[0].kind,
            ElementKind::CodeBlock { language: Some("rust".into()) }
        );
        assert_eq!(els[0].range, Span::new(0, text.len()));
    }

    #[test]
    fn test_unterminated_fence_runs_to_eof() {
        let text = "```\ncode";
        let els = parse(text);
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].range, Span::new(0, text.len()));
    }

    #[test]
    fn test_horizontal_rule_needs_blank_neighbors() {
        let with_blanks = parse("a\n\n---\n\nb\n");
        assert!(with_blanks.iter().any(|e| e.kind == ElementKind::HorizontalRule));
        let crowded = parse("a\n---\nb\n");
        assert!(!crowded.iter().any(|e| e.kind == ElementKind::HorizontalRule));
    }

    #[test]
    fn test_blockquote_grouping_by_level() {
        let els = parse("> a\n> b\n>> deep\nplain\n");
        let quotes: Vec<&Element> = els
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::Blockquote { .. }))
            .collect();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].kind, ElementKind::Blockquote { level: 1 });
        assert_eq!(quotes[0].range, Span::new(0, 8));
        assert_eq!(quotes[1].kind, ElementKind::Blockquote { level: 2 });
    }

    #[test]
    fn test_list_item_marker_range() {
        let els = parse("- item\n");
        let ElementKind::ListItem { level, ordered, marker } = &els[0].kind else {
            panic!("expected list item, got {:?}", els[0].kind);
        };
        assert_eq!(*level, 0);
        assert!(!ordered);
        // Marker covers "- " exactly, including the trailing space.
        assert_eq!(*marker, Span::new(0, 2));
        assert_eq!(els[0].inner, Some(Span::new(2, 6)));
    }

    #[test]
    fn test_ordered_nested_list_item() {
        let els = parse("  2. second\n");
        let ElementKind::ListItem { level, ordered, marker } = &els[0].kind else {
            panic!("expected list item");
        };
        assert_eq!(*level, 1);
        assert!(ordered);
        assert_eq!(*marker, Span::new(2, 5));
    }

    #[test]
    fn test_inline_inside_heading() {
        let els = parse("# **bold** title\n");
        assert!(matches!(els[0].kind, ElementKind::Heading { level: 1 }));
        assert_eq!(els[1].kind, ElementKind::Bold);
        assert_eq!(els[1].range, Span::new(2, 10));
    }

    #[test]
    fn test_emphasis_variants() {
        let els = parse("*i* **b** ***bi*** ~~s~~ ==h== `c`\n");
        assert_eq!(
            kinds(&els),
            vec![
                &ElementKind::Italic,
                &ElementKind::Bold,
                &ElementKind::BoldItalic,
                &ElementKind::Strikethrough,
                &ElementKind::Highlight,
                &ElementKind::InlineCode,
            ]
        );
    }

    #[test]
    fn test_link_and_image() {
        let els = parse("[text](https://x) ![alt](pic.png)\n");
        assert_eq!(els[0].kind, ElementKind::Link { href: "https://x".into() });
        assert_eq!(els[0].inner, Some(Span::new(1, 5)));
        assert_eq!(
            els[1].kind,
            ElementKind::Image { src: "pic.png".into(), alt: "alt".into() }
        );
    }

    #[test]
    fn test_image_not_parsed_as_link() {
        let els = parse("![alt](pic.png)\n");
        assert_eq!(els.len(), 1);
        assert!(matches!(els[0].kind, ElementKind::Image { .. }));
    }

    #[test]
    fn test_wikilink_and_annotation_link() {
        let els = parse("[[notes/other]] [[paper.pdf#ann-6a204bd8-9af0-4bb5-8be5-24ce57e0b0d2]]\n");
        assert_eq!(els[0].kind, ElementKind::Wikilink { target: "notes/other".into() });
        assert_eq!(
            els[1].kind,
            ElementKind::AnnotationLink {
                file_id: "paper.pdf".into(),
                annotation_id: "ann-6a204bd8-9af0-4bb5-8be5-24ce57e0b0d2".into(),
            }
        );
    }

    #[test]
    fn test_wikilink_with_non_annotation_fragment() {
        let els = parse("[[file#section]]\n");
        assert_eq!(els[0].kind, ElementKind::Wikilink { target: "file#section".into() });
    }

    #[test]
    fn test_inline_math_guards() {
        // Dollar amounts stay prose.
        assert!(parse("$5 and $6\n").is_empty());
        // Digit before the opener blocks it.
        assert!(parse("win 1$x$\n").is_empty());
        // Whitespace right after the opener blocks it.
        assert!(parse("a $ x$ b\n").is_empty());
        // A clean pair parses.
        let els = parse("value $x+y$ here\n");
        assert_eq!(els[0].kind, ElementKind::InlineMath { latex: "x+y".into() });
        assert_eq!(els[0].range, Span::new(6, 11));
    }

    #[test]
    fn test_inline_is_greedy_non_overlapping() {
        let els = parse("**a** and **b**\n");
        assert_eq!(els.len(), 2);
        assert_eq!(els[0].range, Span::new(0, 5));
        assert_eq!(els[1].range, Span::new(10, 15));
    }

    #[test]
    fn test_table_run() {
        let els = parse("| a | b |\n|---|---|\n| 1 | 2 |\n\ntext\n");
        assert_eq!(els[0].kind, ElementKind::Table);
        assert_eq!(els[0].range, Span::new(0, 30));
    }

    #[test]
    fn test_html_block_to_blank_line() {
        let els = parse("<div class=\"x\">\ncontent\n</div>\n\nafter\n");
        assert_eq!(els[0].kind, ElementKind::HtmlBlock);
        assert_eq!(els[0].range, Span::new(0, 31));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let text = "# h\n**b** *i* `c` $m$\n```\nfence\n```\n> q\n- item\n";
        assert_eq!(parse(text), parse(text));
    }

    #[test]
    fn test_all_elements_valid() {
        let text = "# h\n**b** [l](u) [[w]]\n```py\nx\n```\n$$m$$\n> q\n- li\n| t |\n";
        for el in parse(text) {
            assert!(el.is_valid(text.len()), "invalid element {el:?}");
        }
    }

    #[test]
    fn test_empty_buffer() {
        assert!(parse("").is_empty());
    }
}
