//! Post-processing for Mermaid diagram blocks embedded in generated Markdown.
//!
//! Every pass works on the body of one fenced diagram block. The transform is
//! idempotent: running [`sanitize`] on its own output changes nothing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::fence::{Block, is_closing_fence, split_blocks};

/// Declaration inserted when a diagram block has none.
pub const DEFAULT_DECLARATION: &str = "graph TD";

/// Direction used when a flowchart declaration has none.
const DEFAULT_DIRECTION: &str = "TD";

/// Indent applied to every line after the declaration.
const BODY_INDENT: &str = "    ";

/// Flowchart keywords that take a direction.
const FLOW_KEYWORDS: &[&str] = &["graph", "flowchart"];

/// Other diagram keywords (no direction).
const OTHER_KEYWORDS: &[&str] = &[
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "gantt",
    "pie",
    "journey",
    "gitGraph",
    "mindmap",
    "timeline",
    "quadrantChart",
];

const DIRECTIONS: &[&str] = &["TD", "TB", "BT", "RL", "LR"];

/// Characters the diagram grammar rejects inside labels.
const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '„', '‘', '’', '«', '»'];

/// Sanitize every diagram block in `md`, leaving all other text untouched.
pub fn sanitize(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    let mut fixed = 0usize;

    for block in split_blocks(md) {
        match block {
            Block::Text(text) => out.push_str(text),
            Block::Fenced {
                open,
                lang,
                body,
                close,
            } => {
                out.push_str(open);
                if !open.ends_with('\n') {
                    out.push('\n');
                }
                if is_diagram_block(&lang, &body) {
                    fixed += 1;
                    for line in sanitize_body(&body) {
                        out.push_str(&line);
                        out.push('\n');
                    }
                } else {
                    for line in &body {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                out.push_str(close);
            }
        }
    }

    debug!(blocks = fixed, "diagram blocks sanitized");
    out
}

/// A fence is a diagram if tagged `mermaid` or if it opens with a diagram keyword.
fn is_diagram_block(lang: &str, body: &[&str]) -> bool {
    if lang == "mermaid" {
        return true;
    }
    body.iter()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.split_whitespace().next())
        .is_some_and(|tok| keyword(tok).is_some())
}

// ---------------------------------------------------------------------------
// Block body passes
// ---------------------------------------------------------------------------

fn sanitize_body(body: &[&str]) -> Vec<String> {
    let cleaned: Vec<String> = body
        .iter()
        .map(|line| clean_line(line))
        .collect();

    let Some(first_idx) = cleaned.iter().position(|l| !l.trim().is_empty()) else {
        return vec![DEFAULT_DECLARATION.to_string()];
    };

    let (declaration, inline_rest, rest_start) = match parse_declaration(&cleaned[first_idx]) {
        Some(decl) => (decl.line, decl.rest, first_idx + 1),
        None => (DEFAULT_DECLARATION.to_string(), None, first_idx),
    };

    let indentation_sensitive = declaration.starts_with("mindmap");
    let mut lines = vec![declaration];

    let body_lines = inline_rest
        .into_iter()
        .chain(cleaned[rest_start..].iter().cloned());

    for line in body_lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.push(String::new());
            continue;
        }
        if is_bare_declaration(trimmed) {
            // Duplicate declaration further down the block
            continue;
        }
        if is_closing_fence(trimmed) {
            // Cleanup left a bare fence that would end the block on the next pass
            continue;
        }
        if indentation_sensitive {
            lines.push(line.trim_end().to_string());
        } else {
            lines.push(format!("{BODY_INDENT}{trimmed}"));
        }
    }

    // Trailing blank lines add nothing inside a fence
    while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines
}

/// Strip links and quotes until nothing changes; both passes only delete characters.
fn clean_line(line: &str) -> String {
    let mut current = line.to_string();
    loop {
        let next = strip_quotes(&strip_links(&current));
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Remove Markdown links (and the bold markup wrapping them), keeping the link text.
fn strip_links(line: &str) -> String {
    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        // Allows one level of balanced parentheses inside the URL
        Regex::new(r"\*{0,2}\[([^\[\]]*)\]\((?:[^()\s]|\([^()\s]*\))*\)\*{0,2}")
            .expect("valid regex")
    });
    static LEFTOVER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\]\(\s*https?:[^)\s]*\)?").expect("valid regex")
    });

    let mut current = line.to_string();
    loop {
        let next = LINK_RE.replace_all(&current, "$1").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    LEFTOVER_RE.replace_all(&current, "").into_owned()
}

fn strip_quotes(line: &str) -> String {
    line.chars().filter(|c| !QUOTE_CHARS.contains(c)).collect()
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// Canonical spelling of a diagram keyword token, if it is one.
fn keyword(token: &str) -> Option<&'static str> {
    let token = token.trim_end_matches(';');
    FLOW_KEYWORDS
        .iter()
        .chain(OTHER_KEYWORDS)
        .find(|k| k.eq_ignore_ascii_case(token))
        .copied()
}

fn direction(token: &str) -> Option<&'static str> {
    let token = token.trim_end_matches(';');
    DIRECTIONS
        .iter()
        .find(|d| d.eq_ignore_ascii_case(token))
        .copied()
}

struct Declaration {
    /// Normalized declaration line.
    line: String,
    /// Diagram content that shared the declaration line.
    rest: Option<String>,
}

/// Parse a declaration line, collapsing repeated keyword/direction tokens.
fn parse_declaration(line: &str) -> Option<Declaration> {
    let mut tokens = line.split_whitespace();
    let kw = keyword(tokens.next()?)?;
    let remaining: Vec<&str> = tokens.collect();

    if FLOW_KEYWORDS.contains(&kw) {
        let mut dir: Option<&str> = None;
        let mut idx = 0;
        while idx < remaining.len() {
            let tok = remaining[idx];
            if keyword(tok) == Some(kw) {
                idx += 1;
            } else if let Some(d) = direction(tok) {
                dir.get_or_insert(d);
                idx += 1;
            } else {
                break;
            }
        }
        let rest = remaining[idx..].join(" ");
        Some(Declaration {
            line: format!("{kw} {}", dir.unwrap_or(DEFAULT_DIRECTION)),
            rest: (!rest.is_empty()).then_some(rest),
        })
    } else {
        let args: Vec<&str> = remaining
            .into_iter()
            .skip_while(|tok| keyword(tok) == Some(kw))
            .collect();
        let line = if args.is_empty() {
            kw.to_string()
        } else {
            format!("{kw} {}", args.join(" "))
        };
        Some(Declaration { line, rest: None })
    }
}

/// A line made only of declaration tokens, e.g. a second `graph TD`.
fn is_bare_declaration(line: &str) -> bool {
    let mut tokens = line.split_whitespace();
    let Some(kw) = tokens.next().and_then(keyword) else {
        return false;
    };
    let rest: Vec<&str> = tokens.collect();
    if FLOW_KEYWORDS.contains(&kw) {
        rest.iter()
            .all(|t| direction(t).is_some() || keyword(t) == Some(kw))
    } else {
        rest.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
