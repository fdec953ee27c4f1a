//! Line scanner that splits Markdown into plain text and fenced code blocks.

use std::ops::Range;

/// A contiguous region of a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Block<'a> {
    /// Anything outside a complete code fence, verbatim (line endings included).
    Text(&'a str),
    /// A closed code fence.
    Fenced {
        /// Opening fence line, verbatim.
        open: &'a str,
        /// Lowercased info string (`mermaid`, `rust`, ...), possibly empty.
        lang: String,
        /// Body lines without their line endings.
        body: Vec<&'a str>,
        /// Closing fence line, verbatim.
        close: &'a str,
    },
}

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

pub(crate) fn is_closing_fence(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("```") && trimmed.trim_start_matches('`').is_empty()
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Split `md` into blocks. An unclosed fence is treated as plain text.
pub(crate) fn split_blocks(md: &str) -> Vec<Block<'_>> {
    let lines: Vec<(usize, &str)> = md
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .collect();

    let mut blocks = Vec::new();
    let mut text_start = 0usize;
    let mut i = 0usize;

    while i < lines.len() {
        let (start, line) = lines[i];
        if !is_fence_line(line) {
            i += 1;
            continue;
        }

        let Some(close_idx) = (i + 1..lines.len()).find(|&j| is_closing_fence(lines[j].1)) else {
            // No closing fence: the rest of the document stays plain text
            break;
        };

        if text_start < start {
            blocks.push(Block::Text(&md[text_start..start]));
        }

        let lang = strip_eol(line)
            .trim()
            .trim_start_matches('`')
            .trim()
            .to_lowercase();
        let body = lines[i + 1..close_idx]
            .iter()
            .map(|(_, l)| strip_eol(l))
            .collect();
        let (close_start, close) = lines[close_idx];

        blocks.push(Block::Fenced {
            open: line,
            lang,
            body,
            close,
        });

        text_start = close_start + close.len();
        i = close_idx + 1;
    }

    if text_start < md.len() {
        blocks.push(Block::Text(&md[text_start..]));
    }

    blocks
}

/// Byte ranges covered by closed code fences (fence lines included).
pub fn fenced_ranges(md: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut offset = 0usize;

    for block in split_blocks(md) {
        let len = match &block {
            Block::Text(t) => t.len(),
            Block::Fenced {
                open, body, close, ..
            } => {
                // Recover the exact span from the source: body lines were stripped of EOLs
                let body_len: usize = md[offset + open.len()..]
                    .split_inclusive('\n')
                    .take(body.len())
                    .map(str::len)
                    .sum();
                open.len() + body_len + close.len()
            }
        };
        if matches!(block, Block::Fenced { .. }) {
            ranges.push(offset..offset + len);
        }
        offset += len;
    }

    ranges
}
