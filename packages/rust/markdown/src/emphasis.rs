//! Bold-emphasis scanning and in-place link rewriting.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::fence::fenced_ranges;

static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^*\n\[\]]+?)\*\*|__([^_\n\[\]]+?)__").expect("valid regex")
});

/// A bold span found outside code fences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmphasisSpan {
    /// Byte range of the whole span, markers included.
    pub range: Range<usize>,
    /// Inner text, trimmed.
    pub text: String,
}

fn inside(ranges: &[Range<usize>], pos: usize) -> bool {
    ranges.iter().any(|r| r.contains(&pos))
}

/// Every `**bold**` / `__bold__` span outside fenced code, in document order.
pub fn find_emphasis_spans(md: &str) -> Vec<EmphasisSpan> {
    let fences = fenced_ranges(md);

    BOLD_RE
        .captures_iter(md)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if inside(&fences, whole.start()) {
                return None;
            }
            let inner = caps.get(1).or_else(|| caps.get(2))?;
            let text = inner.as_str().trim();
            if text.is_empty() {
                return None;
            }
            Some(EmphasisSpan {
                range: whole.range(),
                text: text.to_string(),
            })
        })
        .collect()
}

/// Replace each emphasized term whose lowercase form is a key of `links`
/// with `**[term](url)**`, keeping the span's own delimiter (`**` or `__`).
/// Other spans and fenced code are left alone.
pub fn rewrite_as_links(md: &str, links: &HashMap<String, String>) -> String {
    if links.is_empty() {
        return md.to_string();
    }

    let mut out = String::with_capacity(md.len());
    let mut cursor = 0usize;

    for span in find_emphasis_spans(md) {
        let Some(url) = links.get(&span.text.to_lowercase()) else {
            continue;
        };
        // Both delimiters are two ASCII bytes
        let marker = &md[span.range.start..span.range.start + 2];
        out.push_str(&md[cursor..span.range.start]);
        out.push_str(&format!("{marker}[{}]({url}){marker}", span.text));
        cursor = span.range.end;
    }

    out.push_str(&md[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn finds_both_markers() {
        let spans = find_emphasis_spans("A **hegesztés** és __ívhegesztés__ témája.");
        let texts: Vec<_> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["hegesztés", "ívhegesztés"]);
    }

    #[test]
    fn skips_fenced_code() {
        let md = "**kint**\n```\n**bent**\n```\n";
        let spans = find_emphasis_spans(md);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "kint");
    }

    #[test]
    fn skips_already_linked_bold() {
        let spans = find_emphasis_spans("**[hegesztés](https://hu.wikipedia.org/wiki/Hegeszt%C3%A9s)**");
        assert!(spans.is_empty());
    }

    #[test]
    fn rewrites_matching_terms() {
        let links = map(&[("hegesztés", "https://hu.wikipedia.org/wiki/Hegesztés")]);
        let out = rewrite_as_links("A **Hegesztés** alapjai, **védőgáz** nélkül.", &links);
        assert_eq!(
            out,
            "A **[Hegesztés](https://hu.wikipedia.org/wiki/Hegesztés)** alapjai, **védőgáz** nélkül."
        );
    }

    #[test]
    fn keeps_underscore_delimiter() {
        let links = map(&[
            ("hegesztés", "https://hu.wikipedia.org/wiki/Hegesztés"),
            ("védőgáz", "https://hu.wikipedia.org/wiki/Védőgáz"),
        ]);
        let out = rewrite_as_links("A __hegesztés__ és a **védőgáz**.", &links);
        assert_eq!(
            out,
            "A __[hegesztés](https://hu.wikipedia.org/wiki/Hegesztés)__ és a **[védőgáz](https://hu.wikipedia.org/wiki/Védőgáz)**."
        );
        assert_eq!(rewrite_as_links(&out, &links), out);
    }

    #[test]
    fn rewrite_is_stable() {
        let links = map(&[("hegesztés", "https://hu.wikipedia.org/wiki/Hegesztés")]);
        let once = rewrite_as_links("**hegesztés**", &links);
        let twice = rewrite_as_links(&once, &links);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_map_is_identity() {
        let md = "**x** y";
        assert_eq!(rewrite_as_links(md, &HashMap::new()), md);
    }
}
