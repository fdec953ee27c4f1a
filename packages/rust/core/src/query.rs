//! Search query construction and trimming.

use std::sync::LazyLock;

use regex::Regex;

use crate::field::FieldProfile;

/// Hard cap on a trimmed query, in characters.
pub const MAX_QUERY_CHARS: usize = 200;

/// Word cap applied when a query is over [`MAX_QUERY_CHARS`].
pub const MAX_ESSENTIAL_WORDS: usize = 15;

/// Queries shorter than this after trimming are dropped.
pub const MIN_QUERY_CHARS: usize = 10;

/// Generic module words that never make useful search terms.
const TITLE_STOP_WORDS: &[&str] = &["alapok", "alapjai", "bevezetés", "tananyag", "modul"];

/// Imperative verbs that leak from prompts into queries.
const INSTRUCTION_VERBS: &[&str] = &[
    "írj", "írd", "adj", "add", "készíts", "generálj", "foglald", "sorold", "magyarázd",
    "write", "generate", "create", "provide", "explain", "list", "return",
];

/// Whether a query is for the concise or the detailed rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Concise,
    Detailed,
}

/// Builds grounding queries for web and video search.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptimizer;

impl QueryOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Title words longer than 3 chars (minus generic module words), then any
    /// profile vocabulary present in the text. Case-insensitively unique.
    pub fn key_terms(&self, title: &str, content: &str, field: &FieldProfile) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();

        for word in title.split(|c: char| !c.is_alphanumeric() && c != '-') {
            let word = word.trim_matches('-');
            if word.chars().count() > 3 && !TITLE_STOP_WORDS.contains(&word.to_lowercase().as_str()) {
                push_unique(&mut terms, word);
            }
        }

        let text = format!("{title} {content}").to_lowercase();
        for vocab in field.vocabulary {
            if mentions(&text, &vocab.to_lowercase()) {
                push_unique(&mut terms, vocab);
            }
        }

        terms
    }

    /// Ordered, trimmed, de-duplicated queries: 3–4 for concise, 5–6 for detailed.
    pub fn build_queries(
        &self,
        mode: QueryMode,
        title: &str,
        content: &str,
        field: &FieldProfile,
    ) -> Vec<String> {
        let terms = self.key_terms(title, content, field);
        let subject = if title.trim().is_empty() {
            terms.first().cloned().unwrap_or_default()
        } else {
            title.trim().to_string()
        };
        let field_suffix = if field.is_general() {
            String::new()
        } else {
            format!(" {}", field.name)
        };
        let term_query = (!terms.is_empty()).then(|| {
            terms
                .iter()
                .take(6)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        });

        let mut raw = vec![
            format!("{subject} áttekintés{field_suffix}"),
            format!("{subject} módszertan"),
        ];
        match mode {
            QueryMode::Concise => raw.push(format!("{subject} alapjai")),
            QueryMode::Detailed => {
                raw.push(format!("{subject} szabványok előírások"));
                raw.push(format!("{subject} műszaki specifikáció"));
                raw.push(format!("{subject} esettanulmány gyakorlati példák"));
            }
        }
        raw.extend(term_query);

        let mut queries: Vec<String> = Vec::new();
        for query in raw.iter().filter_map(|q| self.trim(q)) {
            if !queries.iter().any(|existing| existing.to_lowercase() == query.to_lowercase()) {
                queries.push(query);
            }
        }
        queries
    }

    /// Strip instruction leakage, collapse whitespace and cap length.
    /// Returns `None` when the remainder is too short to be useful.
    pub fn trim(&self, raw: &str) -> Option<String> {
        static INSTRUCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"(?i)(respond|answer|reply|output)\s+(only\s+)?in\s+json|json\s+form[aá]tum\w*|json\s+format|v[aá]laszolj\w*|form[aá]zd\w*|you\s+are\s+an?\b|ignore\s+(all\s+)?previous|as\s+an\s+ai\b|markdown\s+form[aá]tum\w*",
            )
            .expect("valid regex")
        });
        static SENTENCE_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]*").expect("valid regex"));

        // Drop whole sentences that carry instructions
        let kept: Vec<&str> = SENTENCE_RE
            .find_iter(raw)
            .map(|m| m.as_str())
            .filter(|s| !INSTRUCTION_RE.is_match(s))
            .collect();
        let mut query = collapse_whitespace(&kept.join(" "));

        if query.chars().count() > MAX_QUERY_CHARS {
            query = query
                .split(' ')
                .filter(|w| is_essential(w))
                .take(MAX_ESSENTIAL_WORDS)
                .collect::<Vec<_>>()
                .join(" ");
        }

        // Removing one phrase can join its neighbours into another
        let mut query = cap_on_word_boundary(&query, MAX_QUERY_CHARS);
        loop {
            let next = collapse_whitespace(&INSTRUCTION_RE.replace_all(&query, " "));
            if next == query {
                break;
            }
            query = next;
        }
        let query = query.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());

        (query.chars().count() >= MIN_QUERY_CHARS).then(|| query.to_string())
    }
}

fn push_unique(terms: &mut Vec<String>, term: &str) {
    let lower = term.to_lowercase();
    if !terms.iter().any(|t| t.to_lowercase() == lower) {
        terms.push(term.to_string());
    }
}

/// Whether `needle` starts a word in `text`. Short needles (acronyms such as
/// "mig") must also end one, so "magas" does not count as "mag".
fn mentions(text: &str, needle: &str) -> bool {
    let short = needle.chars().count() <= 3;
    text.match_indices(needle).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + needle.len()..].chars().next();
        before.is_none_or(|c| !c.is_alphanumeric())
            && (!short || after.is_none_or(|c| !c.is_alphanumeric()))
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_essential(word: &str) -> bool {
    let bare = word
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    bare.chars().count() > 3 && !INSTRUCTION_VERBS.contains(&bare.as_str())
}

fn cap_on_word_boundary(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = String::new();
    for word in s.split(' ') {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > max_chars {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        // A single oversized word: hard cut
        out = s.chars().take(max_chars).collect();
    }
    out
}
