//! Encyclopedia linking of emphasized terms.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use enhancer_markdown::{find_emphasis_spans, rewrite_as_links};
use enhancer_shared::{Article, Encyclopedia, WikiLink};

use crate::field::FieldProfile;
use crate::retry::RetryPolicy;

/// Longest emphasized phrase treated as a concept name, in words.
const MAX_PHRASE_WORDS: usize = 4;

/// Shortest candidate, in characters.
const MIN_TERM_CHARS: usize = 3;

/// Emphasized words that are typographic, not conceptual.
const STOP_WORDS: &[&str] = &[
    "fontos", "figyelem", "megjegyzés", "megjegyzések", "példa", "például", "tipp", "tippek",
    "figyelmeztetés", "vigyázat", "tilos", "kötelező", "mindig", "soha", "nem", "igen",
    "összefoglalás", "lépés", "lépések", "cél", "note", "warning", "important", "tip",
];

/// Text with emphasized terms rewritten to links, and the links that were made.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedText {
    pub text: String,
    pub links: Vec<WikiLink>,
}

/// Lookup results shared across the texts of one task, keyed by lowercase term.
pub type LookupCache = HashMap<String, Option<Article>>;

pub struct WikipediaLinker {
    encyclopedia: Arc<dyn Encyclopedia>,
    policy: RetryPolicy,
    delay: Duration,
}

impl WikipediaLinker {
    pub fn new(encyclopedia: Arc<dyn Encyclopedia>, policy: RetryPolicy, delay: Duration) -> Self {
        Self {
            encyclopedia,
            policy,
            delay,
        }
    }

    /// Emphasized phrases worth a lookup: 1–4 words, not a stop word,
    /// case-insensitively unique, at most `max`.
    pub fn candidates(text: &str, max: usize) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut out = Vec::new();

        for span in find_emphasis_spans(text) {
            if out.len() >= max {
                break;
            }
            let term = span.text;
            let lower = term.to_lowercase();
            let words = term.split_whitespace().count();

            if words == 0 || words > MAX_PHRASE_WORDS {
                continue;
            }
            if term.chars().count() < MIN_TERM_CHARS
                || STOP_WORDS.contains(&lower.as_str())
                || term.ends_with([':', '.', '!', '?'])
                || !term.chars().any(char::is_alphabetic)
            {
                continue;
            }
            if seen.contains(&lower) {
                continue;
            }
            seen.push(lower);
            out.push(term);
        }
        out
    }

    /// Link up to `max_keywords` emphasized terms of `text`. Never fails:
    /// unresolved or failed lookups leave the term as it was.
    pub async fn link_keywords(
        &self,
        text: &str,
        field: &FieldProfile,
        max_keywords: usize,
    ) -> LinkedText {
        let mut cache = LookupCache::new();
        self.link_with_cache(text, field, max_keywords, &mut cache).await
    }

    /// Like [`link_keywords`](Self::link_keywords), reusing earlier lookups.
    #[instrument(skip_all, fields(field = field.name, max_keywords))]
    pub async fn link_with_cache(
        &self,
        text: &str,
        field: &FieldProfile,
        max_keywords: usize,
        cache: &mut LookupCache,
    ) -> LinkedText {
        let candidates = Self::candidates(text, max_keywords);
        let mut urls: HashMap<String, String> = HashMap::new();
        let mut links = Vec::new();
        let mut lookups = 0usize;

        for term in candidates {
            let key = term.to_lowercase();
            let article = match cache.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    if lookups > 0 && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    lookups += 1;
                    let resolved = self.lookup(&term).await;
                    cache.insert(key.clone(), resolved.clone());
                    resolved
                }
            };

            let Some(article) = article else {
                continue;
            };

            urls.insert(key, article.url.clone());
            links.push(WikiLink {
                description: describe(&article, field),
                text: term,
                url: article.url,
            });
        }

        debug!(lookups, linked = links.len(), "keyword linking done");
        LinkedText {
            text: rewrite_as_links(text, &urls),
            links,
        }
    }

    async fn lookup(&self, term: &str) -> Option<Article> {
        let encyclopedia = &self.encyclopedia;
        match self
            .policy
            .run("encyclopedia", || encyclopedia.resolve(term))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(term, error = %e, "encyclopedia lookup failed, leaving term unlinked");
                None
            }
        }
    }
}

fn describe(article: &Article, field: &FieldProfile) -> String {
    if field.is_general() {
        format!("Wikipédia: {}", article.title)
    } else {
        format!("Wikipédia: {} ({})", article.title, field.name)
    }
}
