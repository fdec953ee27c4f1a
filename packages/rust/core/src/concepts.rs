//! Key-concept extraction from generated Markdown.
//!
//! The detailed-content prompt asks the model to finish with a
//! `## Kulcsfogalmak` section of `- **Fogalom**: definíció` bullets. When that
//! section is missing, any bullet of the same shape elsewhere is accepted.

use std::sync::LazyLock;

use regex::Regex;

use enhancer_markdown::fenced_ranges;
use enhancer_shared::{KeyConcept, WikiLink};

/// Heading that introduces the concept list.
pub const CONCEPTS_HEADING: &str = "Kulcsfogalmak";

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}(#{1,6})\s+(.*?)\s*#*\s*$").expect("valid regex"));

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\*\*([^*]+)\*\*\s*([:\-–—])?\s*(.*)$").expect("valid regex")
});

#[derive(Debug)]
struct Bullet {
    term: String,
    definition: String,
    /// The term was followed by a colon (inside or after the bold markers).
    colon: bool,
}

fn parse_bullet(line: &str) -> Option<Bullet> {
    let caps = BULLET_RE.captures(line)?;
    let raw_term = caps.get(1)?.as_str().trim();
    let term = raw_term.trim_end_matches(':').trim().to_string();
    if term.is_empty() {
        return None;
    }
    let colon = raw_term.ends_with(':') || caps.get(2).is_some_and(|m| m.as_str() == ":");
    let definition = caps
        .get(3)
        .map(|m| m.as_str().replace("**", "").trim().to_string())
        .unwrap_or_default();
    Some(Bullet {
        term,
        definition,
        colon,
    })
}

/// Lines outside code fences, in order.
fn prose_lines(text: &str) -> Vec<&str> {
    let fences = fenced_ranges(text);
    let mut offset = 0usize;
    let mut lines = Vec::new();
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if !fences.iter().any(|r| r.contains(&start)) {
            lines.push(line.trim_end_matches(['\n', '\r']));
        }
    }
    lines
}

fn section_bullets<'a>(lines: &[&'a str]) -> Option<Vec<&'a str>> {
    let mut in_section: Option<usize> = None;
    let mut body = Vec::new();

    for line in lines {
        if let Some(caps) = HEADING_RE.captures(line) {
            let level = caps[1].len();
            match in_section {
                Some(section_level) if level <= section_level => break,
                Some(_) => continue,
                None => {
                    if caps[2].to_lowercase().starts_with(&CONCEPTS_HEADING.to_lowercase()) {
                        in_section = Some(level);
                    }
                    continue;
                }
            }
        }
        if in_section.is_some() {
            body.push(*line);
        }
    }

    in_section.map(|_| body)
}

/// Ordered, case-insensitively unique concepts, at most `max`.
pub fn extract_key_concepts(text: &str, max: usize) -> Vec<KeyConcept> {
    let lines = prose_lines(text);

    let mut bullets: Vec<Bullet> = section_bullets(&lines)
        .unwrap_or_default()
        .into_iter()
        .filter_map(parse_bullet)
        .collect();

    if bullets.is_empty() {
        bullets = lines
            .iter()
            .filter_map(|l| parse_bullet(l))
            .filter(|b| b.colon && !b.definition.is_empty())
            .collect();
    }

    let mut concepts: Vec<KeyConcept> = Vec::new();
    for bullet in bullets {
        if concepts.len() >= max {
            break;
        }
        let lower = bullet.term.to_lowercase();
        if concepts.iter().any(|c| c.concept.to_lowercase() == lower) {
            continue;
        }
        concepts.push(KeyConcept::new(bullet.term, bullet.definition));
    }
    concepts
}

/// Attach every link whose text names a concept (case-insensitive).
pub fn attach_links(concepts: &mut [KeyConcept], links: &[WikiLink]) {
    for concept in concepts.iter_mut() {
        let name = concept.concept.to_lowercase();
        for link in links.iter().filter(|l| l.text.to_lowercase() == name) {
            if !concept.wikipedia_links.iter().any(|l| l.url == link.url) {
                concept.wikipedia_links.push(link.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILED: &str = "\
# AWI hegesztés

A **volfrámelektróda** nem olvad le.

## Kulcsfogalmak

- **Védőgáz**: Az ívet és az ömledéket óvja a levegőtől.
- **Volfrámelektróda**: Nem leolvadó elektróda.
- **védőgáz**: Ismétlés, kimarad.
- Nem fogalom sor.

## Összefoglalás

- **Varrat**: ez már nem a szakasz része.
";

    #[test]
    fn parses_concept_section() {
        let concepts = extract_key_concepts(DETAILED, 10);
        let names: Vec<_> = concepts.iter().map(|c| c.concept.as_str()).collect();
        assert_eq!(names, vec!["Védőgáz", "Volfrámelektróda"]);
        assert_eq!(concepts[1].definition, "Nem leolvadó elektróda.");
    }

    #[test]
    fn caps_the_count() {
        assert_eq!(extract_key_concepts(DETAILED, 1).len(), 1);
        assert!(extract_key_concepts(DETAILED, 0).is_empty());
    }

    #[test]
    fn falls_back_to_any_definition_bullet() {
        let text = "Bevezető.\n\n- **Varrat**: a hegesztett kötés.\n- **Csak kiemelés** szöveg\n- **Ív:** elektromos kisülés.\n";
        let concepts = extract_key_concepts(text, 10);
        let names: Vec<_> = concepts.iter().map(|c| c.concept.as_str()).collect();
        assert_eq!(names, vec!["Varrat", "Ív"]);
        assert_eq!(concepts[1].definition, "elektromos kisülés.");
    }

    #[test]
    fn ignores_bullets_in_code() {
        let text = "```\n- **Kód**: nem fogalom\n```\n- **Valódi**: fogalom\n";
        let concepts = extract_key_concepts(text, 10);
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].concept, "Valódi");
    }

    #[test]
    fn concepts_are_unique() {
        let concepts = extract_key_concepts(DETAILED, 10);
        let mut seen = std::collections::HashSet::new();
        assert!(concepts.iter().all(|c| seen.insert(c.concept.to_lowercase())));
    }

    #[test]
    fn links_attach_by_name() {
        let mut concepts = vec![KeyConcept::new("Védőgáz", "x"), KeyConcept::new("Ív", "y")];
        let link = WikiLink {
            text: "védőgáz".into(),
            url: "https://hu.wikipedia.org/wiki/Védőgáz".into(),
            description: String::new(),
        };
        attach_links(&mut concepts, &[link.clone(), link]);
        assert_eq!(concepts[0].wikipedia_links.len(), 1);
        assert!(concepts[1].wikipedia_links.is_empty());
    }
}
