//! Prompt templates for the two generation stages.

use enhancer_shared::{EnhancementTask, SearchSnippet};

use crate::concepts::CONCEPTS_HEADING;
use crate::field::FieldProfile;

fn context_lines(task: &EnhancementTask, field: &FieldProfile) -> String {
    let mut lines = vec![format!("Cím: {}", task.title)];
    if let Some(subject) = &task.subject_context {
        lines.push(format!("Tantárgy: {subject}"));
    }
    if let Some(profession) = &task.profession_context {
        lines.push(format!("Szakma: {profession}"));
    }
    if !field.is_general() {
        lines.push(format!("Szakterület: {}", field.name));
    }
    lines.join("\n")
}

/// Expanded rendering of the module, ending in a key-concept list.
pub fn detailed_prompt(task: &EnhancementTask, field: &FieldProfile) -> String {
    format!(
        "Egy szakképzési tananyag részletes, bővített változatát készíted magyar nyelven.\n\
         {context}\n\n\
         Követelmények:\n\
         - Bontsd ki a tananyag minden részét, adj gyakorlati példákat és szakmai hátteret.\n\
         - A fontos szakkifejezéseket emeld ki félkövérrel (**kifejezés**).\n\
         - Ha folyamatot ábrázolsz, használj ```mermaid blokkot, idézőjelek és linkek nélkül.\n\
         - Zárd a szöveget egy `## {heading}` szakasszal, soronként `- **Fogalom**: definíció` formában.\n\n\
         Eredeti tananyag:\n\
         {content}",
        context = context_lines(task, field),
        heading = CONCEPTS_HEADING,
        content = task.raw_content,
    )
}

/// Short rendering of the original text under a word ceiling.
pub fn concise_prompt(task: &EnhancementTask, field: &FieldProfile, max_words: u32) -> String {
    format!(
        "Egy szakképzési tananyag tömör összefoglalóját készíted magyar nyelven.\n\
         {context}\n\n\
         Követelmények:\n\
         - Legfeljebb {max_words} szó.\n\
         - Csak a lényeg: fő fogalmak és lépések, részletes példák nélkül.\n\
         - A fontos szakkifejezéseket emeld ki félkövérrel (**kifejezés**).\n\n\
         Eredeti tananyag:\n\
         {content}",
        context = context_lines(task, field),
        content = task.raw_content,
    )
}

/// Search results rendered as grounding context. Empty input yields `None`.
pub fn grounding_context(snippets: &[SearchSnippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }
    let body = snippets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {} ({})\n{}", i + 1, s.title, s.url, s.snippet))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(format!(
        "Az alábbi webes találatok háttérinformációként szolgálnak. \
         Csak a tananyaghoz illő tényeket használd fel.\n\n{body}"
    ))
}
