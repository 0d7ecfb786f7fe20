//! Query expansion.
//!
//! Produces a short, ordered list of search strings for one question: the
//! original (with surrounding whitespace trimmed) first, then class-specific rephrasings, then variants with a
//! domain term swapped for a synonym. Variants are deduplicated
//! case-insensitively, keeping the first one seen.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::QueryClass;

/// Default cap on the number of expanded queries.
pub const DEFAULT_MAX_EXPANSIONS: usize = 5;

/// Domain term → at most two synonyms.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("pool", &["swimming pool", "piscina"]),
    ("barbecue", &["grill", "churrasqueira"]),
    ("pet", &["animal", "dog"]),
    ("pets", &["animals", "dogs"]),
    ("noise", &["quiet hours", "barulho"]),
    ("parking", &["garage", "garagem"]),
    ("fee", &["condo fee", "taxa condominial"]),
    ("fine", &["penalty", "multa"]),
    ("meeting", &["assembly", "assembleia"]),
    ("trash", &["garbage", "lixo"]),
    ("gym", &["fitness room", "academia"]),
    ("piscina", &["pool", "área de lazer"]),
    ("churrasqueira", &["barbecue", "espaço gourmet"]),
    ("animais", &["pets", "animal de estimação"]),
    ("barulho", &["ruído", "silêncio"]),
    ("garagem", &["vaga", "estacionamento"]),
    ("multa", &["penalidade", "fine"]),
    ("assembleia", &["reunião", "meeting"]),
    ("síndico", &["administrador", "building manager"]),
    ("mudança", &["moving", "transporte de móveis"]),
];

static SYNONYM_MATCHERS: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    SYNONYMS
        .iter()
        .map(|(term, syns)| {
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term)))
                .expect("synonym terms are static and valid");
            (re, *syns)
        })
        .collect()
});

/// Expand `question` with the default cap.
///
/// The first element is `question.trim()`. A blank question, which callers
/// reject before searching, yields an empty list.
pub fn expand(question: &str, class: QueryClass) -> Vec<String> {
    expand_with_limit(question, class, DEFAULT_MAX_EXPANSIONS)
}

/// Expand `question`, returning at most `max` distinct strings.
///
/// The trimmed original is always first. A blank question yields nothing.
pub fn expand_with_limit(question: &str, class: QueryClass, max: usize) -> Vec<String> {
    let original = question.trim();
    if original.is_empty() || max == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(max);
    let mut seen = HashSet::new();
    let mut push = |candidate: String, out: &mut Vec<String>| {
        if out.len() < max && seen.insert(candidate.to_lowercase()) {
            out.push(candidate);
        }
    };

    push(original.to_string(), &mut out);

    let subject = original.trim_end_matches(|c: char| c == '?' || c == '.' || c == '!');
    if let Some(template) = template_for(class) {
        push(template.replace("{}", subject), &mut out);
    }

    for (re, syns) in SYNONYM_MATCHERS.iter() {
        if !re.is_match(original) {
            continue;
        }
        for syn in syns.iter() {
            push(re.replace_all(original, *syn).into_owned(), &mut out);
        }
    }

    out
}

fn template_for(class: QueryClass) -> Option<&'static str> {
    match class {
        QueryClass::Lookup => Some("article about {}"),
        QueryClass::Interpretative => Some("rules on {}"),
        QueryClass::Procedural => Some("procedure for {}"),
        QueryClass::Comparative => Some("differences {}"),
        QueryClass::Temporal => Some("current rule {}"),
        QueryClass::General => None,
    }
}
