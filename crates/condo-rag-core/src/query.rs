//! Heuristic question classifier.
//!
//! Ordered regex rules over the raw question, English and Portuguese.
//! The first rule that matches decides the class, so a question that both
//! cites an article and asks for permission ("Does Art. 5 allow pets?") is
//! a lookup. Nothing matching means [`QueryClass::General`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::QueryClass;

const RULES: &[(QueryClass, &str)] = &[
    (
        QueryClass::Lookup,
        r"(?i)\b(?:articles?|artigos?|clauses?|cl[aá]usulas?|sections?|se[cç][aã]o|se[cç][oõ]es|paragraphs?|par[aá]grafos?|incisos?|chapters?|cap[ií]tulos?)\b|\bart\.?\s*\d+|§",
    ),
    (
        QueryClass::Interpretative,
        r"(?i)\b(?:can i|can we|may i|allowed|permitted|forbidden|prohibited|is it ok|pode|posso|podemos|permitid[oa]s?|proibid[oa]s?|vedad[oa]s?)\b",
    ),
    (
        QueryClass::Comparative,
        r"(?i)\b(?:differences?|differ|compare|comparison|versus|vs|diferen[cç]as?|comparar|compara[cç][aã]o)\b",
    ),
    (
        QueryClass::Procedural,
        r"(?i)\b(?:how|procedure|process|steps?|request|como|procedimentos?|processo|solicitar|passos?)\b",
    ),
    (
        QueryClass::Temporal,
        r"(?i)\b(?:19|20)\d{2}\b|\b(?:current|currently|old|older|recent|latest|previous|former|atual|antig[oa]|recente|vigente|anterior)\b",
    ),
];

static MATCHERS: Lazy<Vec<(QueryClass, Regex)>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|(class, pattern)| {
            (
                *class,
                Regex::new(pattern).expect("query rules are static and valid"),
            )
        })
        .collect()
});

/// Classify a question. Never fails.
pub fn classify_query(question: &str) -> QueryClass {
    MATCHERS
        .iter()
        .find(|(_, re)| re.is_match(question))
        .map(|(class, _)| *class)
        .unwrap_or(QueryClass::General)
}
