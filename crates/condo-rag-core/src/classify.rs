//! Heuristic document type classifier.
//!
//! Looks only at a bounded prefix of the text plus the filename, so the
//! cost is constant no matter how large the document is. The lexicon is
//! evaluated in declaration order and the first category with a hit wins.
//! Classification never fails: anything unrecognized is
//! [`DocType::General`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::DocType;

/// Characters of document text inspected by [`classify`].
pub const DEFAULT_PREFIX_CHARS: usize = 1000;

/// Category keywords, English and Portuguese. Order is the tie-break.
const LEXICON: &[(DocType, &[&str])] = &[
    (
        DocType::Bylaws,
        &["bylaws", "by-laws", "convenção", "convencao", "condominium declaration"],
    ),
    (
        DocType::InternalRegulation,
        &[
            "internal regulation",
            "internal regulations",
            "house rules",
            "regimento",
            "regulamento",
            "regulation",
        ],
    ),
    (
        DocType::MeetingMinutes,
        &["meeting minutes", "minutes of", "ata", "assembleia geral"],
    ),
    (
        DocType::Charter,
        &["charter", "articles of incorporation", "estatuto"],
    ),
];

static MATCHERS: Lazy<Vec<(DocType, Regex)>> = Lazy::new(|| {
    LEXICON
        .iter()
        .map(|(doc_type, terms)| {
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            // Word boundaries keep short terms like "ata" out of "data".
            let pattern = format!(r"(?i)\b(?:{})\b", alternation);
            (
                *doc_type,
                Regex::new(&pattern).expect("lexicon patterns are static and valid"),
            )
        })
        .collect()
});

/// Classify a document from its leading text and filename.
pub fn classify(text: &str, filename_hint: &str) -> DocType {
    classify_with_prefix(text, filename_hint, DEFAULT_PREFIX_CHARS)
}

/// Like [`classify`] with an explicit prefix bound.
pub fn classify_with_prefix(text: &str, filename_hint: &str, prefix_chars: usize) -> DocType {
    let head = char_prefix(text, prefix_chars);
    for (doc_type, matcher) in MATCHERS.iter() {
        if matcher.is_match(head) || matcher.is_match(filename_hint) {
            return *doc_type;
        }
    }
    DocType::General
}

/// Slice of at most `n` characters, cut on a char boundary.
fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portuguese_keywords() {
        assert_eq!(classify("CONVENÇÃO DE CONDOMÍNIO\nArt. 1", ""), DocType::Bylaws);
        assert_eq!(classify("Regimento Interno do Edifício", ""), DocType::InternalRegulation);
        assert_eq!(classify("ATA DA ASSEMBLEIA", ""), DocType::MeetingMinutes);
        assert_eq!(classify("Estatuto social", ""), DocType::Charter);
    }

    #[test]
    fn test_english_keywords() {
        assert_eq!(classify("Amended Bylaws of Oak Court", ""), DocType::Bylaws);
        assert_eq!(classify("House Rules", ""), DocType::InternalRegulation);
        assert_eq!(classify("Minutes of the annual meeting", ""), DocType::MeetingMinutes);
        assert_eq!(classify("Association charter", ""), DocType::Charter);
    }

    #[test]
    fn test_filename_hint() {
        assert_eq!(classify("Lorem ipsum", "regimento_2023.pdf"), DocType::InternalRegulation);
        assert_eq!(classify("Lorem ipsum", "ata-marco.txt"), DocType::MeetingMinutes);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        // Both bylaws and minutes terms present: bylaws is declared first.
        assert_eq!(classify("Minutes of the meeting approving the bylaws", ""), DocType::Bylaws);
    }

    #[test]
    fn test_word_boundaries() {
        assert_eq!(classify("Data de contato e batata", ""), DocType::General);
    }

    #[test]
    fn test_only_prefix_is_inspected() {
        let text = format!("{}regimento", "x".repeat(DEFAULT_PREFIX_CHARS + 10));
        assert_eq!(classify(&text, ""), DocType::General);
        assert_eq!(classify_with_prefix(&text, "", 5000), DocType::InternalRegulation);
    }

    #[test]
    fn test_default_general() {
        assert_eq!(classify("", ""), DocType::General);
        assert_eq!(classify("Pool opens 08:00", "notes.txt"), DocType::General);
    }

    #[test]
    fn test_char_prefix_multibyte() {
        assert_eq!(char_prefix("çãé", 2), "çã");
        assert_eq!(char_prefix("ab", 10), "ab");
    }
}
