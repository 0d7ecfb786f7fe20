//! Content fingerprints for chunk deduplication.
//!
//! A fingerprint is the lowercase hex SHA-256 of the chunk text. It is an
//! identity key, not a security boundary: identical text in the same
//! namespace always yields the same fingerprint, so it is never stored
//! twice under the same document and position.

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest of a chunk's text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex chars, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint `text`. Pure and deterministic.
pub fn fingerprint(text: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Vector id for a chunk: `{identity}#{fingerprint}#{index}`.
///
/// Document identities are slugs, so `#` only ever appears as the field
/// separator and `{identity}#` is a safe prefix for listing a document's
/// chunks.
pub fn vector_id(identity: &str, content_hash: &str, chunk_index: usize) -> String {
    format!("{}#{}#{}", identity, content_hash, chunk_index)
}

/// Prefix shared by every vector id of one document.
pub fn document_prefix(identity: &str) -> String {
    format!("{}#", identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(fingerprint("Art. 1 pool"), fingerprint("Art. 1 pool"));
    }

    #[test]
    fn test_distinct() {
        assert_ne!(fingerprint("Art. 1 pool"), fingerprint("Art. 1 pool."));
        assert_ne!(fingerprint(""), fingerprint(" "));
    }

    #[test]
    fn test_known_digest() {
        let fp = fingerprint("");
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.short(), "e3b0c442");
    }

    #[test]
    fn test_vector_id_layout() {
        let fp = fingerprint("x");
        let id = vector_id("pool-rules", fp.as_str(), 3);
        assert!(id.starts_with(&document_prefix("pool-rules")));
        assert!(id.ends_with("#3"));
        assert_eq!(id.split('#').count(), 3);
    }
}
