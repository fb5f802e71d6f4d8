//! Fingerprinter — derives the cache identity of a unit of work.
//!
//! A fingerprint covers every input that can change the output: the posting text
//! (whitespace- and case-normalized), the guideline version and the pipeline version.
//! Adding a new output-affecting input without folding it in here breaks cache correctness.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped only if the digest layout below changes.
const DIGEST_DOMAIN: &[u8] = b"summarizer.fingerprint.v1";

/// Hex-encoded SHA-256 digest identifying a unit of work (or an enrichment query).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable, content-derived identifier for the posting, e.g. `job_3fa9c1d2e4b5`.
    pub fn posting_id(&self) -> String {
        format!("job_{}", &self.0[..12])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn sanitize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sanitizes each paragraph but keeps paragraph breaks (blank-line separated).
pub fn preserve_paragraphs(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(sanitize_text(&current.join(" ")));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(sanitize_text(&current.join(" ")));
    }

    paragraphs.join("\n\n")
}

/// The canonical form hashed into a fingerprint. Formatting-only differences collapse.
pub fn canonical_text(text: &str) -> String {
    sanitize_text(text).to_lowercase()
}

/// Fingerprint of a unit of work. Pure and deterministic.
pub fn fingerprint(
    source_text: &str,
    guideline_version: &str,
    pipeline_version: &str,
) -> Fingerprint {
    digest(&[
        canonical_text(source_text).as_str(),
        guideline_version.trim(),
        pipeline_version.trim(),
    ])
}

/// Fingerprint of an enrichment query, used as its cache key.
pub fn query_fingerprint(query: &str) -> Fingerprint {
    digest(&[canonical_text(query).as_str()])
}

fn digest(fields: &[&str]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(DIGEST_DOMAIN);
    // Length-prefix each field so ("ab", "c") and ("a", "bc") never collide.
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    Fingerprint(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_and_case_variants_collide() {
        let a = fingerprint("Senior Backend Engineer\n\nPython,  AWS", "v1", "0.1.0");
        let b = fingerprint("  senior backend engineer python, aws ", "v1", "0.1.0");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_text_differs() {
        let a = fingerprint("Senior Backend Engineer", "v1", "0.1.0");
        let b = fingerprint("Senior Frontend Engineer", "v1", "0.1.0");
        assert_ne!(a, b);
    }

    #[test]
    fn test_guideline_version_is_part_of_identity() {
        let a = fingerprint("Engineer", "v1", "0.1.0");
        let b = fingerprint("Engineer", "v2", "0.1.0");
        assert_ne!(a, b);
    }

    #[test]
    fn test_pipeline_version_is_part_of_identity() {
        let a = fingerprint("Engineer", "v1", "0.1.0");
        let b = fingerprint("Engineer", "v1", "0.2.0");
        assert_ne!(a, b);
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        assert_ne!(fingerprint("ab", "c", "x"), fingerprint("a", "bc", "x"));
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint("Engineer", "v1", "0.1.0");
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(fp.posting_id().starts_with("job_"));
        assert_eq!(fp.posting_id().len(), 16);
    }

    #[test]
    fn test_query_fingerprint_normalizes() {
        assert_eq!(
            query_fingerprint("Acme  Corp company overview"),
            query_fingerprint("acme corp company OVERVIEW")
        );
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("  a \t b\n\nc  "), "a b c");
        assert_eq!(sanitize_text(""), "");
    }

    #[test]
    fn test_preserve_paragraphs() {
        let input = "Title line\n  continues here\n\n\n  \nSecond   paragraph\n";
        assert_eq!(
            preserve_paragraphs(input),
            "Title line continues here\n\nSecond paragraph"
        );
        assert_eq!(preserve_paragraphs("   \n\n  "), "");
    }
}
