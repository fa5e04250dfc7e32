// src/matching/normalize.rs
// Ingestion-side name normalization. The scorer expects its inputs to have
// been through this already.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// NFD-decompose, drop combining marks and ASCII punctuation, lowercase.
/// Whitespace is kept as is.
pub fn normalize_name(raw: &str) -> String {
    raw.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !c.is_ascii_punctuation())
        .flat_map(char::to_lowercase)
        .collect()
}
