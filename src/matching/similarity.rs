// src/matching/similarity.rs
// Pairwise name similarity on already-normalized route names.

use rapidfuzz::fuzz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name comparison algorithm. Unrecognised names fall back to `Ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Algorithm {
    /// Indel-normalized similarity over the whole string.
    #[default]
    Ratio,
    /// `Ratio` after sorting whitespace-separated tokens.
    TokenSort,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Ratio => "ratio",
            Algorithm::TokenSort => "token_sort",
        }
    }

    pub fn parse_lossy(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "token_sort" | "token-sort" | "tokensort" => Algorithm::TokenSort,
            _ => Algorithm::Ratio,
        }
    }
}

impl From<String> for Algorithm {
    fn from(name: String) -> Self {
        Algorithm::parse_lossy(&name)
    }
}

impl From<&str> for Algorithm {
    fn from(name: &str) -> Self {
        Algorithm::parse_lossy(name)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores two normalized names in `[0, 100]`.
pub fn score(name_a: &str, name_b: &str, algorithm: Algorithm) -> f64 {
    match algorithm {
        Algorithm::Ratio => ratio(name_a, name_b),
        Algorithm::TokenSort => token_sort_ratio(name_a, name_b),
    }
}

/// `100 * (1 - indel_distance / (len_a + len_b))`, where the indel distance
/// counts insertions and deletions only. Two empty strings score 100.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    100.0 * fuzz::ratio(a.chars(), b.chars())
}

/// Order-invariant ratio: "dalle du jardin" == "jardin dalle du".
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sort_tokens(a), &sort_tokens(b))
}

fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
