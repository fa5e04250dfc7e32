// src/candidate_generation/candidate_generation.rs

use log::{debug, info, warn};
use regex::Regex;

use crate::error::DedupeError;
use crate::models::record::Record;
use crate::storage::CatalogStore;

/// Names the source catalog uses for unnamed lines ("n.n.", "n n").
pub const DEFAULT_PLACEHOLDER_PATTERNS: [&str; 2] = ["%n.n.%", "%n n%"];

/// An ILIKE-style pattern (`%` any run, `_` one char, case-insensitive).
#[derive(Debug, Clone)]
pub struct PlaceholderPattern {
    raw: String,
    regex: Regex,
}

impl PlaceholderPattern {
    pub fn from_ilike(pattern: &str) -> Result<Self, DedupeError> {
        let mut translated = String::from("(?is)^");
        for c in pattern.chars() {
            match c {
                '%' => translated.push_str(".*"),
                '_' => translated.push('.'),
                other => translated.push_str(&regex::escape(&other.to_string())),
            }
        }
        translated.push('$');
        let regex = Regex::new(&translated).map_err(|e| {
            DedupeError::validation(format!("invalid placeholder pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn as_ilike(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Eligibility rules for the automatic candidate pool.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// Area slug the pass is restricted to.
    pub scope: Option<String>,
    pub placeholder_patterns: Vec<PlaceholderPattern>,
}

impl CandidateFilter {
    pub fn new<S: AsRef<str>>(scope: Option<String>, patterns: &[S]) -> Result<Self, DedupeError> {
        let placeholder_patterns = patterns
            .iter()
            .map(|p| PlaceholderPattern::from_ilike(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            scope,
            placeholder_patterns,
        })
    }

    pub fn with_default_patterns(scope: Option<String>) -> Self {
        // The default patterns are static and always compile.
        Self::new(scope, &DEFAULT_PLACEHOLDER_PATTERNS[..]).unwrap_or_default()
    }

    pub fn ilike_patterns(&self) -> Vec<String> {
        self.placeholder_patterns
            .iter()
            .map(|p| p.as_ilike().to_string())
            .collect()
    }

    pub fn is_placeholder(&self, normalized_name: &str) -> bool {
        self.placeholder_patterns
            .iter()
            .any(|p| p.matches(normalized_name))
    }

    /// At least one ascent, not already a duplicate, a real name, in scope.
    pub fn accepts(&self, record: &Record) -> bool {
        if record.ascent_count < 1 || record.main_record_id.is_some() {
            return false;
        }
        if self.is_placeholder(&record.normalized_name) {
            return false;
        }
        match &self.scope {
            Some(slug) => record.area_slug.as_deref() == Some(slug.as_str()),
            None => true,
        }
    }
}

/// Fetches the candidate pool and guarantees ascending `grade_rank` order.
///
/// The store is expected to apply the filter itself; anything it lets through
/// that the filter rejects is dropped here.
pub async fn select_candidates(
    store: &dyn CatalogStore,
    filter: &CandidateFilter,
) -> Result<Vec<Record>, DedupeError> {
    let fetched = store.candidates(filter).await?;
    let fetched_count = fetched.len();
    debug!("Candidate store returned {} records", fetched_count);

    let mut candidates: Vec<Record> = fetched.into_iter().filter(|r| filter.accepts(r)).collect();
    if candidates.len() != fetched_count {
        warn!(
            "Dropped {} records the store returned that are not eligible for deduplication",
            fetched_count - candidates.len()
        );
    }

    if !is_sorted_by_grade(&candidates) {
        warn!("Candidate store did not return records sorted by grade; sorting");
        candidates.sort_by_key(|r| r.grade_rank);
    }

    info!(
        "Selected {} candidates for duplicate detection{}",
        candidates.len(),
        filter
            .scope
            .as_ref()
            .map(|s| format!(" in area '{}'", s))
            .unwrap_or_default()
    );
    Ok(candidates)
}

pub fn is_sorted_by_grade(records: &[Record]) -> bool {
    records.windows(2).all(|w| w[0].grade_rank <= w[1].grade_rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryCatalog;

    #[test]
    fn test_ilike_translation() {
        let p = PlaceholderPattern::from_ilike("%n.n.%").unwrap();
        assert!(p.matches("n.n."));
        assert!(p.matches("bloc N.N. 3"));
        assert!(!p.matches("nxnx"));

        let q = PlaceholderPattern::from_ilike("_ave").unwrap();
        assert!(q.matches("cave"));
        assert!(!q.matches("grave"));
    }

    #[test]
    fn test_filter_rejects_ineligible_records() {
        let filter = CandidateFilter::with_default_patterns(None);
        assert!(filter.accepts(&Record::new(1, "la marie rose", 20, 1, 3)));
        assert!(!filter.accepts(&Record::new(2, "la marie rose", 20, 1, 0)));
        assert!(!filter.accepts(&Record::new(3, "la marie rose", 20, 1, 3).duplicate_of(1)));
        assert!(!filter.accepts(&Record::new(4, "n n", 20, 1, 3)));
        assert!(!filter.accepts(&Record::new(5, "bloc n.n. 2", 20, 1, 3)));
    }

    #[test]
    fn test_filter_scope() {
        let filter = CandidateFilter::with_default_patterns(Some("fontainebleau".to_string()));
        assert!(filter.accepts(&Record::new(1, "abc", 10, 1, 1).with_area("fontainebleau")));
        assert!(!filter.accepts(&Record::new(2, "abc", 10, 1, 1).with_area("magic-wood")));
        assert!(!filter.accepts(&Record::new(3, "abc", 10, 1, 1)));
    }

    #[tokio::test]
    async fn test_select_candidates_sorted_by_grade() {
        let store = InMemoryCatalog::from_records(vec![
            Record::new(1, "high", 30, 1, 2),
            Record::new(2, "low", 10, 1, 2),
            Record::new(3, "mid", 20, 1, 0),
            Record::new(4, "n.n.", 15, 1, 4),
        ]);
        let filter = CandidateFilter::with_default_patterns(None);
        let candidates = select_candidates(&store, &filter).await.unwrap();
        let ids: Vec<_> = candidates.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(is_sorted_by_grade(&candidates));
    }
}
