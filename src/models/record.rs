// src/models/record.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type RecordId = i32;

/// Read-only projection of a catalogued route, taken once per pass.
///
/// `main_record_id` is the duplicate pointer: `None` means the record is
/// independent, `Some(x)` means it has been merged into record `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    /// Filled from `name` when a snapshot omits it.
    #[serde(default)]
    pub normalized_name: String,
    pub grade_rank: i32,
    #[serde(default)]
    pub grade_label: String,
    pub site_id: i32,
    #[serde(default)]
    pub site_name: String,
    #[serde(default)]
    pub area_slug: Option<String>,
    #[serde(default)]
    pub ascent_count: i64,
    #[serde(default)]
    pub main_record_id: Option<RecordId>,
}

impl Record {
    /// Minimal constructor; display fields default to the normalized name.
    pub fn new(
        id: RecordId,
        normalized_name: &str,
        grade_rank: i32,
        site_id: i32,
        ascent_count: i64,
    ) -> Self {
        Self {
            id,
            name: normalized_name.to_string(),
            normalized_name: normalized_name.to_string(),
            grade_rank,
            grade_label: grade_rank.to_string(),
            site_id,
            site_name: format!("site-{}", site_id),
            area_slug: None,
            ascent_count,
            main_record_id: None,
        }
    }

    pub fn with_area(mut self, area_slug: &str) -> Self {
        self.area_slug = Some(area_slug.to_string());
        self
    }

    pub fn duplicate_of(mut self, main: RecordId) -> Self {
        self.main_record_id = Some(main);
        self
    }

    pub fn is_independent(&self) -> bool {
        self.main_record_id.is_none()
    }
}

/// One logged ascent. Unique per `(record_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ascent {
    pub record_id: RecordId,
    pub user_id: i32,
    pub log_date: NaiveDate,
}

/// Undirected scored pair produced during one graph build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityEdge {
    pub record_id_a: RecordId,
    pub record_id_b: RecordId,
    pub score: f64,
}

impl SimilarityEdge {
    /// Stores the pair with the smaller id first.
    pub fn new(a: RecordId, b: RecordId, score: f64) -> Self {
        let (record_id_a, record_id_b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            record_id_a,
            record_id_b,
            score,
        }
    }
}

/// Recommended merge group, ordered by descending ascent count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub records: Vec<Record>,
}

impl DuplicateGroup {
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of reassigning activity from one record to another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityMigration {
    pub moved: u64,
    pub collapsed: u64,
}

/// Outcome of one merge write: `merged` records now point at the target and
/// `redirected` records were moved off a merged record onto it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PointerMerge {
    pub merged: u64,
    pub redirected: u64,
}
