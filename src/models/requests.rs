// src/models/requests.rs
// Request parameters and response payloads for the dedupe operations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DedupeError;
use crate::matching::similarity::Algorithm;
use crate::models::record::{Record, RecordId};
use crate::models::stats_models::ClusteringStats;

pub const MAX_GRADE_TOLERANCE: i32 = 10;
pub const MAX_RESULTS_LIMIT: usize = 100;

fn validate_similarity(min_similarity: i32) -> Result<(), DedupeError> {
    if !(0..=100).contains(&min_similarity) {
        return Err(DedupeError::validation(format!(
            "min_similarity must be within [0, 100], got {}",
            min_similarity
        )));
    }
    Ok(())
}

fn validate_tolerance(grade_tolerance: i32) -> Result<(), DedupeError> {
    if !(0..=MAX_GRADE_TOLERANCE).contains(&grade_tolerance) {
        return Err(DedupeError::validation(format!(
            "grade_tolerance must be within [0, {}], got {}",
            MAX_GRADE_TOLERANCE, grade_tolerance
        )));
    }
    Ok(())
}

/// Parameters of a batch clustering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDuplicateParams {
    pub area_slug: Option<String>,
    pub min_similarity: i32,
    pub grade_tolerance: i32,
    pub algorithm: Algorithm,
    pub group_by_site: bool,
}

impl Default for BatchDuplicateParams {
    fn default() -> Self {
        Self {
            area_slug: None,
            min_similarity: 85,
            grade_tolerance: 2,
            algorithm: Algorithm::Ratio,
            group_by_site: true,
        }
    }
}

impl BatchDuplicateParams {
    pub fn validate(&self) -> Result<(), DedupeError> {
        validate_similarity(self.min_similarity)?;
        validate_tolerance(self.grade_tolerance)
    }
}

/// Parameters of an operator-driven search around one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleTargetParams {
    pub min_similarity: i32,
    pub grade_tolerance: i32,
    pub algorithm: Algorithm,
    pub max_results: usize,
}

impl Default for SingleTargetParams {
    fn default() -> Self {
        Self {
            min_similarity: 70,
            grade_tolerance: 3,
            algorithm: Algorithm::TokenSort,
            max_results: 20,
        }
    }
}

impl SingleTargetParams {
    pub fn validate(&self) -> Result<(), DedupeError> {
        validate_similarity(self.min_similarity)?;
        validate_tolerance(self.grade_tolerance)?;
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.max_results) {
            return Err(DedupeError::validation(format!(
                "max_results must be within [1, {}], got {}",
                MAX_RESULTS_LIMIT, self.max_results
            )));
        }
        Ok(())
    }
}

/// Record summary shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDuplicateInfo {
    pub id: RecordId,
    pub name: String,
    pub normalized_name: String,
    pub grade_label: String,
    pub grade_rank: i32,
    pub site_name: String,
    pub ascent_count: i64,
    pub similarity_score: Option<f64>,
}

impl RecordDuplicateInfo {
    pub fn from_record(record: &Record, similarity_score: Option<f64>) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            normalized_name: record.normalized_name.clone(),
            grade_label: record.grade_label.clone(),
            grade_rank: record.grade_rank,
            site_name: record.site_name.clone(),
            ascent_count: record.ascent_count,
            similarity_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroupInfo {
    pub records: Vec<RecordDuplicateInfo>,
    pub has_conflicts: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchDuplicateResponse {
    pub pass_id: Uuid,
    pub groups: Vec<DuplicateGroupInfo>,
    pub total_groups: usize,
    pub overlapping_record_ids: Vec<RecordId>,
    pub stats: ClusteringStats,
}

/// A candidate returned by the single-target matcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub record: Record,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SingleTargetDuplicatesResponse {
    pub record_id: RecordId,
    pub record_name: String,
    pub candidates: Vec<RecordDuplicateInfo>,
    pub existing_duplicates: Vec<RecordDuplicateInfo>,
}

/// One merge decision: mark `duplicate_ids` as duplicates of `target_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOperation {
    pub target_id: RecordId,
    pub duplicate_ids: Vec<RecordId>,
    #[serde(default)]
    pub ignore_ids: Vec<RecordId>,
}

impl MergeOperation {
    pub fn new(target_id: RecordId, duplicate_ids: Vec<RecordId>) -> Self {
        Self {
            target_id,
            duplicate_ids,
            ignore_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMergeRequest {
    pub merges: Vec<MergeOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeResult {
    pub target_id: RecordId,
    pub merged_count: usize,
    pub ignored_count: usize,
    pub cascaded_count: usize,
    pub success: bool,
    pub error: Option<String>,
}

impl MergeResult {
    pub fn failed(target_id: RecordId, error: &DedupeError) -> Self {
        Self {
            target_id,
            merged_count: 0,
            ignored_count: 0,
            cascaded_count: 0,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchMergeResponse {
    pub results: Vec<MergeResult>,
    pub total_operations: usize,
    pub successful: usize,
    pub failed: usize,
    pub message: String,
}

impl BatchMergeResponse {
    pub fn from_results(results: Vec<MergeResult>) -> Self {
        let total_operations = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let failed = total_operations - successful;
        Self {
            message: format!(
                "Processed {} merge operations: {} successful, {} failed",
                total_operations, successful, failed
            ),
            results,
            total_operations,
            successful,
            failed,
        }
    }

    /// Turns any failed operation into a `PartialBatchFailure`.
    pub fn ensure_all_succeeded(&self) -> Result<(), DedupeError> {
        if self.failed > 0 {
            return Err(DedupeError::PartialBatchFailure {
                failed: self.failed,
                total: self.total_operations,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoveDuplicateResponse {
    pub record_ids: Vec<RecordId>,
    pub cleared_count: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoveAscentsResponse {
    pub records_processed: usize,
    pub ascents_moved: u64,
    pub ascents_collapsed: u64,
    pub message: String,
}
