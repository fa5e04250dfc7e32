// src/matching/single_target.rs
// Operator-driven duplicate search around one record.

use log::{debug, info};
use std::cmp::Ordering;

use crate::error::DedupeError;
use crate::matching::similarity::score;
use crate::models::record::{Record, RecordId};
use crate::models::requests::{
    RecordDuplicateInfo, ScoredCandidate, SingleTargetDuplicatesResponse, SingleTargetParams,
};
use crate::storage::CatalogStore;

/// Inclusive `grade_rank` window searched around `target`.
pub fn grade_window(target: &Record, grade_tolerance: i32) -> (i32, i32) {
    (
        target.grade_rank - grade_tolerance,
        target.grade_rank + grade_tolerance,
    )
}

/// Scores `pool` against `target` and keeps the best `max_results`.
///
/// The target itself, records already marked as duplicates and anything
/// outside the grade window are never considered, whatever the store
/// returned. Ties on score are ordered by ascending id.
pub fn rank_candidates(
    target: &Record,
    pool: &[Record],
    params: &SingleTargetParams,
) -> Vec<ScoredCandidate> {
    let (lo, hi) = grade_window(target, params.grade_tolerance);
    let threshold = params.min_similarity as f64;

    let mut scored: Vec<ScoredCandidate> = pool
        .iter()
        .filter(|r| r.id != target.id && r.is_independent())
        .filter(|r| r.grade_rank >= lo && r.grade_rank <= hi)
        .filter_map(|r| {
            let s = score(&target.normalized_name, &r.normalized_name, params.algorithm);
            (s >= threshold).then(|| ScoredCandidate {
                record: r.clone(),
                score: s,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    scored.truncate(params.max_results);
    scored
}

async fn load_target(store: &dyn CatalogStore, target_id: RecordId) -> Result<Record, DedupeError> {
    store
        .record_by_id(target_id)
        .await?
        .ok_or(DedupeError::NotFound(target_id))
}

/// Ranked likely duplicates of `target_id`. Fails with `NotFound` when the
/// target does not exist.
pub async fn find_duplicates(
    store: &dyn CatalogStore,
    target_id: RecordId,
    params: &SingleTargetParams,
) -> Result<Vec<ScoredCandidate>, DedupeError> {
    params.validate()?;
    let target = load_target(store, target_id).await?;
    duplicates_around(store, &target, params).await
}

/// Everything an operator needs to review one record: ranked candidates plus
/// the records already merged into it.
pub async fn inspect_record(
    store: &dyn CatalogStore,
    target_id: RecordId,
    params: &SingleTargetParams,
) -> Result<SingleTargetDuplicatesResponse, DedupeError> {
    params.validate()?;
    let target = load_target(store, target_id).await?;
    let candidates = duplicates_around(store, &target, params).await?;
    let existing = store.existing_duplicates_of(target_id).await?;

    Ok(SingleTargetDuplicatesResponse {
        record_id: target.id,
        record_name: target.name,
        candidates: candidates
            .iter()
            .map(|c| RecordDuplicateInfo::from_record(&c.record, Some(c.score)))
            .collect(),
        existing_duplicates: existing
            .iter()
            .map(|r| RecordDuplicateInfo::from_record(r, None))
            .collect(),
    })
}

// `params` already validated and `target` already loaded.
async fn duplicates_around(
    store: &dyn CatalogStore,
    target: &Record,
    params: &SingleTargetParams,
) -> Result<Vec<ScoredCandidate>, DedupeError> {
    let (lo, hi) = grade_window(target, params.grade_tolerance);
    let pool = store.independent_records_by_grade(lo, hi).await?;
    debug!(
        "Scoring {} records in grade window [{}, {}] against {}",
        pool.len(),
        lo,
        hi,
        target.id
    );

    let ranked = rank_candidates(target, &pool, params);
    info!(
        "Found {} likely duplicates of record {} ('{}')",
        ranked.len(),
        target.id,
        target.name
    );
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::similarity::Algorithm;
    use crate::storage::memory::InMemoryCatalog;
    use crate::storage::testing::InstrumentedCatalog;

    fn store() -> InMemoryCatalog {
        InMemoryCatalog::from_records(vec![
            Record::new(1, "dalle du jardin", 20, 1, 4),
            Record::new(2, "jardin dalle du", 17, 2, 1),
            Record::new(3, "dalle du jardin", 24, 1, 9),
            Record::new(4, "dalle du jardim", 23, 3, 0),
            Record::new(5, "dalle du jardin", 20, 1, 2).duplicate_of(1),
            Record::new(6, "arete du moine", 20, 1, 7),
        ])
    }

    #[tokio::test]
    async fn test_grade_window_is_enforced() {
        let store = store();
        let params = SingleTargetParams::default();
        let found = find_duplicates(&store, 1, &params).await.unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.record.id).collect();

        // 3 is an exact name match but sits at grade 24, outside [17, 23].
        assert!(!ids.contains(&3));
        assert!(!ids.contains(&1));
        assert!(!ids.contains(&5));
        assert!(!ids.contains(&6));
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(found[0].score, 100.0);
        assert!(found.iter().all(|c| (17..=23).contains(&c.record.grade_rank)));
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found() {
        let store = store();
        let result = find_duplicates(&store, 99, &SingleTargetParams::default()).await;
        assert!(matches!(result, Err(DedupeError::NotFound(99))));
    }

    #[test]
    fn test_rank_candidates_orders_and_truncates() {
        let target = Record::new(1, "abcd", 10, 1, 1);
        let pool = vec![
            Record::new(9, "abcx", 10, 1, 1),
            Record::new(3, "abcx", 10, 1, 1),
            Record::new(4, "abcd", 11, 1, 1),
            Record::new(5, "abcd", 30, 1, 1),
        ];
        let params = SingleTargetParams {
            min_similarity: 50,
            grade_tolerance: 3,
            algorithm: Algorithm::Ratio,
            max_results: 2,
        };
        let ranked = rank_candidates(&target, &pool, &params);
        let ids: Vec<_> = ranked.iter().map(|c| c.record.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[tokio::test]
    async fn test_inspect_record_lists_existing_duplicates() {
        let store = store();
        let response = inspect_record(&store, 1, &SingleTargetParams::default())
            .await
            .unwrap();
        assert_eq!(response.record_name, "dalle du jardin");
        assert_eq!(response.existing_duplicates.len(), 1);
        assert_eq!(response.existing_duplicates[0].id, 5);
        assert!(response
            .candidates
            .iter()
            .all(|c| c.similarity_score.is_some()));
    }

    #[tokio::test]
    async fn test_inspect_record_reads_target_once() {
        let store = InstrumentedCatalog::new(store());
        let response = inspect_record(&store, 1, &SingleTargetParams::default())
            .await
            .unwrap();
        assert_eq!(store.record_reads(), 1);

        let direct = find_duplicates(&store, 1, &SingleTargetParams::default())
            .await
            .unwrap();
        let ids: Vec<_> = response.candidates.iter().map(|c| c.id).collect();
        let direct_ids: Vec<_> = direct.iter().map(|c| c.record.id).collect();
        assert_eq!(ids, direct_ids);
    }
}
