// src/merging/resolver.rs
//
// Applies operator merge decisions to the duplicate-pointer state and moves
// ascent history between records. Pointer chains are kept flat: after every
// merge, each duplicate points straight at an independent record.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::DedupeError;
use crate::models::record::RecordId;
use crate::models::requests::{
    BatchMergeRequest, BatchMergeResponse, MergeOperation, MergeResult, MoveAscentsResponse,
    RemoveDuplicateResponse,
};
use crate::storage::CatalogStore;

pub struct MergeResolver {
    store: Arc<dyn CatalogStore>,
    /// Serializes every pointer and activity write issued through this resolver.
    write_lock: Mutex<()>,
}

impl MergeResolver {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Marks `op.duplicate_ids` (minus `op.ignore_ids`) as duplicates of
    /// `op.target_id`, then redirects anything that pointed at one of them.
    ///
    /// Rejected when the target lists itself, does not exist, or is itself a
    /// duplicate. Unknown duplicate ids are skipped.
    pub async fn merge(&self, op: &MergeOperation) -> Result<MergeResult, DedupeError> {
        let target_id = op.target_id;
        if op.duplicate_ids.contains(&target_id) {
            return Err(DedupeError::SelfMergeRejected(target_id));
        }

        let _guard = self.write_lock.lock().await;

        let ignored: HashSet<RecordId> = op.ignore_ids.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut requested = Vec::with_capacity(op.duplicate_ids.len());
        let mut ignored_count = 0;
        for &id in &op.duplicate_ids {
            if !seen.insert(id) {
                continue;
            }
            if ignored.contains(&id) {
                ignored_count += 1;
            } else {
                requested.push(id);
            }
        }

        let existing: Vec<RecordId> = self
            .store
            .records_by_ids(&requested)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        if existing.len() != requested.len() {
            let found: HashSet<RecordId> = existing.iter().copied().collect();
            let missing: Vec<RecordId> = requested
                .iter()
                .copied()
                .filter(|id| !found.contains(id))
                .collect();
            warn!(
                "Merge into {}: skipping unknown duplicate ids {:?}",
                target_id, missing
            );
        }

        // One atomic store write; it also re-checks the target.
        let outcome = self.store.merge_pointers(&existing, target_id).await?;
        if outcome.redirected > 0 {
            debug!(
                "Redirected {} records from merged ids to {}",
                outcome.redirected, target_id
            );
        }

        info!(
            "Merged {} records into {} ({} ignored, {} redirected)",
            outcome.merged, target_id, ignored_count, outcome.redirected
        );
        Ok(MergeResult {
            target_id,
            merged_count: outcome.merged as usize,
            ignored_count,
            cascaded_count: outcome.redirected as usize,
            success: true,
            error: None,
        })
    }

    /// Applies each operation in order; one failure neither stops nor undoes
    /// the others.
    pub async fn merge_batch(&self, request: &BatchMergeRequest) -> BatchMergeResponse {
        let mut results = Vec::with_capacity(request.merges.len());
        for op in &request.merges {
            let result = match self.merge(op).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Merge into {} failed: {}", op.target_id, e);
                    MergeResult::failed(op.target_id, &e)
                }
            };
            results.push(result);
        }
        let response = BatchMergeResponse::from_results(results);
        info!("{}", response.message);
        response
    }

    /// Makes every listed record independent again. Records that point at
    /// the unmarked ones are left alone.
    pub async fn unmark(&self, record_ids: &[RecordId]) -> Result<RemoveDuplicateResponse, DedupeError> {
        if record_ids.is_empty() {
            return Err(DedupeError::validation("no record ids supplied"));
        }
        let _guard = self.write_lock.lock().await;
        let cleared_count = self.store.clear_main_record(record_ids).await?;
        info!(
            "Cleared duplicate status on {} of {} records",
            cleared_count,
            record_ids.len()
        );
        Ok(RemoveDuplicateResponse {
            record_ids: record_ids.to_vec(),
            cleared_count,
            message: format!("Removed duplicate status from {} records", cleared_count),
        })
    }

    /// Moves every ascent of `source` onto `destination`.
    pub async fn move_ascents(
        &self,
        source: RecordId,
        destination: RecordId,
    ) -> Result<MoveAscentsResponse, DedupeError> {
        if source == destination {
            return Err(DedupeError::validation(format!(
                "cannot move ascents of record {} onto itself",
                source
            )));
        }
        let _guard = self.write_lock.lock().await;
        for id in [source, destination] {
            if self.store.record_by_id(id).await?.is_none() {
                return Err(DedupeError::NotFound(id));
            }
        }

        let outcome = self.store.reassign_activity(source, destination).await?;
        Ok(MoveAscentsResponse {
            records_processed: 1,
            ascents_moved: outcome.moved,
            ascents_collapsed: outcome.collapsed,
            message: format!(
                "Moved {} ascents from {} to {} ({} merged with existing ascents)",
                outcome.moved, source, destination, outcome.collapsed
            ),
        })
    }

    /// Moves the ascents of every current duplicate onto its main record.
    pub async fn resolve_all_duplicate_pointers(&self) -> Result<MoveAscentsResponse, DedupeError> {
        let _guard = self.write_lock.lock().await;
        let pointers = self.store.duplicate_pointers().await?;
        info!("Moving ascents for {} duplicate records", pointers.len());

        let mut response = MoveAscentsResponse::default();
        for (duplicate, main) in pointers {
            let outcome = self.store.reassign_activity(duplicate, main).await?;
            if outcome.moved + outcome.collapsed > 0 {
                debug!(
                    "{} -> {}: {} moved, {} collapsed",
                    duplicate, main, outcome.moved, outcome.collapsed
                );
            }
            response.records_processed += 1;
            response.ascents_moved += outcome.moved;
            response.ascents_collapsed += outcome.collapsed;
        }
        response.message = format!(
            "Processed {} duplicate records: {} ascents moved, {} merged with existing ascents",
            response.records_processed, response.ascents_moved, response.ascents_collapsed
        );
        info!("{}", response.message);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{Ascent, Record};
    use crate::storage::memory::{CatalogSnapshot, InMemoryCatalog};
    use crate::storage::testing::InstrumentedCatalog;
    use chrono::NaiveDate;

    fn chained_store(fail_merge: bool) -> Arc<InstrumentedCatalog> {
        // 1 -> 2 already; 3 independent. Piecemeal pointer writes always fail.
        let mut store = InstrumentedCatalog::new(InMemoryCatalog::from_records(vec![
            Record::new(1, "la marie rose", 18, 1, 1).duplicate_of(2),
            Record::new(2, "la marie rose", 18, 1, 1),
            Record::new(3, "la marie rose", 18, 1, 1),
        ]));
        store.fail_set_main_record = true;
        store.fail_merge_pointers = fail_merge;
        Arc::new(store)
    }

    fn resolver_with(records: Vec<Record>) -> (Arc<InMemoryCatalog>, MergeResolver) {
        let store = Arc::new(InMemoryCatalog::from_records(records));
        let resolver = MergeResolver::new(store.clone());
        (store, resolver)
    }

    fn independent(ids: &[RecordId]) -> Vec<Record> {
        ids.iter()
            .map(|&id| Record::new(id, "la marie rose", 18, 1, 1))
            .collect()
    }

    #[tokio::test]
    async fn test_cascade_keeps_pointers_flat() {
        let (store, resolver) = resolver_with(independent(&[1, 2, 3, 4]));
        resolver.merge(&MergeOperation::new(1, vec![2, 3])).await.unwrap();
        let result = resolver.merge(&MergeOperation::new(4, vec![1])).await.unwrap();

        assert_eq!(result.merged_count, 1);
        assert_eq!(result.cascaded_count, 2);
        for id in [1, 2, 3] {
            assert_eq!(store.main_record_of(id).await, Some(4));
        }
        assert_eq!(store.main_record_of(4).await, None);
    }

    #[tokio::test]
    async fn test_cascade_from_prior_state() {
        // A -> B already; merging B into C must leave A pointing at C.
        let mut records = independent(&[2, 3]);
        records.push(Record::new(1, "la marie rose", 18, 1, 1).duplicate_of(2));
        let (store, resolver) = resolver_with(records);
        resolver.merge(&MergeOperation::new(3, vec![2])).await.unwrap();
        assert_eq!(store.main_record_of(1).await, Some(3));
        assert_eq!(store.main_record_of(2).await, Some(3));
    }

    #[tokio::test]
    async fn test_merge_and_redirect_are_one_write() {
        let store = chained_store(false);
        let resolver = MergeResolver::new(store.clone());
        let result = resolver.merge(&MergeOperation::new(3, vec![2])).await.unwrap();

        assert_eq!(result.merged_count, 1);
        assert_eq!(result.cascaded_count, 1);
        assert_eq!(store.inner.main_record_of(1).await, Some(3));
        assert_eq!(store.inner.main_record_of(2).await, Some(3));
    }

    #[tokio::test]
    async fn test_failed_merge_write_leaves_no_chain() {
        let store = chained_store(true);
        let resolver = MergeResolver::new(store.clone());
        assert!(resolver.merge(&MergeOperation::new(3, vec![2])).await.is_err());

        assert_eq!(store.inner.main_record_of(1).await, Some(2));
        assert_eq!(store.inner.main_record_of(2).await, None);
        assert_eq!(store.inner.main_record_of(3).await, None);
    }

    #[tokio::test]
    async fn test_self_merge_is_rejected() {
        let (store, resolver) = resolver_with(independent(&[1, 2]));
        let result = resolver.merge(&MergeOperation::new(1, vec![2, 1])).await;
        assert!(matches!(result, Err(DedupeError::SelfMergeRejected(1))));
        assert_eq!(store.main_record_of(2).await, None);
    }

    #[tokio::test]
    async fn test_merging_into_a_duplicate_is_rejected() {
        let (_, resolver) = resolver_with(independent(&[1, 2, 3]));
        resolver.merge(&MergeOperation::new(1, vec![2])).await.unwrap();
        let result = resolver.merge(&MergeOperation::new(2, vec![3])).await;
        assert!(matches!(
            result,
            Err(DedupeError::TargetIsDuplicate { target: 2, main: 1 })
        ));
    }

    #[tokio::test]
    async fn test_ignored_and_unknown_ids_are_not_merged() {
        let (store, resolver) = resolver_with(independent(&[1, 2, 3]));
        let op = MergeOperation {
            target_id: 1,
            duplicate_ids: vec![2, 3, 3, 42],
            ignore_ids: vec![3],
        };
        let result = resolver.merge(&op).await.unwrap();
        assert_eq!(result.merged_count, 1);
        assert_eq!(result.ignored_count, 1);
        assert_eq!(store.main_record_of(2).await, Some(1));
        assert_eq!(store.main_record_of(3).await, None);
    }

    #[tokio::test]
    async fn test_batch_reports_each_operation() {
        let (store, resolver) = resolver_with(independent(&[1, 2, 3, 4]));
        let request = BatchMergeRequest {
            merges: vec![
                MergeOperation::new(1, vec![2]),
                MergeOperation::new(99, vec![3]),
                MergeOperation::new(4, vec![3]),
            ],
        };
        let response = resolver.merge_batch(&request).await;
        assert_eq!(response.total_operations, 3);
        assert_eq!(response.successful, 2);
        assert_eq!(response.failed, 1);
        assert!(!response.results[1].success);
        assert!(response.results[1].error.is_some());
        assert_eq!(store.main_record_of(2).await, Some(1));
        assert_eq!(store.main_record_of(3).await, Some(4));
        assert!(response.ensure_all_succeeded().is_err());
    }

    #[tokio::test]
    async fn test_unmark_leaves_other_pointers() {
        let (store, resolver) = resolver_with(independent(&[1, 2, 3]));
        resolver.merge(&MergeOperation::new(1, vec![2, 3])).await.unwrap();
        let response = resolver.unmark(&[2, 1]).await.unwrap();
        assert_eq!(response.cleared_count, 1);
        assert_eq!(store.main_record_of(2).await, None);
        assert_eq!(store.main_record_of(3).await, Some(1));
        assert!(matches!(
            resolver.unmark(&[]).await,
            Err(DedupeError::Validation(_))
        ));
    }

    fn ascent(record_id: RecordId, user_id: i32, day: u32) -> Ascent {
        Ascent {
            record_id,
            user_id,
            log_date: NaiveDate::from_ymd_opt(2023, 9, day).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_move_ascents_empties_source() {
        let store = Arc::new(InMemoryCatalog::from_snapshot(CatalogSnapshot {
            records: independent(&[1, 2]),
            ascents: vec![ascent(1, 10, 1), ascent(2, 11, 2), ascent(2, 12, 3)],
        }));
        let resolver = MergeResolver::new(store.clone());
        let response = resolver.move_ascents(2, 1).await.unwrap();

        assert_eq!(response.ascents_moved, 2);
        assert_eq!(response.ascents_collapsed, 0);
        assert!(store.ascents_of(2).await.is_empty());
        assert_eq!(store.ascents_of(1).await.len(), 3);
    }

    #[tokio::test]
    async fn test_move_ascents_counts_collapsed_rows() {
        let store = Arc::new(InMemoryCatalog::from_snapshot(CatalogSnapshot {
            records: independent(&[1, 2]),
            ascents: vec![ascent(1, 10, 5), ascent(2, 10, 2), ascent(2, 11, 3)],
        }));
        let resolver = MergeResolver::new(store.clone());
        let response = resolver.move_ascents(2, 1).await.unwrap();

        // dest_after = 1 + 2 - 1
        assert_eq!(response.ascents_collapsed, 1);
        assert_eq!(store.ascents_of(1).await.len(), 2);
        assert!(store.ascents_of(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_move_ascents_validation() {
        let (_, resolver) = resolver_with(independent(&[1]));
        assert!(matches!(
            resolver.move_ascents(1, 1).await,
            Err(DedupeError::Validation(_))
        ));
        assert!(matches!(
            resolver.move_ascents(7, 1).await,
            Err(DedupeError::NotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_resolve_all_duplicate_pointers() {
        let mut records = independent(&[1, 4]);
        records.push(Record::new(2, "la marie rose", 18, 1, 0).duplicate_of(1));
        records.push(Record::new(3, "la marie rose", 18, 1, 0).duplicate_of(4));
        let store = Arc::new(InMemoryCatalog::from_snapshot(CatalogSnapshot {
            records,
            ascents: vec![ascent(2, 10, 1), ascent(3, 11, 1), ascent(3, 12, 1)],
        }));
        let resolver = MergeResolver::new(store.clone());
        let response = resolver.resolve_all_duplicate_pointers().await.unwrap();

        assert_eq!(response.records_processed, 2);
        assert_eq!(response.ascents_moved, 3);
        assert_eq!(store.ascents_of(1).await.len(), 1);
        assert_eq!(store.ascents_of(4).await.len(), 2);
    }
}
