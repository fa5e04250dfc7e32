// src/storage/testing.rs
// Test-only store wrapper: counts target reads and injects write failures.

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::candidate_generation::candidate_generation::CandidateFilter;
use crate::error::DedupeError;
use crate::models::record::{ActivityMigration, PointerMerge, Record, RecordId};
use crate::storage::memory::InMemoryCatalog;
use crate::storage::CatalogStore;

pub struct InstrumentedCatalog {
    pub inner: InMemoryCatalog,
    pub fail_set_main_record: bool,
    pub fail_merge_pointers: bool,
    record_reads: AtomicUsize,
}

impl InstrumentedCatalog {
    pub fn new(inner: InMemoryCatalog) -> Self {
        Self {
            inner,
            fail_set_main_record: false,
            fail_merge_pointers: false,
            record_reads: AtomicUsize::new(0),
        }
    }

    /// Number of `record_by_id` calls so far.
    pub fn record_reads(&self) -> usize {
        self.record_reads.load(Ordering::SeqCst)
    }
}

fn injected() -> DedupeError {
    anyhow!("connection reset").into()
}

#[async_trait]
impl CatalogStore for InstrumentedCatalog {
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<Record>, DedupeError> {
        self.inner.candidates(filter).await
    }

    async fn record_by_id(&self, id: RecordId) -> Result<Option<Record>, DedupeError> {
        self.record_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.record_by_id(id).await
    }

    async fn records_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>, DedupeError> {
        self.inner.records_by_ids(ids).await
    }

    async fn independent_records_by_grade(
        &self,
        lo: i32,
        hi: i32,
    ) -> Result<Vec<Record>, DedupeError> {
        self.inner.independent_records_by_grade(lo, hi).await
    }

    async fn existing_duplicates_of(&self, id: RecordId) -> Result<Vec<Record>, DedupeError> {
        self.inner.existing_duplicates_of(id).await
    }

    async fn duplicate_pointers(&self) -> Result<Vec<(RecordId, RecordId)>, DedupeError> {
        self.inner.duplicate_pointers().await
    }

    async fn set_main_record(
        &self,
        ids: &[RecordId],
        target: RecordId,
    ) -> Result<u64, DedupeError> {
        if self.fail_set_main_record {
            return Err(injected());
        }
        self.inner.set_main_record(ids, target).await
    }

    async fn merge_pointers(
        &self,
        ids: &[RecordId],
        target: RecordId,
    ) -> Result<PointerMerge, DedupeError> {
        if self.fail_merge_pointers {
            return Err(injected());
        }
        self.inner.merge_pointers(ids, target).await
    }

    async fn clear_main_record(&self, ids: &[RecordId]) -> Result<u64, DedupeError> {
        self.inner.clear_main_record(ids).await
    }

    async fn reassign_activity(
        &self,
        source: RecordId,
        destination: RecordId,
    ) -> Result<ActivityMigration, DedupeError> {
        self.inner.reassign_activity(source, destination).await
    }
}
