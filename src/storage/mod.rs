//! Storage collaborator seam.
//!
//! The engine never talks to a database directly: every read and every
//! duplicate-pointer or activity write goes through [`CatalogStore`].

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::candidate_generation::candidate_generation::CandidateFilter;
use crate::error::DedupeError;
use crate::models::record::{ActivityMigration, PointerMerge, Record, RecordId};

pub use memory::{CatalogSnapshot, InMemoryCatalog};
pub use postgres::PgCatalog;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Records eligible for automatic clustering, ascending by `grade_rank`.
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<Record>, DedupeError>;

    async fn record_by_id(&self, id: RecordId) -> Result<Option<Record>, DedupeError>;

    /// Existing records among `ids`; missing ids are simply absent.
    async fn records_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>, DedupeError>;

    /// Independent records with `lo <= grade_rank <= hi`.
    async fn independent_records_by_grade(
        &self,
        lo: i32,
        hi: i32,
    ) -> Result<Vec<Record>, DedupeError>;

    /// Records whose `main_record_id` is `id`.
    async fn existing_duplicates_of(&self, id: RecordId) -> Result<Vec<Record>, DedupeError>;

    /// Every `(duplicate_id, main_id)` pointer currently set.
    async fn duplicate_pointers(&self) -> Result<Vec<(RecordId, RecordId)>, DedupeError>;

    /// Points every id in `ids` at `target`. Returns the number of rows changed.
    async fn set_main_record(&self, ids: &[RecordId], target: RecordId)
        -> Result<u64, DedupeError>;

    /// Points `ids` at `target` and redirects every record that pointed at one
    /// of `ids` onto `target`, as one atomic write.
    ///
    /// Fails with `NotFound` or `TargetIsDuplicate`, writing nothing, when
    /// `target` is missing or is itself a duplicate at write time.
    async fn merge_pointers(
        &self,
        ids: &[RecordId],
        target: RecordId,
    ) -> Result<PointerMerge, DedupeError>;

    /// Resets `ids` to independent. Returns the number of rows changed.
    async fn clear_main_record(&self, ids: &[RecordId]) -> Result<u64, DedupeError>;

    /// Moves every ascent of `source` onto `destination` in one transaction.
    async fn reassign_activity(
        &self,
        source: RecordId,
        destination: RecordId,
    ) -> Result<ActivityMigration, DedupeError>;
}
