// src/storage/postgres.rs

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row as PgRow;

use crate::candidate_generation::candidate_generation::CandidateFilter;
use crate::error::DedupeError;
use crate::models::record::{ActivityMigration, PointerMerge, Record, RecordId};
use crate::storage::CatalogStore;
use crate::utils::db_connect::PgPool;

/// Shared projection: every read returns the same columns so `record_from_row`
/// works for all of them.
const RECORD_SELECT: &str = "
    SELECT
        b.id,
        b.name,
        b.name_normalized,
        g.correspondence AS grade_rank,
        g.value AS grade_label,
        b.crag_id,
        c.name AS crag_name,
        ar.slug AS area_slug,
        (SELECT COUNT(*) FROM ascent a WHERE a.boulder_id = b.id) AS ascent_count,
        b.main_boulder_id
    FROM boulder b
    JOIN grade g ON g.id = b.grade_id
    JOIN crag c ON c.id = b.crag_id
    LEFT JOIN area ar ON ar.id = c.area_id";

/// Candidate query. `$1` is the placeholder pattern array; `$2` the area slug
/// when `scoped`.
pub fn build_candidates_query(scoped: bool) -> String {
    let mut query = format!(
        "{}
    WHERE b.main_boulder_id IS NULL
      AND EXISTS (SELECT 1 FROM ascent a WHERE a.boulder_id = b.id)
      AND NOT (b.name_normalized ILIKE ANY($1))",
        RECORD_SELECT
    );
    if scoped {
        query.push_str("\n      AND ar.slug = $2");
    }
    query.push_str("\n    ORDER BY g.correspondence, b.id");
    query
}

fn record_from_row(row: &PgRow) -> Record {
    Record {
        id: row.get("id"),
        name: row.get("name"),
        normalized_name: row.get("name_normalized"),
        grade_rank: row.get("grade_rank"),
        grade_label: row.get("grade_label"),
        site_id: row.get("crag_id"),
        site_name: row.get("crag_name"),
        area_slug: row.get("area_slug"),
        ascent_count: row.get("ascent_count"),
        main_record_id: row.get("main_boulder_id"),
    }
}

/// [`CatalogStore`] over the production Postgres schema
/// (`boulder`, `grade`, `crag`, `area`, `ascent`).
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn query_records(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
        what: &str,
    ) -> Result<Vec<Record>, DedupeError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection")?;
        let rows = conn
            .query(query, params)
            .await
            .with_context(|| format!("Failed to query {}", what))?;
        Ok(rows.iter().map(record_from_row).collect())
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<Record>, DedupeError> {
        let patterns = filter.ilike_patterns();
        let query = build_candidates_query(filter.scope.is_some());
        let records = match &filter.scope {
            Some(slug) => {
                self.query_records(&query, &[&patterns, slug], "candidate records")
                    .await?
            }
            None => {
                self.query_records(&query, &[&patterns], "candidate records")
                    .await?
            }
        };
        debug!("Fetched {} candidate records from Postgres", records.len());
        Ok(records)
    }

    async fn record_by_id(&self, id: RecordId) -> Result<Option<Record>, DedupeError> {
        let query = format!("{}\n    WHERE b.id = $1", RECORD_SELECT);
        let mut records = self.query_records(&query, &[&id], "record by id").await?;
        Ok(records.pop())
    }

    async fn records_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>, DedupeError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        let query = format!("{}\n    WHERE b.id = ANY($1)\n    ORDER BY b.id", RECORD_SELECT);
        self.query_records(&query, &[&ids], "records by ids").await
    }

    async fn independent_records_by_grade(
        &self,
        lo: i32,
        hi: i32,
    ) -> Result<Vec<Record>, DedupeError> {
        let query = format!(
            "{}
    WHERE b.main_boulder_id IS NULL
      AND g.correspondence BETWEEN $1 AND $2
    ORDER BY b.id",
            RECORD_SELECT
        );
        self.query_records(&query, &[&lo, &hi], "records in grade window")
            .await
    }

    async fn existing_duplicates_of(&self, id: RecordId) -> Result<Vec<Record>, DedupeError> {
        let query = format!(
            "{}\n    WHERE b.main_boulder_id = $1\n    ORDER BY b.id",
            RECORD_SELECT
        );
        self.query_records(&query, &[&id], "existing duplicates")
            .await
    }

    async fn duplicate_pointers(&self) -> Result<Vec<(RecordId, RecordId)>, DedupeError> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection")?;
        let rows = conn
            .query(
                "SELECT id, main_boulder_id FROM boulder WHERE main_boulder_id IS NOT NULL ORDER BY id",
                &[],
            )
            .await
            .context("Failed to query duplicate pointers")?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("main_boulder_id")))
            .collect())
    }

    async fn set_main_record(
        &self,
        ids: &[RecordId],
        target: RecordId,
    ) -> Result<u64, DedupeError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection")?;
        let updated = conn
            .execute(
                "UPDATE boulder SET main_boulder_id = $2 WHERE id = ANY($1)",
                &[&ids, &target],
            )
            .await
            .context("Failed to set main_boulder_id")?;
        debug!("Pointed {} records at {}", updated, target);
        Ok(updated)
    }

    async fn merge_pointers(
        &self,
        ids: &[RecordId],
        target: RecordId,
    ) -> Result<PointerMerge, DedupeError> {
        let ids: Vec<RecordId> = ids.iter().copied().filter(|&id| id != target).collect();
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start merge transaction")?;

        // Lock the target row so it cannot become a duplicate before commit.
        let row = tx
            .query_opt(
                "SELECT main_boulder_id FROM boulder WHERE id = $1 FOR UPDATE",
                &[&target],
            )
            .await
            .context("Failed to lock merge target")?
            .ok_or(DedupeError::NotFound(target))?;
        let main: Option<RecordId> = row.get("main_boulder_id");
        if let Some(main) = main {
            return Err(DedupeError::TargetIsDuplicate { target, main });
        }

        let redirected = tx
            .execute(
                "UPDATE boulder SET main_boulder_id = $2
                 WHERE main_boulder_id = ANY($1) AND NOT (id = ANY($1))",
                &[&ids, &target],
            )
            .await
            .context("Failed to redirect existing duplicates")?;
        let merged = tx
            .execute(
                "UPDATE boulder SET main_boulder_id = $2 WHERE id = ANY($1)",
                &[&ids, &target],
            )
            .await
            .context("Failed to set main_boulder_id")?;

        tx.commit()
            .await
            .context("Failed to commit merge transaction")?;
        debug!(
            "Pointed {} records at {} ({} redirected)",
            merged, target, redirected
        );
        Ok(PointerMerge { merged, redirected })
    }

    async fn clear_main_record(&self, ids: &[RecordId]) -> Result<u64, DedupeError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection")?;
        let updated = conn
            .execute(
                "UPDATE boulder SET main_boulder_id = NULL
                 WHERE id = ANY($1) AND main_boulder_id IS NOT NULL",
                &[&ids],
            )
            .await
            .context("Failed to clear main_boulder_id")?;
        Ok(updated)
    }

    async fn reassign_activity(
        &self,
        source: RecordId,
        destination: RecordId,
    ) -> Result<ActivityMigration, DedupeError> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start ascent transaction")?;

        // Same climber on both records: keep the earlier date on the destination row.
        tx.execute(
            "UPDATE ascent d SET log_date = LEAST(d.log_date, s.log_date)
             FROM ascent s
             WHERE d.boulder_id = $2 AND s.boulder_id = $1 AND s.user_id = d.user_id",
            &[&source, &destination],
        )
        .await
        .context("Failed to merge ascent dates")?;

        let collapsed = tx
            .execute(
                "DELETE FROM ascent s USING ascent d
                 WHERE s.boulder_id = $1 AND d.boulder_id = $2 AND s.user_id = d.user_id",
                &[&source, &destination],
            )
            .await
            .context("Failed to collapse conflicting ascents")?;

        let moved = tx
            .execute(
                "UPDATE ascent SET boulder_id = $2 WHERE boulder_id = $1",
                &[&source, &destination],
            )
            .await
            .context("Failed to move ascents")?;

        tx.commit()
            .await
            .context("Failed to commit ascent transaction")?;

        info!(
            "Moved {} ascents from {} to {} ({} collapsed)",
            moved, source, destination, collapsed
        );
        Ok(ActivityMigration { moved, collapsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_query_unscoped() {
        let q = build_candidates_query(false);
        assert!(q.contains("b.main_boulder_id IS NULL"));
        assert!(q.contains("ILIKE ANY($1)"));
        assert!(!q.contains("$2"));
        assert!(q.trim_end().ends_with("ORDER BY g.correspondence, b.id"));
    }

    #[test]
    fn test_candidates_query_scoped() {
        let q = build_candidates_query(true);
        assert!(q.contains("ar.slug = $2"));
        let slug_pos = q.find("ar.slug = $2").unwrap();
        let order_pos = q.find("ORDER BY").unwrap();
        assert!(slug_pos < order_pos);
    }
}
