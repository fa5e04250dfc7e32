// src/storage/memory.rs
// Snapshot-backed catalog: used by tests and by offline runs against a JSON
// export of the catalog.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;

use crate::candidate_generation::candidate_generation::CandidateFilter;
use crate::error::DedupeError;
use crate::matching::normalize::normalize_name;
use crate::models::record::{ActivityMigration, Ascent, PointerMerge, Record, RecordId};
use crate::storage::CatalogStore;

/// Serialized form of the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub records: Vec<Record>,
    #[serde(default)]
    pub ascents: Vec<Ascent>,
}

#[derive(Debug, Default)]
struct CatalogState {
    records: BTreeMap<RecordId, Record>,
    ascents: Vec<Ascent>,
}

impl CatalogState {
    fn sync_ascent_count(&mut self, id: RecordId) {
        let count = self.ascents.iter().filter(|a| a.record_id == id).count() as i64;
        if let Some(record) = self.records.get_mut(&id) {
            record.ascent_count = count;
        }
    }
}

/// In-memory [`CatalogStore`]. Every write holds the state lock for its whole
/// read-modify-write.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    /// Records only; `ascent_count` is taken as given.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::from_snapshot(CatalogSnapshot {
            records,
            ascents: Vec::new(),
        })
    }

    /// When the snapshot carries ascent rows, `ascent_count` is recomputed from
    /// them. Records without a `normalized_name` get one from `name`.
    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let mut state = CatalogState {
            records: snapshot
                .records
                .into_iter()
                .map(|mut r| {
                    if r.normalized_name.is_empty() {
                        r.normalized_name = normalize_name(&r.name);
                    }
                    (r.id, r)
                })
                .collect(),
            ascents: snapshot.ascents,
        };
        if !state.ascents.is_empty() {
            let mut counts: HashMap<RecordId, i64> = HashMap::new();
            for ascent in &state.ascents {
                *counts.entry(ascent.record_id).or_insert(0) += 1;
            }
            for record in state.records.values_mut() {
                record.ascent_count = counts.get(&record.id).copied().unwrap_or(0);
            }
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn load_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog snapshot {}", path.display()))?;
        let snapshot: CatalogSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse catalog snapshot {}", path.display()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn save_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot().await;
        let raw = serde_json::to_string_pretty(&snapshot)
            .context("Failed to serialize catalog snapshot")?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("Failed to write catalog snapshot {}", path.display()))?;
        Ok(())
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.read().await;
        CatalogSnapshot {
            records: state.records.values().cloned().collect(),
            ascents: state.ascents.clone(),
        }
    }

    pub async fn insert_ascent(&self, ascent: Ascent) {
        let mut state = self.state.write().await;
        let id = ascent.record_id;
        state.ascents.push(ascent);
        state.sync_ascent_count(id);
    }

    pub async fn ascents_of(&self, id: RecordId) -> Vec<Ascent> {
        let state = self.state.read().await;
        state
            .ascents
            .iter()
            .filter(|a| a.record_id == id)
            .cloned()
            .collect()
    }

    pub async fn main_record_of(&self, id: RecordId) -> Option<RecordId> {
        let state = self.state.read().await;
        state.records.get(&id).and_then(|r| r.main_record_id)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<Record>, DedupeError> {
        let state = self.state.read().await;
        let mut records: Vec<Record> = state
            .records
            .values()
            .filter(|r| filter.accepts(r))
            .cloned()
            .collect();
        // Stable: ties keep ascending id order from the BTreeMap.
        records.sort_by_key(|r| r.grade_rank);
        Ok(records)
    }

    async fn record_by_id(&self, id: RecordId) -> Result<Option<Record>, DedupeError> {
        let state = self.state.read().await;
        Ok(state.records.get(&id).cloned())
    }

    async fn records_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>, DedupeError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }

    async fn independent_records_by_grade(
        &self,
        lo: i32,
        hi: i32,
    ) -> Result<Vec<Record>, DedupeError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.is_independent() && r.grade_rank >= lo && r.grade_rank <= hi)
            .cloned()
            .collect())
    }

    async fn existing_duplicates_of(&self, id: RecordId) -> Result<Vec<Record>, DedupeError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.main_record_id == Some(id))
            .cloned()
            .collect())
    }

    async fn duplicate_pointers(&self) -> Result<Vec<(RecordId, RecordId)>, DedupeError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter_map(|r| r.main_record_id.map(|main| (r.id, main)))
            .collect())
    }

    async fn set_main_record(
        &self,
        ids: &[RecordId],
        target: RecordId,
    ) -> Result<u64, DedupeError> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for id in ids {
            if let Some(record) = state.records.get_mut(id) {
                record.main_record_id = Some(target);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn merge_pointers(
        &self,
        ids: &[RecordId],
        target: RecordId,
    ) -> Result<PointerMerge, DedupeError> {
        let mut state = self.state.write().await;
        match state.records.get(&target) {
            None => return Err(DedupeError::NotFound(target)),
            Some(record) => {
                if let Some(main) = record.main_record_id {
                    return Err(DedupeError::TargetIsDuplicate { target, main });
                }
            }
        }

        let merging: HashSet<RecordId> =
            ids.iter().copied().filter(|&id| id != target).collect();
        let mut outcome = PointerMerge::default();
        for record in state.records.values_mut() {
            if merging.contains(&record.id) {
                record.main_record_id = Some(target);
                outcome.merged += 1;
            } else if record
                .main_record_id
                .is_some_and(|main| merging.contains(&main))
            {
                record.main_record_id = Some(target);
                outcome.redirected += 1;
            }
        }
        Ok(outcome)
    }

    async fn clear_main_record(&self, ids: &[RecordId]) -> Result<u64, DedupeError> {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for id in ids {
            if let Some(record) = state.records.get_mut(id) {
                if record.main_record_id.take().is_some() {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn reassign_activity(
        &self,
        source: RecordId,
        destination: RecordId,
    ) -> Result<ActivityMigration, DedupeError> {
        if source == destination {
            return Ok(ActivityMigration::default());
        }
        let mut state = self.state.write().await;

        let existing: HashMap<i32, usize> = state
            .ascents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.record_id == destination)
            .map(|(idx, a)| (a.user_id, idx))
            .collect();

        let mut outcome = ActivityMigration::default();
        let mut collapsed_rows = Vec::new();
        for idx in 0..state.ascents.len() {
            if state.ascents[idx].record_id != source {
                continue;
            }
            let user_id = state.ascents[idx].user_id;
            match existing.get(&user_id) {
                Some(&dest_idx) => {
                    // Same climber logged both: keep the earlier date on the destination.
                    let source_date = state.ascents[idx].log_date;
                    if source_date < state.ascents[dest_idx].log_date {
                        state.ascents[dest_idx].log_date = source_date;
                    }
                    collapsed_rows.push(idx);
                    outcome.collapsed += 1;
                }
                None => {
                    state.ascents[idx].record_id = destination;
                    outcome.moved += 1;
                }
            }
        }
        for idx in collapsed_rows.into_iter().rev() {
            state.ascents.remove(idx);
        }

        state.sync_ascent_count(source);
        state.sync_ascent_count(destination);
        Ok(outcome)
    }
}
