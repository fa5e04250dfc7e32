// src/clustering/create_clusters.rs

use indicatif::MultiProgress;
use log::info;
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

use crate::candidate_generation::candidate_generation::select_candidates;
use crate::clustering::quasi_clique::{detect_overlaps, extract_groups};
use crate::clustering::similarity_graph::{
    build_similarity_graph, build_similarity_graph_parallel, GraphParams, PassDeadline,
    SimilarityGraph,
};
use crate::error::DedupeError;
use crate::models::record::{DuplicateGroup, RecordId};
use crate::models::requests::{
    BatchDuplicateParams, BatchDuplicateResponse, DuplicateGroupInfo, RecordDuplicateInfo,
};
use crate::models::stats_models::ClusteringStats;
use crate::storage::CatalogStore;
use crate::utils::dedupe_config::DedupeConfig;
use crate::utils::progress_config::add_bar;

/// Runs one batch duplicate-detection pass.
///
/// Steps: validate parameters, select candidates (the only storage read),
/// build the similarity graph, extract quasi-clique groups, and assemble the
/// operator-facing response. Nothing is written.
///
/// `partition_progress` receives one bar per worker-thread graph build; pass
/// `None` to keep only the pass-level bar.
pub async fn run_duplicate_detection(
    store: &dyn CatalogStore,
    params: &BatchDuplicateParams,
    config: &DedupeConfig,
    multi_progress: Option<MultiProgress>,
    partition_progress: Option<MultiProgress>,
) -> Result<BatchDuplicateResponse, DedupeError> {
    params.validate()?;
    let start = Instant::now();
    let pass_id = Uuid::new_v4();
    let deadline = PassDeadline::new(config.pass_deadline);

    let main_pb = add_bar(multi_progress.as_ref(), 4, "Selecting candidates...");

    // Step 1: candidate snapshot
    info!("Duplicate pass {} starting", pass_id);
    let filter = config.candidate_filter(params.area_slug.clone())?;
    let candidates = select_candidates(store, &filter).await?;
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Building similarity graph...");
    }

    // Step 2: similarity graph
    let graph_params = GraphParams::from(params);
    let (graph, graph_stats) = if config.parallel_partitions && params.group_by_site {
        build_similarity_graph_parallel(
            &candidates,
            &graph_params,
            &deadline,
            partition_progress.as_ref(),
        )
        .await?
    } else {
        build_similarity_graph(&candidates, &graph_params, &deadline)?
    };
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Extracting duplicate groups...");
    }

    // Step 3: greedy quasi-clique extraction, single-threaded
    deadline.check()?;
    let groups = extract_groups(&graph, &candidates)?;
    let overlapping_record_ids = detect_overlaps(&groups);
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Preparing response...");
    }

    // Step 4: response
    let processing_time = start.elapsed();
    let stats = ClusteringStats {
        candidates: candidates.len(),
        graph_nodes: graph.node_count(),
        groups: groups.len(),
        grouped_records: groups.iter().map(DuplicateGroup::len).sum(),
        graph: graph_stats,
        processing_time,
        processing_time_ms: processing_time.as_millis(),
    };
    let response = BatchDuplicateResponse {
        pass_id,
        total_groups: groups.len(),
        groups: describe_groups(&groups, &graph, &overlapping_record_ids),
        overlapping_record_ids,
        stats,
    };
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message(format!("{} duplicate groups", response.total_groups));
    }

    log_pass_statistics(&response);
    Ok(response)
}

/// Operator view of each group. Non-seed members carry their score against
/// the seed when the two are directly linked.
fn describe_groups(
    groups: &[DuplicateGroup],
    graph: &SimilarityGraph,
    overlapping: &[RecordId],
) -> Vec<DuplicateGroupInfo> {
    let overlapping: HashSet<RecordId> = overlapping.iter().copied().collect();
    groups
        .iter()
        .map(|group| {
            let seed = group.records.first().map(|r| r.id);
            let records = group
                .records
                .iter()
                .map(|record| {
                    let score = seed
                        .filter(|&s| s != record.id)
                        .and_then(|s| graph.score(s, record.id));
                    RecordDuplicateInfo::from_record(record, score)
                })
                .collect();
            DuplicateGroupInfo {
                records,
                has_conflicts: group.records.iter().any(|r| overlapping.contains(&r.id)),
            }
        })
        .collect()
}

fn log_pass_statistics(response: &BatchDuplicateResponse) {
    let stats = &response.stats;
    info!("Duplicate pass {} statistics:", response.pass_id);
    info!("  Candidates: {}", stats.candidates);
    info!(
        "  Partitions: {} scanned, {} skipped",
        stats.graph.partitions_scanned, stats.graph.partitions_skipped
    );
    info!(
        "  Comparisons: {} ({} anchor scans pruned early)",
        stats.graph.pairs_compared, stats.graph.pruned_scans
    );
    info!(
        "  Graph: {} nodes, {} edges",
        stats.graph_nodes, stats.graph.edges
    );
    info!(
        "  Groups: {} covering {} records",
        stats.groups, stats.grouped_records
    );
    if !response.overlapping_record_ids.is_empty() {
        info!(
            "  Overlapping records: {:?}",
            response.overlapping_record_ids
        );
    }
    if stats.groups > 0 {
        let largest = response
            .groups
            .iter()
            .map(|g| g.records.len())
            .max()
            .unwrap_or(0);
        info!(
            "  Average group size: {:.2}, largest: {}",
            stats.grouped_records as f64 / stats.groups as f64,
            largest
        );
    }
    info!("  Elapsed: {:.2?}", stats.processing_time);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::Record;
    use crate::storage::memory::InMemoryCatalog;
    use std::time::Duration;

    fn scenario_one_store() -> InMemoryCatalog {
        InMemoryCatalog::from_records(vec![
            Record::new(1, "crimpy traverse", 12, 1, 5),
            Record::new(2, "crimpy travers", 12, 1, 2),
            Record::new(3, "totally different line", 30, 1, 9),
        ])
    }

    #[tokio::test]
    async fn test_scenario_one_pass() {
        let store = scenario_one_store();
        let response = run_duplicate_detection(
            &store,
            &BatchDuplicateParams::default(),
            &DedupeConfig::default(),
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(response.total_groups, 1);
        let group = &response.groups[0];
        let ids: Vec<_> = group.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(!group.has_conflicts);
        assert_eq!(group.records[0].similarity_score, None);
        assert!(group.records[1].similarity_score.unwrap() > 96.0);
        assert!(response.overlapping_record_ids.is_empty());
        assert_eq!(response.stats.candidates, 3);
        assert_eq!(response.stats.grouped_records, 2);
    }

    #[tokio::test]
    async fn test_parallel_and_sequential_passes_agree() {
        let mut records = Vec::new();
        for site in 1..=4 {
            records.push(Record::new(site * 10, "la marie rose", 18, site, 6));
            records.push(Record::new(site * 10 + 1, "la marie ros", 18, site, 3));
            records.push(Record::new(site * 10 + 2, "marie la rose", 19, site, 1));
        }
        let store = InMemoryCatalog::from_records(records);
        let params = BatchDuplicateParams::default();

        let mut sequential = DedupeConfig::default();
        sequential.parallel_partitions = false;
        let a = run_duplicate_detection(&store, &params, &sequential, None, None)
            .await
            .unwrap();
        let b = run_duplicate_detection(&store, &params, &DedupeConfig::default(), None, None)
            .await
            .unwrap();
        assert_eq!(a.groups, b.groups);
        assert_ne!(a.pass_id, b.pass_id);
    }

    #[tokio::test]
    async fn test_duplicates_and_placeholders_are_not_candidates() {
        let store = InMemoryCatalog::from_records(vec![
            Record::new(1, "la marie rose", 18, 1, 4),
            Record::new(2, "la marie rose", 18, 1, 4).duplicate_of(1),
            Record::new(3, "n n", 18, 1, 4),
            Record::new(4, "n n", 18, 1, 4),
        ]);
        let response = run_duplicate_detection(
            &store,
            &BatchDuplicateParams::default(),
            &DedupeConfig::default(),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(response.stats.candidates, 1);
        assert_eq!(response.total_groups, 0);
    }

    #[tokio::test]
    async fn test_area_scope_limits_pass() {
        let store = InMemoryCatalog::from_records(vec![
            Record::new(1, "la marie rose", 18, 1, 4).with_area("fontainebleau"),
            Record::new(2, "la marie rose", 18, 1, 2).with_area("fontainebleau"),
            Record::new(3, "la marie rose", 18, 2, 9).with_area("magic-wood"),
            Record::new(4, "la marie rose", 18, 2, 1).with_area("magic-wood"),
        ]);
        let params = BatchDuplicateParams {
            area_slug: Some("magic-wood".to_string()),
            ..BatchDuplicateParams::default()
        };
        let response =
            run_duplicate_detection(&store, &params, &DedupeConfig::default(), None, None)
                .await
                .unwrap();
        assert_eq!(response.total_groups, 1);
        let ids: Vec<_> = response.groups[0].records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected_before_reading() {
        let store = scenario_one_store();
        let params = BatchDuplicateParams {
            min_similarity: 150,
            ..BatchDuplicateParams::default()
        };
        let result =
            run_duplicate_detection(&store, &params, &DedupeConfig::default(), None, None).await;
        assert!(matches!(result, Err(DedupeError::Validation(_))));
    }

    #[tokio::test]
    async fn test_pass_deadline_is_enforced() {
        let store = scenario_one_store();
        let config = DedupeConfig {
            pass_deadline: Some(Duration::ZERO),
            parallel_partitions: false,
            ..DedupeConfig::default()
        };
        let result = run_duplicate_detection(
            &store,
            &BatchDuplicateParams::default(),
            &config,
            None,
            None,
        )
        .await;
        assert!(matches!(result, Err(DedupeError::DeadlineExceeded(_))));
    }
}
