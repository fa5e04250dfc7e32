// src/clustering/similarity_graph.rs
//
// Builds the weighted, undirected similarity graph over the candidate pool.
// Records are partitioned by site (optionally), each partition is scanned in
// ascending grade order, and the inner scan stops as soon as no later record
// can fall inside the grade tolerance.

use anyhow::anyhow;
use futures::future::join_all;
use indicatif::MultiProgress;
use log::{debug, info};
use petgraph::graphmap::UnGraphMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::candidate_generation::candidate_generation::is_sorted_by_grade;
use crate::error::DedupeError;
use crate::matching::similarity::{score, Algorithm};
use crate::models::record::{Record, RecordId, SimilarityEdge};
use crate::models::requests::BatchDuplicateParams;
use crate::models::stats_models::GraphBuildStats;
use crate::utils::progress_config::add_bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphParams {
    pub min_similarity: f64,
    pub grade_tolerance: i32,
    pub algorithm: Algorithm,
    pub group_by_site: bool,
}

impl From<&BatchDuplicateParams> for GraphParams {
    fn from(params: &BatchDuplicateParams) -> Self {
        Self {
            min_similarity: params.min_similarity as f64,
            grade_tolerance: params.grade_tolerance,
            algorithm: params.algorithm,
            group_by_site: params.group_by_site,
        }
    }
}

/// Optional wall-clock budget for one clustering pass.
#[derive(Debug, Clone, Copy)]
pub struct PassDeadline {
    started: Instant,
    budget: Option<Duration>,
}

impl PassDeadline {
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn check(&self) -> Result<(), DedupeError> {
        match self.budget {
            Some(budget) if self.started.elapsed() > budget => {
                Err(DedupeError::DeadlineExceeded(budget))
            }
            _ => Ok(()),
        }
    }
}

/// Adjacency of one pass: record id -> {neighbor id -> score}.
///
/// Backed by a `GraphMap`, whose node and neighbor iteration follows
/// insertion order, so a pass over the same input always walks the graph the
/// same way.
#[derive(Debug, Clone, Default)]
pub struct SimilarityGraph {
    graph: UnGraphMap<RecordId, f64>,
}

impl SimilarityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the edge; a second insert of the same pair keeps the first score.
    pub fn add_edge(&mut self, edge: SimilarityEdge) {
        if !self.graph.contains_edge(edge.record_id_a, edge.record_id_b) {
            self.graph
                .add_edge(edge.record_id_a, edge.record_id_b, edge.score);
        }
    }

    pub fn contains_edge(&self, a: RecordId, b: RecordId) -> bool {
        self.graph.contains_edge(a, b)
    }

    pub fn score(&self, a: RecordId, b: RecordId) -> Option<f64> {
        self.graph.edge_weight(a, b).copied()
    }

    pub fn neighbors(&self, id: RecordId) -> BTreeMap<RecordId, f64> {
        if !self.graph.contains_node(id) {
            return BTreeMap::new();
        }
        self.graph
            .edges(id)
            .map(|(_, neighbor, score)| (neighbor, *score))
            .collect()
    }

    /// Ids in first-seen order.
    pub fn node_ids(&self) -> Vec<RecordId> {
        self.graph.nodes().collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edges(&self) -> Vec<SimilarityEdge> {
        self.graph
            .all_edges()
            .map(|(a, b, score)| SimilarityEdge::new(a, b, *score))
            .collect()
    }

    pub fn adjacency(&self) -> BTreeMap<RecordId, BTreeMap<RecordId, f64>> {
        self.graph
            .nodes()
            .map(|id| (id, self.neighbors(id)))
            .collect()
    }
}

/// One independently scanned slice of the candidate pool.
#[derive(Debug, Clone)]
pub struct Partition {
    /// `None` when the pass is not grouped by site.
    pub site_id: Option<i32>,
    pub records: Vec<Record>,
}

#[derive(Debug, Default)]
pub struct PartitionScan {
    pub edges: Vec<SimilarityEdge>,
    pub stats: GraphBuildStats,
}

/// Splits the pool by site (ascending site id) or keeps it whole.
/// Each partition is stable-sorted by grade if it is not already.
pub fn partition_records(records: &[Record], group_by_site: bool) -> Vec<Partition> {
    let mut partitions: Vec<Partition> = if group_by_site {
        let mut by_site: BTreeMap<i32, Vec<Record>> = BTreeMap::new();
        for record in records {
            by_site
                .entry(record.site_id)
                .or_default()
                .push(record.clone());
        }
        by_site
            .into_iter()
            .map(|(site_id, records)| Partition {
                site_id: Some(site_id),
                records,
            })
            .collect()
    } else {
        vec![Partition {
            site_id: None,
            records: records.to_vec(),
        }]
    };

    for partition in &mut partitions {
        if !is_sorted_by_grade(&partition.records) {
            partition.records.sort_by_key(|r| r.grade_rank);
        }
    }
    partitions
}

/// Sequential anchor scan over one partition.
///
/// Relies on ascending `grade_rank`: once a later record is above
/// `anchor + tolerance` every record after it is too, so the inner loop
/// breaks. An out-of-tolerance pair below the anchor can only occur in
/// unsorted input and is skipped without breaking.
pub fn scan_partition(
    records: &[Record],
    params: &GraphParams,
    deadline: &PassDeadline,
) -> Result<PartitionScan, DedupeError> {
    let mut scan = PartitionScan::default();
    scan.stats.partitions_scanned = 1;

    for (i, anchor) in records.iter().enumerate() {
        deadline.check()?;
        for candidate in &records[i + 1..] {
            let grade_diff = (anchor.grade_rank - candidate.grade_rank).abs();
            if grade_diff > params.grade_tolerance {
                if candidate.grade_rank > anchor.grade_rank + params.grade_tolerance {
                    scan.stats.pruned_scans += 1;
                    break;
                }
                scan.stats.pairs_skipped_unsorted += 1;
                continue;
            }

            scan.stats.pairs_compared += 1;
            let similarity = score(
                &anchor.normalized_name,
                &candidate.normalized_name,
                params.algorithm,
            );
            if similarity >= params.min_similarity {
                scan.edges
                    .push(SimilarityEdge::new(anchor.id, candidate.id, similarity));
            }
        }
    }

    scan.stats.edges = scan.edges.len();
    Ok(scan)
}

fn union_scan(graph: &mut SimilarityGraph, stats: &mut GraphBuildStats, scan: PartitionScan) {
    stats.absorb(&scan.stats);
    for edge in scan.edges {
        graph.add_edge(edge);
    }
}

/// Builds the graph on the calling thread, partition by partition.
pub fn build_similarity_graph(
    records: &[Record],
    params: &GraphParams,
    deadline: &PassDeadline,
) -> Result<(SimilarityGraph, GraphBuildStats), DedupeError> {
    let mut graph = SimilarityGraph::new();
    let mut stats = GraphBuildStats::default();

    for partition in partition_records(records, params.group_by_site) {
        if partition.records.len() < 2 {
            stats.partitions_skipped += 1;
            continue;
        }
        let scan = scan_partition(&partition.records, params, deadline)?;
        debug!(
            "Partition {:?}: {} records, {} comparisons, {} edges",
            partition.site_id,
            partition.records.len(),
            scan.stats.pairs_compared,
            scan.edges.len()
        );
        union_scan(&mut graph, &mut stats, scan);
    }

    info!(
        "Similarity graph built: {} nodes, {} edges from {} partitions ({} skipped)",
        graph.node_count(),
        graph.edge_count(),
        stats.partitions_scanned,
        stats.partitions_skipped
    );
    Ok((graph, stats))
}

/// Same result as [`build_similarity_graph`], with partitions scanned on
/// blocking worker threads. Edge sets are unioned in partition order.
pub async fn build_similarity_graph_parallel(
    records: &[Record],
    params: &GraphParams,
    deadline: &PassDeadline,
    multi_progress: Option<&MultiProgress>,
) -> Result<(SimilarityGraph, GraphBuildStats), DedupeError> {
    let partitions = partition_records(records, params.group_by_site);
    let semaphore = Arc::new(Semaphore::new(num_cpus::get().max(1)));
    let pb = add_bar(
        multi_progress,
        partitions.len() as u64,
        "Scanning site partitions...",
    );

    let mut stats = GraphBuildStats::default();
    let mut handles = Vec::with_capacity(partitions.len());
    for partition in partitions {
        if partition.records.len() < 2 {
            stats.partitions_skipped += 1;
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            continue;
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("Partition worker semaphore closed: {}", e))?;
        let params = *params;
        let deadline = *deadline;
        let pb_clone = pb.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = scan_partition(&partition.records, &params, &deadline);
            if let Some(pb) = pb_clone {
                pb.inc(1);
            }
            (partition.site_id, result)
        }));
    }

    let mut graph = SimilarityGraph::new();
    for joined in join_all(handles).await {
        let (site_id, result) =
            joined.map_err(|e| anyhow!("Partition worker panicked: {}", e))?;
        let scan = result?;
        debug!(
            "Partition {:?}: {} comparisons, {} edges",
            site_id,
            scan.stats.pairs_compared,
            scan.edges.len()
        );
        union_scan(&mut graph, &mut stats, scan);
    }

    if let Some(pb) = &pb {
        pb.finish_with_message(format!("{} edges", graph.edge_count()));
    }
    info!(
        "Similarity graph built on worker threads: {} nodes, {} edges from {} partitions ({} skipped)",
        graph.node_count(),
        graph.edge_count(),
        stats.partitions_scanned,
        stats.partitions_skipped
    );
    Ok((graph, stats))
}
