// src/models/stats_models.rs

use serde::Serialize;
use std::time::Duration;

/// Counters collected while building the similarity graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphBuildStats {
    pub partitions_scanned: usize,
    pub partitions_skipped: usize,
    pub pairs_compared: u64,
    /// Anchors whose inner scan stopped early on the sorted-grade break.
    pub pruned_scans: u64,
    /// Out-of-tolerance pairs skipped without a break (unsorted input only).
    pub pairs_skipped_unsorted: u64,
    pub edges: usize,
}

impl GraphBuildStats {
    pub fn absorb(&mut self, other: &GraphBuildStats) {
        self.partitions_scanned += other.partitions_scanned;
        self.partitions_skipped += other.partitions_skipped;
        self.pairs_compared += other.pairs_compared;
        self.pruned_scans += other.pruned_scans;
        self.pairs_skipped_unsorted += other.pairs_skipped_unsorted;
        self.edges += other.edges;
    }
}

/// Summary of one batch clustering pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusteringStats {
    pub candidates: usize,
    pub graph: GraphBuildStats,
    pub graph_nodes: usize,
    pub groups: usize,
    pub grouped_records: usize,
    #[serde(skip)]
    pub processing_time: Duration,
    pub processing_time_ms: u128,
}
