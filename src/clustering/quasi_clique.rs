// src/clustering/quasi_clique.rs
//
// Greedy quasi-clique extraction. Seeds are taken by descending popularity;
// a candidate joins the current group when it is similar to at least half of
// the members admitted so far.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use crate::clustering::similarity_graph::SimilarityGraph;
use crate::error::DedupeError;
use crate::models::record::{DuplicateGroup, Record, RecordId};

/// Fraction of current members a candidate must be linked to.
pub const MIN_GROUP_SIMILARITY: f64 = 0.5;

/// `max(1, ceil(group_size * MIN_GROUP_SIMILARITY))`.
pub fn required_matches(group_size: usize) -> usize {
    ((group_size as f64 * MIN_GROUP_SIMILARITY).ceil() as usize).max(1)
}

/// Graph ids ordered by descending ascent count, ties by ascending id.
pub fn seed_order(
    graph: &SimilarityGraph,
    records: &HashMap<RecordId, &Record>,
) -> Result<Vec<RecordId>, DedupeError> {
    let mut keyed = Vec::with_capacity(graph.node_count());
    for id in graph.node_ids() {
        let record = records.get(&id).ok_or(DedupeError::NotFound(id))?;
        keyed.push((Reverse(record.ascent_count), id));
    }
    keyed.sort_unstable();
    Ok(keyed.into_iter().map(|(_, id)| id).collect())
}

/// Extracts exclusive duplicate groups from `graph`.
///
/// Every graph node must have a matching entry in `records`. Single-member
/// groups are dropped; kept groups are in seed order, members in popularity
/// order.
pub fn extract_groups(
    graph: &SimilarityGraph,
    records: &[Record],
) -> Result<Vec<DuplicateGroup>, DedupeError> {
    let by_id: HashMap<RecordId, &Record> = records.iter().map(|r| (r.id, r)).collect();
    let order = seed_order(graph, &by_id)?;

    let mut assigned: HashSet<RecordId> = HashSet::with_capacity(order.len());
    let mut groups = Vec::new();

    for &seed in &order {
        if assigned.contains(&seed) {
            continue;
        }
        let mut members = vec![seed];
        assigned.insert(seed);

        for &candidate in &order {
            if assigned.contains(&candidate) {
                continue;
            }
            let links = members
                .iter()
                .filter(|&&member| graph.contains_edge(member, candidate))
                .count();
            if links >= required_matches(members.len()) {
                members.push(candidate);
                assigned.insert(candidate);
            }
        }

        if members.len() < 2 {
            continue;
        }
        debug!("Seed {} formed a group of {}", seed, members.len());
        groups.push(DuplicateGroup {
            records: members
                .iter()
                .filter_map(|id| by_id.get(id).map(|r| (*r).clone()))
                .collect(),
        });
    }

    Ok(groups)
}

/// Ids that appear in more than one group, ascending.
///
/// Groups from [`extract_groups`] are exclusive, so for a single pass this is
/// empty; it is kept as a guard on the response contract.
pub fn detect_overlaps(groups: &[DuplicateGroup]) -> Vec<RecordId> {
    let mut memberships: BTreeMap<RecordId, usize> = BTreeMap::new();
    for group in groups {
        for record in &group.records {
            *memberships.entry(record.id).or_insert(0) += 1;
        }
    }
    memberships
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id)
        .collect()
}
