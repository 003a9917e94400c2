//! Community detection: Louvain and label propagation.
//!
//! Both algorithms are seeded so repeated runs over the same projection
//! produce identical partitions.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::errors::{GraphError, GraphResult};

use super::projection::GraphProjection;

const MAX_SWEEPS: usize = 100;
const MAX_LEVELS: usize = 10;

/// Seeded label propagation. Every node adopts the most frequent label
/// among its neighbors (smallest label on ties) until the labeling is
/// stable. Returns a dense community id per node.
pub(crate) fn label_propagation(
    projection: &GraphProjection,
    seed: u64,
    cancel: &CancellationToken,
) -> GraphResult<Vec<usize>> {
    let n = projection.node_count();
    let adj = projection.undirected_adjacency();
    let mut labels: Vec<usize> = (0..n).collect();
    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..MAX_SWEEPS {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        order.shuffle(&mut rng);
        let mut changed = false;

        for &node in &order {
            if adj[node].is_empty() {
                continue;
            }
            let mut counts: HashMap<usize, usize> = HashMap::new();
            for &neighbor in &adj[node] {
                *counts.entry(labels[neighbor]).or_insert(0) += 1;
            }
            // Most frequent neighbor label, smallest label on ties.
            let best = counts
                .into_iter()
                .min_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
                .map(|(label, _)| label)
                .unwrap();
            if best != labels[node] {
                labels[node] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    Ok(renumber(labels))
}

/// Seeded Louvain: local modularity-maximizing moves followed by graph
/// aggregation, repeated until modularity stops improving.
pub(crate) fn louvain(
    projection: &GraphProjection,
    seed: u64,
    cancel: &CancellationToken,
) -> GraphResult<Vec<usize>> {
    let n = projection.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut adjacency = projection.weighted_undirected();
    // node -> community in the *current* aggregation level.
    let mut membership: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);

    for level in 0..MAX_LEVELS {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let (assignment, improved) = louvain_level(&adjacency, &mut rng, cancel)?;
        if !improved && level > 0 {
            break;
        }

        // Map original nodes through this level's assignment.
        for community in membership.iter_mut() {
            *community = assignment[*community];
        }

        let communities = 1 + assignment.iter().copied().max().unwrap_or(0);
        if communities == adjacency.len() {
            break;
        }
        adjacency = aggregate(&adjacency, &assignment, communities);
    }

    Ok(renumber(membership))
}

/// One Louvain level: sweep nodes in seeded random order, moving each to
/// the neighboring community with the largest positive modularity gain.
fn louvain_level(
    adjacency: &[Vec<(usize, f64)>],
    rng: &mut StdRng,
    cancel: &CancellationToken,
) -> GraphResult<(Vec<usize>, bool)> {
    let n = adjacency.len();
    let degree: Vec<f64> = adjacency
        .iter()
        .map(|list| list.iter().map(|(_, w)| w).sum())
        .collect();
    let two_m: f64 = degree.iter().sum();
    if two_m == 0.0 {
        return Ok(((0..n).collect(), false));
    }

    let mut community: Vec<usize> = (0..n).collect();
    let mut community_degree = degree.clone();
    let mut order: Vec<usize> = (0..n).collect();
    let mut improved = false;

    for _ in 0..MAX_SWEEPS {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        order.shuffle(rng);
        let mut moved = false;

        for &node in &order {
            let current = community[node];
            community_degree[current] -= degree[node];

            // Weight from `node` into each adjacent community. Self-loops
            // move with the node and cancel out of every gain, so they
            // are excluded.
            let mut weights_to: HashMap<usize, f64> = HashMap::new();
            for &(neighbor, weight) in &adjacency[node] {
                if neighbor != node {
                    *weights_to.entry(community[neighbor]).or_insert(0.0) += weight;
                }
            }

            let gain = |c: usize| -> f64 {
                let w_in = weights_to.get(&c).copied().unwrap_or(0.0);
                w_in - community_degree[c] * degree[node] / two_m
            };

            let mut best = current;
            let mut best_gain = gain(current);
            let mut candidates: Vec<usize> = weights_to.keys().copied().collect();
            candidates.sort_unstable();
            for c in candidates {
                let g = gain(c);
                if g > best_gain + 1e-12 {
                    best_gain = g;
                    best = c;
                }
            }

            community[node] = best;
            community_degree[best] += degree[node];
            if best != current {
                moved = true;
                improved = true;
            }
        }
        if !moved {
            break;
        }
    }

    let renumbered = renumber(community);
    Ok((renumbered, improved))
}

/// Collapse communities into super-nodes, summing inter-community
/// weights.
fn aggregate(
    adjacency: &[Vec<(usize, f64)>],
    assignment: &[usize],
    communities: usize,
) -> Vec<Vec<(usize, f64)>> {
    let mut pair_weights: HashMap<(usize, usize), f64> = HashMap::new();
    for (node, list) in adjacency.iter().enumerate() {
        for &(neighbor, weight) in list {
            if node <= neighbor {
                let (a, b) = (assignment[node], assignment[neighbor]);
                let key = (a.min(b), a.max(b));
                *pair_weights.entry(key).or_insert(0.0) += weight;
            }
        }
    }

    let mut out: Vec<Vec<(usize, f64)>> = vec![Vec::new(); communities];
    for ((a, b), w) in pair_weights {
        if a == b {
            // Internal weight becomes a self-loop on the super-node; it
            // contributes to degree but not to further moves.
            out[a].push((a, 2.0 * w));
        } else {
            out[a].push((b, w));
            out[b].push((a, w));
        }
    }
    for list in &mut out {
        list.sort_unstable_by_key(|(i, _)| *i);
    }
    out
}

/// Newman modularity of a partition over the weighted undirected
/// projection.
pub(crate) fn modularity(projection: &GraphProjection, assignment: &[usize]) -> f64 {
    let adjacency = projection.weighted_undirected();
    let degree: Vec<f64> = adjacency
        .iter()
        .map(|list| list.iter().map(|(_, w)| w).sum())
        .collect();
    let two_m: f64 = degree.iter().sum();
    if two_m == 0.0 {
        return 0.0;
    }

    let communities = 1 + assignment.iter().copied().max().unwrap_or(0);
    let mut internal = vec![0.0f64; communities];
    let mut total = vec![0.0f64; communities];

    for (node, list) in adjacency.iter().enumerate() {
        total[assignment[node]] += degree[node];
        for &(neighbor, weight) in list {
            if assignment[node] == assignment[neighbor] {
                internal[assignment[node]] += weight;
            }
        }
    }

    (0..communities)
        .map(|c| internal[c] / two_m - (total[c] / two_m).powi(2))
        .sum()
}

/// Compact community ids to 0..k preserving first-appearance order.
fn renumber(labels: Vec<usize>) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    labels
        .into_iter()
        .map(|label| {
            let next = mapping.len();
            *mapping.entry(label).or_insert(next)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles joined by a single bridge edge.
    fn two_cliques() -> GraphProjection {
        let nodes = ["a1", "a2", "a3", "b1", "b2", "b3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let edges = [
            ("a1", "a2"),
            ("a2", "a3"),
            ("a1", "a3"),
            ("b1", "b2"),
            ("b2", "b3"),
            ("b1", "b3"),
            ("a3", "b1"),
        ]
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string(), "R".to_string(), 1.0))
        .collect();
        GraphProjection::from_parts(nodes, edges, 0)
    }

    #[test]
    fn test_label_propagation_finds_two_cliques() {
        let proj = two_cliques();
        let cancel = CancellationToken::new();
        let labels = label_propagation(&proj, 42, &cancel).unwrap();

        let a1 = labels[proj.index_of("a1").unwrap()];
        let a2 = labels[proj.index_of("a2").unwrap()];
        let b2 = labels[proj.index_of("b2").unwrap()];
        let b3 = labels[proj.index_of("b3").unwrap()];
        assert_eq!(a1, a2);
        assert_eq!(b2, b3);
    }

    #[test]
    fn test_label_propagation_is_deterministic_per_seed() {
        let proj = two_cliques();
        let cancel = CancellationToken::new();
        let first = label_propagation(&proj, 7, &cancel).unwrap();
        let second = label_propagation(&proj, 7, &cancel).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_louvain_partitions_cliques_with_positive_modularity() {
        let proj = two_cliques();
        let cancel = CancellationToken::new();
        let assignment = louvain(&proj, 42, &cancel).unwrap();

        let a_side = assignment[proj.index_of("a1").unwrap()];
        let b_side = assignment[proj.index_of("b3").unwrap()];
        assert_eq!(assignment[proj.index_of("a2").unwrap()], a_side);
        assert_eq!(assignment[proj.index_of("a3").unwrap()], a_side);
        assert_eq!(assignment[proj.index_of("b1").unwrap()], b_side);
        assert_ne!(a_side, b_side);

        assert!(modularity(&proj, &assignment) > 0.3);
    }

    #[test]
    fn test_every_node_gets_exactly_one_community() {
        let proj = two_cliques();
        let cancel = CancellationToken::new();
        for assignment in [
            label_propagation(&proj, 1, &cancel).unwrap(),
            louvain(&proj, 1, &cancel).unwrap(),
        ] {
            assert_eq!(assignment.len(), proj.node_count());
            let max = assignment.iter().copied().max().unwrap();
            // Dense renumbering means ids 0..=max are all used.
            for c in 0..=max {
                assert!(assignment.iter().any(|&a| a == c));
            }
        }
    }

    #[test]
    fn test_renumber_is_dense_and_order_preserving() {
        assert_eq!(renumber(vec![5, 5, 9, 5, 2]), vec![0, 0, 1, 0, 2]);
    }

    #[test]
    fn test_modularity_of_singletons_on_empty_graph() {
        let proj = GraphProjection::from_parts(vec!["a".into(), "b".into()], vec![], 0);
        assert_eq!(modularity(&proj, &[0, 1]), 0.0);
    }
}
