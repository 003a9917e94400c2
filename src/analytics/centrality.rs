//! Centrality measures over the analytics projection.

use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

use crate::errors::{GraphError, GraphResult};

use super::projection::GraphProjection;

/// Power-iteration PageRank over the directed projection. Scores sum to 1.
///
/// Stops at `max_iterations` and reports the last iterate when it has not
/// converged; non-convergence is a warning, not an error.
pub(crate) fn pagerank(
    projection: &GraphProjection,
    damping: f64,
    max_iterations: usize,
    tolerance: f64,
    cancel: &CancellationToken,
) -> GraphResult<Vec<f64>> {
    let n = projection.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }

    let out = projection.out_adjacency();
    let nf = n as f64;
    let mut ranks = vec![1.0 / nf; n];
    let mut converged = false;

    for iteration in 0..max_iterations {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let mut next = vec![(1.0 - damping) / nf; n];
        let mut dangling_mass = 0.0;
        for (node, neighbors) in out.iter().enumerate() {
            if neighbors.is_empty() {
                dangling_mass += ranks[node];
                continue;
            }
            let share = damping * ranks[node] / neighbors.len() as f64;
            for &neighbor in neighbors {
                next[neighbor] += share;
            }
        }
        let dangling_share = damping * dangling_mass / nf;
        for value in &mut next {
            *value += dangling_share;
        }

        let delta: f64 = next
            .iter()
            .zip(&ranks)
            .map(|(a, b)| (a - b).abs())
            .sum();
        ranks = next;
        if delta < tolerance {
            tracing::debug!("PageRank converged after {} iterations", iteration + 1);
            converged = true;
            break;
        }
    }

    if !converged {
        tracing::warn!(
            "PageRank did not converge within {} iterations; returning last iterate",
            max_iterations
        );
    }
    Ok(ranks)
}

/// Brandes betweenness centrality over the undirected projection,
/// normalized to [0, 1] by the number of node pairs.
pub(crate) fn betweenness(
    projection: &GraphProjection,
    cancel: &CancellationToken,
) -> GraphResult<Vec<f64>> {
    let n = projection.node_count();
    let adj = projection.undirected_adjacency();
    let mut centrality = vec![0.0f64; n];

    for source in 0..n {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let mut stack: Vec<usize> = Vec::new();
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        sigma[source] = 1.0;
        dist[source] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adj[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != source {
                centrality[w] += delta[w];
            }
        }
    }

    // Each undirected pair is counted twice in the accumulation.
    let pairs = if n > 2 {
        ((n - 1) * (n - 2)) as f64
    } else {
        1.0
    };
    for value in &mut centrality {
        *value /= pairs;
    }
    Ok(centrality)
}

/// Wasserman-Faust closeness: the classic formula scaled by the fraction
/// of the graph a node can reach, which keeps disconnected graphs
/// meaningful and never divides by zero. Isolated nodes score 0.
pub(crate) fn closeness(
    projection: &GraphProjection,
    cancel: &CancellationToken,
) -> GraphResult<Vec<f64>> {
    let n = projection.node_count();
    let adj = projection.undirected_adjacency();
    let mut scores = vec![0.0f64; n];
    if n <= 1 {
        return Ok(scores);
    }

    for source in 0..n {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let (reachable, total_distance) = bfs_distances(adj, source);
        if reachable <= 1 || total_distance == 0 {
            continue;
        }
        let r = (reachable - 1) as f64;
        scores[source] = (r / (n as f64 - 1.0)) * (r / total_distance as f64);
    }
    Ok(scores)
}

/// BFS from `source`; returns (reachable node count including source, sum
/// of distances to reached nodes).
pub(crate) fn bfs_distances(adj: &[Vec<usize>], source: usize) -> (usize, u64) {
    let mut dist = vec![usize::MAX; adj.len()];
    dist[source] = 0;
    let mut queue = VecDeque::new();
    queue.push_back(source);
    let mut reachable = 1usize;
    let mut total = 0u64;

    while let Some(v) = queue.pop_front() {
        for &w in &adj[v] {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                reachable += 1;
                total += dist[w] as u64;
                queue.push_back(w);
            }
        }
    }
    (reachable, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::projection::GraphProjection;

    fn line_graph() -> GraphProjection {
        // a - b - c - d
        GraphProjection::from_parts(
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            vec![
                ("a".into(), "b".into(), "R".into(), 1.0),
                ("b".into(), "c".into(), "R".into(), 1.0),
                ("c".into(), "d".into(), "R".into(), 1.0),
            ],
            0,
        )
    }

    fn star_graph() -> GraphProjection {
        // hub <- s1, s2, s3
        GraphProjection::from_parts(
            vec!["hub".into(), "s1".into(), "s2".into(), "s3".into()],
            vec![
                ("s1".into(), "hub".into(), "R".into(), 1.0),
                ("s2".into(), "hub".into(), "R".into(), 1.0),
                ("s3".into(), "hub".into(), "R".into(), 1.0),
            ],
            0,
        )
    }

    #[test]
    fn test_pagerank_sums_to_one_and_ranks_hub_highest() {
        let proj = star_graph();
        let cancel = CancellationToken::new();
        let ranks = pagerank(&proj, 0.85, 100, 1e-9, &cancel).unwrap();

        let sum: f64 = ranks.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);

        let hub = proj.index_of("hub").unwrap();
        for i in 0..proj.node_count() {
            if i != hub {
                assert!(ranks[hub] > ranks[i]);
            }
        }
    }

    #[test]
    fn test_pagerank_empty_graph() {
        let proj = GraphProjection::from_parts(vec![], vec![], 0);
        let cancel = CancellationToken::new();
        assert!(pagerank(&proj, 0.85, 10, 1e-6, &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_pagerank_respects_cancellation() {
        let proj = line_graph();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            pagerank(&proj, 0.85, 100, 1e-9, &cancel),
            Err(GraphError::Cancelled)
        ));
    }

    #[test]
    fn test_betweenness_middle_of_line_is_highest() {
        let proj = line_graph();
        let cancel = CancellationToken::new();
        let scores = betweenness(&proj, &cancel).unwrap();

        let a = proj.index_of("a").unwrap();
        let b = proj.index_of("b").unwrap();
        let c = proj.index_of("c").unwrap();
        let d = proj.index_of("d").unwrap();
        assert!(scores[b] > scores[a]);
        assert!(scores[c] > scores[d]);
        assert_eq!(scores[a], 0.0);
        assert_eq!(scores[d], 0.0);
        // b lies on a-c, a-d; normalized by (n-1)(n-2) = 6 pairs counted
        // twice: (2 pairs * 2) / 6.
        assert!((scores[b] - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_closeness_handles_disconnected_graph() {
        let proj = GraphProjection::from_parts(
            vec!["a".into(), "b".into(), "island".into()],
            vec![("a".into(), "b".into(), "R".into(), 1.0)],
            0,
        );
        let cancel = CancellationToken::new();
        let scores = closeness(&proj, &cancel).unwrap();

        let island = proj.index_of("island").unwrap();
        let a = proj.index_of("a").unwrap();
        assert_eq!(scores[island], 0.0);
        // a reaches one node at distance 1: (1/2) * (1/1).
        assert!((scores[a] - 0.5).abs() < 1e-9);
    }
}
