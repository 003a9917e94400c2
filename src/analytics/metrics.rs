//! Aggregate structural metrics over the analytics projection.

use tokio_util::sync::CancellationToken;

use crate::errors::{GraphError, GraphResult};

use super::projection::GraphProjection;

/// Undirected connected components: returns (component count, component
/// id per node).
pub(crate) fn connected_components(projection: &GraphProjection) -> (usize, Vec<usize>) {
    let n = projection.node_count();
    let adj = projection.undirected_adjacency();
    let mut component = vec![usize::MAX; n];
    let mut count = 0;

    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }
        let mut stack = vec![start];
        component[start] = count;
        while let Some(v) = stack.pop() {
            for &w in &adj[v] {
                if component[w] == usize::MAX {
                    component[w] = count;
                    stack.push(w);
                }
            }
        }
        count += 1;
    }
    (count, component)
}

/// Local clustering coefficient of one node over the undirected
/// projection; nodes with fewer than two neighbors score 0.
pub(crate) fn local_clustering(adj: &[Vec<usize>], node: usize) -> f64 {
    let neighbors = &adj[node];
    let k = neighbors.len();
    if k < 2 {
        return 0.0;
    }

    let mut links = 0usize;
    for (i, &a) in neighbors.iter().enumerate() {
        for &b in &neighbors[i + 1..] {
            // Adjacency lists are sorted.
            if adj[a].binary_search(&b).is_ok() {
                links += 1;
            }
        }
    }
    2.0 * links as f64 / (k * (k - 1)) as f64
}

pub(crate) fn average_clustering(adj: &[Vec<usize>]) -> f64 {
    if adj.is_empty() {
        return 0.0;
    }
    let total: f64 = (0..adj.len()).map(|v| local_clustering(adj, v)).sum();
    total / adj.len() as f64
}

/// Exact diameter by BFS from every node. Only call on connected graphs;
/// unreachable pairs would otherwise be ignored.
pub(crate) fn diameter(
    projection: &GraphProjection,
    cancel: &CancellationToken,
) -> GraphResult<usize> {
    let n = projection.node_count();
    let adj = projection.undirected_adjacency();
    let mut max_distance = 0usize;

    for source in 0..n {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        max_distance = max_distance.max(eccentricity(adj, source));
    }
    Ok(max_distance)
}

fn eccentricity(adj: &[Vec<usize>], source: usize) -> usize {
    let mut dist = vec![usize::MAX; adj.len()];
    dist[source] = 0;
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(source);
    let mut max = 0;
    while let Some(v) = queue.pop_front() {
        for &w in &adj[v] {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                max = max.max(dist[w]);
                queue.push_back(w);
            }
        }
    }
    max
}

/// Undirected simple-graph density in [0, 1].
pub(crate) fn density(projection: &GraphProjection) -> f64 {
    let n = projection.node_count();
    if n < 2 {
        return 0.0;
    }
    let m = undirected_edge_count(projection) as f64;
    2.0 * m / (n as f64 * (n as f64 - 1.0))
}

pub(crate) fn undirected_edge_count(projection: &GraphProjection) -> usize {
    projection
        .undirected_adjacency()
        .iter()
        .map(|list| list.len())
        .sum::<usize>()
        / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_plus_island() -> GraphProjection {
        GraphProjection::from_parts(
            vec!["a".into(), "b".into(), "c".into(), "island".into()],
            vec![
                ("a".into(), "b".into(), "R".into(), 1.0),
                ("b".into(), "c".into(), "R".into(), 1.0),
                ("c".into(), "a".into(), "R".into(), 1.0),
            ],
            0,
        )
    }

    #[test]
    fn test_connected_components() {
        let proj = triangle_plus_island();
        let (count, component) = connected_components(&proj);
        assert_eq!(count, 2);
        let a = proj.index_of("a").unwrap();
        let c = proj.index_of("c").unwrap();
        let island = proj.index_of("island").unwrap();
        assert_eq!(component[a], component[c]);
        assert_ne!(component[a], component[island]);
    }

    #[test]
    fn test_clustering_coefficient_of_triangle() {
        let proj = triangle_plus_island();
        let adj = proj.undirected_adjacency();
        let a = proj.index_of("a").unwrap();
        assert_eq!(local_clustering(adj, a), 1.0);
        let island = proj.index_of("island").unwrap();
        assert_eq!(local_clustering(adj, island), 0.0);
        // Three perfect nodes, one isolated: 3/4.
        assert!((average_clustering(adj) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_diameter_of_line() {
        let proj = GraphProjection::from_parts(
            vec!["a".into(), "b".into(), "c".into()],
            vec![
                ("a".into(), "b".into(), "R".into(), 1.0),
                ("b".into(), "c".into(), "R".into(), 1.0),
            ],
            0,
        );
        let cancel = CancellationToken::new();
        assert_eq!(diameter(&proj, &cancel).unwrap(), 2);
    }

    #[test]
    fn test_density() {
        let proj = triangle_plus_island();
        // 3 undirected edges over C(4,2) = 6 possible.
        assert!((density(&proj) - 0.5).abs() < 1e-9);
    }
}
