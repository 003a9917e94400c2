use neo4rs::query;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::errors::{GraphError, GraphResult};
use crate::graph_db::schema::BASE_LABEL;
use crate::graph_db::Neo4jClient;

#[derive(Debug, Clone)]
pub struct ProjectionEdge {
    pub rel_type: String,
    pub weight: f64,
}

/// Immutable in-memory snapshot of the graph used by all analytics.
///
/// Built from committed store state, never mutated, and replaced wholesale
/// when stale. Freshness is eventual with respect to writes concurrent
/// with the build: a write racing the snapshot queries may or may not be
/// reflected.
pub struct GraphProjection {
    graph: DiGraph<String, ProjectionEdge>,
    indices: HashMap<String, NodeIndex>,
    out_adjacency: Vec<Vec<usize>>,
    undirected: Vec<Vec<usize>>,
    built_at: Instant,
    generation: u64,
}

impl GraphProjection {
    /// Assemble a projection from node ids and `(source, target, type,
    /// weight)` edges. Edges naming unknown endpoints are dropped with a
    /// warning.
    pub fn from_parts(
        node_ids: Vec<String>,
        edges: Vec<(String, String, String, f64)>,
        generation: u64,
    ) -> Self {
        let mut graph = DiGraph::with_capacity(node_ids.len(), edges.len());
        let mut indices = HashMap::with_capacity(node_ids.len());
        for id in node_ids {
            let idx = graph.add_node(id.clone());
            indices.insert(id, idx);
        }

        for (source, target, rel_type, weight) in edges {
            match (indices.get(&source), indices.get(&target)) {
                (Some(&a), Some(&b)) => {
                    graph.add_edge(a, b, ProjectionEdge { rel_type, weight });
                }
                _ => {
                    tracing::warn!(
                        "Dropping projected edge with unknown endpoint: {} -> {}",
                        source,
                        target
                    );
                }
            }
        }

        let n = graph.node_count();
        let mut out_adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut undirected: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in graph.edge_indices() {
            let (a, b) = graph.edge_endpoints(edge).expect("edge endpoints");
            let (a, b) = (a.index(), b.index());
            out_adjacency[a].push(b);
            if a != b {
                undirected[a].push(b);
                undirected[b].push(a);
            }
        }
        for list in out_adjacency.iter_mut().chain(undirected.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            graph,
            indices,
            out_adjacency,
            undirected,
            built_at: Instant::now(),
            generation,
        }
    }

    /// Pull a fresh snapshot from the store.
    pub(crate) async fn load(client: &Neo4jClient, generation: u64) -> GraphResult<Self> {
        let node_q = format!("MATCH (n:`{}`) RETURN n.id AS id", BASE_LABEL);
        let mut node_ids = Vec::new();
        for row in client.execute_collect(query(&node_q)).await? {
            let id: String = row
                .get("id")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            node_ids.push(id);
        }

        let edge_q = format!(
            "MATCH (a:`{base}`)-[r]->(b:`{base}`) \
             RETURN a.id AS source, b.id AS target, type(r) AS rel_type, \
                    coalesce(r.weight, 1.0) AS weight",
            base = BASE_LABEL
        );
        let mut edges = Vec::new();
        for row in client.execute_collect(query(&edge_q)).await? {
            let source: String = row
                .get("source")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            let target: String = row
                .get("target")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            let rel_type: String = row
                .get("rel_type")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            let weight: f64 = row
                .get("weight")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            edges.push((source, target, rel_type, weight));
        }

        tracing::info!(
            "Built analytics projection: {} nodes, {} edges (generation {})",
            node_ids.len(),
            edges.len(),
            generation
        );
        Ok(Self::from_parts(node_ids, edges, generation))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn id(&self, index: usize) -> &str {
        &self.graph[NodeIndex::new(index)]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.indices.get(id).map(|idx| idx.index())
    }

    /// Directed successor lists, deduplicated, by dense node index.
    pub(crate) fn out_adjacency(&self) -> &[Vec<usize>] {
        &self.out_adjacency
    }

    /// Undirected, self-loop-free, deduplicated adjacency.
    pub(crate) fn undirected_adjacency(&self) -> &[Vec<usize>] {
        &self.undirected
    }

    /// Symmetric weighted adjacency for modularity-based algorithms.
    /// Parallel and antiparallel edges between a pair sum their weights.
    pub(crate) fn weighted_undirected(&self) -> Vec<Vec<(usize, f64)>> {
        let n = self.node_count();
        let mut pair_weights: HashMap<(usize, usize), f64> = HashMap::new();
        for edge in self.graph.edge_indices() {
            let (a, b) = self.graph.edge_endpoints(edge).expect("edge endpoints");
            let (a, b) = (a.index(), b.index());
            if a == b {
                continue;
            }
            let key = (a.min(b), a.max(b));
            *pair_weights.entry(key).or_insert(0.0) += self.graph[edge].weight;
        }

        let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for ((a, b), w) in pair_weights {
            adj[a].push((b, w));
            adj[b].push((a, w));
        }
        for list in &mut adj {
            list.sort_unstable_by_key(|(i, _)| *i);
        }
        adj
    }

    pub(crate) fn is_fresh(&self, ttl: Duration, current_generation: u64) -> bool {
        self.generation == current_generation && self.built_at.elapsed() <= ttl
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
