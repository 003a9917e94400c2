//! Graph analytics over an in-memory projection with a
//! cache-with-invalidation lifecycle.

mod centrality;
mod community;
mod metrics;
pub mod projection;

pub use projection::GraphProjection;

use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::builder::StoreGeneration;
use crate::config::AnalyticsConfig;
use crate::errors::{GraphError, GraphResult};
use crate::graph_db::Neo4jClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunityAlgorithm {
    Louvain,
    LabelPropagation,
}

/// A complete, non-overlapping partition of the projected nodes.
#[derive(Debug, Clone, Serialize)]
pub struct CommunityAssignment {
    pub algorithm: CommunityAlgorithm,
    pub communities: BTreeMap<usize, Vec<String>>,
    pub modularity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub average_degree: f64,
    pub clustering_coefficient: f64,
    pub connected_components: usize,
    pub is_connected: bool,
    /// Absent when the graph is disconnected or larger than the
    /// configured diameter limit; exact diameter is expensive.
    pub diameter: Option<usize>,
}

/// A high-betweenness node whose neighborhood spans multiple detected
/// communities.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeNode {
    pub id: String,
    pub betweenness: f64,
    /// The communities this node connects, its own included.
    pub communities: Vec<usize>,
}

/// Centrality bundle for a single node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeImportance {
    pub id: String,
    pub pagerank: f64,
    pub betweenness: f64,
    pub closeness: f64,
    pub degree: usize,
    pub clustering_coefficient: f64,
}

/// Computes centrality, community and structural metrics against a cached
/// [`GraphProjection`].
///
/// Projection lifecycle: absent or stale (TTL expired, or the store
/// generation moved) triggers a synchronous rebuild under a single-builder
/// lock before the analytics run; readers always see either the previous
/// complete snapshot or the new one.
pub struct GraphAnalyzer {
    client: Arc<Neo4jClient>,
    config: AnalyticsConfig,
    generation: Arc<StoreGeneration>,
    slot: ArcSwapOption<GraphProjection>,
    build_lock: tokio::sync::Mutex<()>,
}

impl GraphAnalyzer {
    pub fn new(
        client: Arc<Neo4jClient>,
        config: AnalyticsConfig,
        generation: Arc<StoreGeneration>,
    ) -> Self {
        Self {
            client,
            config,
            generation,
            slot: ArcSwapOption::default(),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The current projection, rebuilding synchronously if absent or
    /// stale.
    pub async fn projection(&self) -> GraphResult<Arc<GraphProjection>> {
        let current = self.generation.current();
        if let Some(projection) = self.slot.load_full() {
            if projection.is_fresh(self.config.projection_ttl, current) {
                return Ok(projection);
            }
        }

        let _guard = self.build_lock.lock().await;
        // Another caller may have rebuilt while this one waited.
        let current = self.generation.current();
        if let Some(projection) = self.slot.load_full() {
            if projection.is_fresh(self.config.projection_ttl, current) {
                return Ok(projection);
            }
        }

        let projection = Arc::new(GraphProjection::load(&self.client, current).await?);
        self.slot.store(Some(projection.clone()));
        Ok(projection)
    }

    /// Drop the cached projection; the next analytics call rebuilds.
    pub fn invalidate_projection(&self) {
        self.slot.store(None);
    }

    /// Top-k PageRank, descending score, ties broken by ascending id.
    pub async fn calculate_pagerank(
        &self,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> GraphResult<Vec<(String, f64)>> {
        let projection = self.projection().await?;
        let scores = centrality::pagerank(
            &projection,
            self.config.pagerank_damping,
            self.config.pagerank_max_iterations,
            self.config.pagerank_tolerance,
            cancel,
        )?;
        Ok(rank_top_k(&projection, &scores, top_k))
    }

    pub async fn calculate_betweenness_centrality(
        &self,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> GraphResult<Vec<(String, f64)>> {
        let projection = self.projection().await?;
        let scores = centrality::betweenness(&projection, cancel)?;
        Ok(rank_top_k(&projection, &scores, top_k))
    }

    pub async fn calculate_closeness_centrality(
        &self,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> GraphResult<Vec<(String, f64)>> {
        let projection = self.projection().await?;
        let scores = centrality::closeness(&projection, cancel)?;
        Ok(rank_top_k(&projection, &scores, top_k))
    }

    /// Partition the projection into communities. Seeded via
    /// configuration, so repeated calls over the same projection agree.
    pub async fn detect_communities(
        &self,
        algorithm: CommunityAlgorithm,
        cancel: &CancellationToken,
    ) -> GraphResult<CommunityAssignment> {
        let projection = self.projection().await?;
        let assignment = match algorithm {
            CommunityAlgorithm::Louvain => {
                community::louvain(&projection, self.config.community_seed, cancel)?
            }
            CommunityAlgorithm::LabelPropagation => {
                community::label_propagation(&projection, self.config.community_seed, cancel)?
            }
        };

        let modularity = community::modularity(&projection, &assignment);
        let mut communities: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (node, &comm) in assignment.iter().enumerate() {
            communities
                .entry(comm)
                .or_default()
                .push(projection.id(node).to_string());
        }
        for members in communities.values_mut() {
            members.sort();
        }

        tracing::info!(
            "Detected {} communities (modularity {:.4})",
            communities.len(),
            modularity
        );
        Ok(CommunityAssignment {
            algorithm,
            communities,
            modularity,
        })
    }

    pub async fn calculate_graph_metrics(
        &self,
        cancel: &CancellationToken,
    ) -> GraphResult<GraphMetrics> {
        let projection = self.projection().await?;
        let n = projection.node_count();
        let (components, _) = metrics::connected_components(&projection);
        let is_connected = components == 1 && n > 0;

        let diameter = if is_connected && n <= self.config.diameter_node_limit {
            Some(metrics::diameter(&projection, cancel)?)
        } else {
            None
        };

        let undirected_edges = metrics::undirected_edge_count(&projection);
        Ok(GraphMetrics {
            node_count: n,
            edge_count: projection.edge_count(),
            density: metrics::density(&projection),
            average_degree: if n > 0 {
                2.0 * undirected_edges as f64 / n as f64
            } else {
                0.0
            },
            clustering_coefficient: metrics::average_clustering(projection.undirected_adjacency()),
            connected_components: components,
            is_connected,
            diameter,
        })
    }

    /// Nodes in the top betweenness percentile whose neighborhoods span at
    /// least two detected communities.
    pub async fn identify_bridge_nodes(
        &self,
        cancel: &CancellationToken,
    ) -> GraphResult<Vec<BridgeNode>> {
        let projection = self.projection().await?;
        let assignment =
            community::label_propagation(&projection, self.config.community_seed, cancel)?;
        let scores = centrality::betweenness(&projection, cancel)?;

        let threshold = percentile(&scores, self.config.bridge_betweenness_percentile);
        let adj = projection.undirected_adjacency();

        let mut bridges = Vec::new();
        for node in 0..projection.node_count() {
            if scores[node] < threshold || scores[node] <= 0.0 {
                continue;
            }
            let mut communities: BTreeSet<usize> = BTreeSet::new();
            communities.insert(assignment[node]);
            for &neighbor in &adj[node] {
                communities.insert(assignment[neighbor]);
            }
            if communities.len() >= 2 {
                bridges.push(BridgeNode {
                    id: projection.id(node).to_string(),
                    betweenness: scores[node],
                    communities: communities.into_iter().collect(),
                });
            }
        }

        bridges.sort_by(|a, b| {
            b.betweenness
                .total_cmp(&a.betweenness)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(bridges)
    }

    /// PageRank, betweenness, closeness, degree and local clustering for
    /// one node.
    pub async fn get_node_importance(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> GraphResult<NodeImportance> {
        let projection = self.projection().await?;
        let node = projection
            .index_of(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;

        let pagerank = centrality::pagerank(
            &projection,
            self.config.pagerank_damping,
            self.config.pagerank_max_iterations,
            self.config.pagerank_tolerance,
            cancel,
        )?;
        let betweenness = centrality::betweenness(&projection, cancel)?;
        let closeness = centrality::closeness(&projection, cancel)?;
        let adj = projection.undirected_adjacency();

        Ok(NodeImportance {
            id: id.to_string(),
            pagerank: pagerank[node],
            betweenness: betweenness[node],
            closeness: closeness[node],
            degree: adj[node].len(),
            clustering_coefficient: metrics::local_clustering(adj, node),
        })
    }
}

/// Dense scores -> named top-k, descending, ties by ascending id.
fn rank_top_k(projection: &GraphProjection, scores: &[f64], top_k: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = scores
        .iter()
        .enumerate()
        .map(|(node, &score)| (projection.id(node).to_string(), score))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_k);
    ranked
}

/// Value at the given percentile (0..1) of the score distribution.
fn percentile(scores: &[f64], p: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).floor() as usize;
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_top_k_orders_and_truncates() {
        let projection = GraphProjection::from_parts(
            vec!["a".into(), "b".into(), "c".into()],
            vec![],
            0,
        );
        let scores = vec![0.2, 0.5, 0.2];
        let ranked = rank_top_k(&projection, &scores, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "b");
        // a and c tie; ascending id wins.
        assert_eq!(ranked[1].0, "a");
    }

    #[test]
    fn test_percentile() {
        let scores = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
        assert!((percentile(&scores, 0.9) - 0.8).abs() < 1e-9);
        assert_eq!(percentile(&[], 0.9), 0.0);
    }
}
