//! Immutable configuration for the knowledge graph core.
//!
//! Each component takes its config section by reference at construction
//! time; nothing here is mutated after startup.

use std::time::Duration;

/// Connection settings for the backing graph store.
///
/// Supports both local Neo4j (`bolt://localhost:7687`) and AuraDB
/// (`neo4j+s://xxxxx.databases.neo4j.io`).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub fetch_size: usize,
    pub max_connections: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            fetch_size: 500,
            max_connections: 10,
        }
    }
}

impl StoreConfig {
    pub fn new(uri: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            user: user.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }
}

/// Batch ingestion knobs. `batch_size` is a throughput/latency trade-off,
/// not a correctness parameter.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub batch_size: usize,
    /// Bounded retry budget for transient connection failures.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            retry_base_delay_ms: 250,
        }
    }
}

impl BuilderConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub embed_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            embed_batch_size: 64,
        }
    }
}

impl EmbeddingConfig {
    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Each side of a hybrid search requests `top_k * overfetch_factor`
    /// candidates so rank fusion has enough overlap to work with.
    pub overfetch_factor: usize,
    /// Hard cap on neighbors expanded per hop in contextual search.
    pub max_neighbors_per_hop: usize,
    pub default_vector_weight: f32,
    pub default_keyword_weight: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 3,
            max_neighbors_per_hop: 25,
            default_vector_weight: 0.7,
            default_keyword_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub default_timeout_ms: u64,
    /// Attempts against the translator before giving up with a
    /// translation error.
    pub translation_max_retries: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            translation_max_retries: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Projection freshness window; an expired projection is rebuilt
    /// synchronously on the next analytics call.
    pub projection_ttl: Duration,
    /// Exact diameter is only computed for connected graphs at or below
    /// this node count.
    pub diameter_node_limit: usize,
    pub community_seed: u64,
    pub pagerank_damping: f64,
    pub pagerank_max_iterations: usize,
    pub pagerank_tolerance: f64,
    /// Betweenness percentile above which a community-spanning node is
    /// reported as a bridge.
    pub bridge_betweenness_percentile: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            projection_ttl: Duration::from_secs(300),
            diameter_node_limit: 1_000,
            community_seed: 42,
            pagerank_damping: 0.85,
            pagerank_max_iterations: 100,
            pagerank_tolerance: 1e-6,
            bridge_betweenness_percentile: 0.9,
        }
    }
}

impl AnalyticsConfig {
    pub fn with_projection_ttl(mut self, ttl: Duration) -> Self {
        self.projection_ttl = ttl;
        self
    }

    pub fn with_community_seed(mut self, seed: u64) -> Self {
        self.community_seed = seed;
        self
    }
}

/// Aggregate configuration handed to [`crate::KnowledgeGraphCore`].
#[derive(Debug, Clone, Default)]
pub struct GraphCoreConfig {
    pub store: StoreConfig,
    pub builder: BuilderConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub query: QueryConfig,
    pub analytics: AnalyticsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_is_never_zero() {
        let config = BuilderConfig::default().with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_store_config_builder() {
        let config = StoreConfig::new("neo4j+s://x.databases.neo4j.io", "svc", "pw")
            .with_database("kg");
        assert_eq!(config.database, "kg");
        assert_eq!(config.fetch_size, 500);
    }
}
