//! Knowledge graph core: batch ingestion, hybrid semantic search,
//! structured and natural-language querying, and graph analytics on top of
//! an external Cypher-capable graph store.
//!
//! The store (Neo4j or AuraDB via Bolt) is the system of record. This
//! crate builds on top of it:
//!
//! - [`graph_db::SchemaManager`]: idempotent constraints and indexes,
//!   declared before bulk load.
//! - [`builder::GraphBuilder`]: batched, deduplicating upserts with
//!   per-batch transaction isolation and partial-success reporting.
//! - [`embedding::EmbeddingIndexService`]: entity embeddings (pluggable
//!   [`embedding::EmbeddingClient`] backends) and the derived vector
//!   index.
//! - [`search::SearchEngine`]: vector, keyword and fused hybrid search,
//!   with optional k-hop context expansion.
//! - [`query::QueryEngine`]: parameterized Cypher execution with hard
//!   deadlines, NL-to-query translation via a pluggable
//!   [`query::TranslationClient`], traversal and path-finding.
//! - [`analytics::GraphAnalyzer`]: centrality, community detection and
//!   structural metrics over a cached in-memory projection.
//!
//! Consistency: analytics and search read from snapshots (projection,
//! vector index) that are rebuilt on demand; their freshness is eventual
//! with respect to concurrent writes, bounded by the configured TTL and
//! the write-generation counter.

pub mod analytics;
pub mod builder;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod export;
pub mod graph_db;
pub mod models;
pub mod query;
pub mod search;

pub use analytics::{
    BridgeNode, CommunityAlgorithm, CommunityAssignment, GraphAnalyzer, GraphMetrics,
    NodeImportance,
};
pub use builder::{Confirm, GraphBuilder, StoreGeneration};
pub use config::GraphCoreConfig;
pub use embedding::{
    EmbeddingClient, EmbeddingIndexService, HashEmbeddingClient, IndexBuild,
    OpenAiEmbeddingClient,
};
pub use errors::{GraphError, GraphResult};
pub use export::GraphExporter;
pub use graph_db::{Neo4jClient, SchemaManager};
pub use models::{
    BatchReport, Entity, GraphSchema, GraphStatistics, PathResult, PropertyValue, QueryResult,
    Relationship, SearchHit, Subgraph, TranslatedQueryResult, TraversalDirection,
};
pub use query::{OpenAiTranslationClient, QueryEngine, TranslationClient};
pub use search::SearchEngine;

use std::sync::Arc;

/// Wires every component against one store connection and one shared
/// write-generation counter.
pub struct KnowledgeGraphCore {
    client: Arc<Neo4jClient>,
    schema: SchemaManager,
    builder: GraphBuilder,
    index_service: Arc<EmbeddingIndexService>,
    search: SearchEngine,
    query: QueryEngine,
    analyzer: GraphAnalyzer,
}

impl KnowledgeGraphCore {
    /// Connect to the store, declare the base uniqueness constraint, and
    /// assemble the components.
    pub async fn connect(
        config: GraphCoreConfig,
        embedder: Arc<dyn EmbeddingClient>,
        translator: Option<Arc<dyn TranslationClient>>,
    ) -> GraphResult<Self> {
        let client = Arc::new(Neo4jClient::connect(&config.store).await?);
        let generation = Arc::new(StoreGeneration::default());

        let schema = SchemaManager::new(client.clone());
        schema.ensure_base_constraint().await?;

        let builder = GraphBuilder::new(client.clone(), config.builder.clone(), generation.clone());
        let index_service = Arc::new(EmbeddingIndexService::new(
            client.clone(),
            embedder,
            config.embedding.clone(),
        ));
        let search = SearchEngine::new(
            client.clone(),
            index_service.clone(),
            config.search.clone(),
        );
        let query = QueryEngine::new(client.clone(), config.query.clone(), translator);
        let analyzer = GraphAnalyzer::new(client.clone(), config.analytics.clone(), generation);

        Ok(Self {
            client,
            schema,
            builder,
            index_service,
            search,
            query,
            analyzer,
        })
    }

    pub fn client(&self) -> &Neo4jClient {
        &self.client
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    pub fn index_service(&self) -> &EmbeddingIndexService {
        &self.index_service
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    pub fn analyzer(&self) -> &GraphAnalyzer {
        &self.analyzer
    }

    pub fn exporter(&self) -> GraphExporter {
        GraphExporter::new(self.client.clone())
    }
}
