//! Vector, keyword and hybrid search over graph entities.

mod fusion;
mod keyword;

use neo4rs::query;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::embedding::EmbeddingIndexService;
use crate::errors::{GraphError, GraphResult};
use crate::graph_db::bolt::string_list;
use crate::graph_db::records::{entity_projection, fetch_entities_by_ids, row_to_entity};
use crate::graph_db::schema::BASE_LABEL;
use crate::graph_db::Neo4jClient;
use crate::models::{ContextualSearchResult, Entity, SearchHit};
use crate::query::traversal::expand_neighborhood;

use fusion::fuse_ranked_lists;
use keyword::{keyword_score, query_tokens};

pub struct SearchEngine {
    client: Arc<Neo4jClient>,
    index_service: Arc<EmbeddingIndexService>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        client: Arc<Neo4jClient>,
        index_service: Arc<EmbeddingIndexService>,
        config: SearchConfig,
    ) -> Self {
        Self {
            client,
            index_service,
            config,
        }
    }

    /// Nearest entities by cosine similarity, descending, ties broken by
    /// ascending id. Fails with [`GraphError::IndexNotBuilt`] when no
    /// index has been published; "no index" and "no results" are
    /// different answers.
    pub async fn vector_search(
        &self,
        query_text: &str,
        top_k: usize,
        label_filter: Option<&str>,
    ) -> GraphResult<Vec<SearchHit>> {
        let index = self.index_service.index().ok_or(GraphError::IndexNotBuilt)?;
        let embedded = self.index_service.embed_query(query_text).await?;
        let ranked = index.top_k(&embedded, top_k, label_filter)?;
        self.hydrate_ranked(&ranked).await
    }

    /// Token/substring match against entity text, independent of the
    /// vector index; works even when no index has ever been built.
    pub async fn keyword_search(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> GraphResult<Vec<SearchHit>> {
        let overfetch = self.overfetch(top_k);
        let mut hits: Vec<SearchHit> = self
            .keyword_candidates(query_text, overfetch)
            .await?
            .into_iter()
            .map(|(entity, score)| SearchHit { entity, score })
            .collect();
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Fused vector + keyword ranking.
    ///
    /// Both sides are overfetched, min-max normalized independently, then
    /// combined as `vector_weight * v + keyword_weight * k` with 0 for a
    /// candidate absent from one list. Weights need not sum to 1.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        top_k: usize,
        vector_weight: f32,
        keyword_weight: f32,
    ) -> GraphResult<Vec<SearchHit>> {
        let index = self.index_service.index().ok_or(GraphError::IndexNotBuilt)?;
        let overfetch = self.overfetch(top_k);

        let embedded = self.index_service.embed_query(query_text).await?;
        let vector_ranked = index.top_k(&embedded, overfetch, None)?;

        let keyword_ranked: Vec<(String, f32)> = self
            .keyword_candidates(query_text, overfetch)
            .await?
            .into_iter()
            .map(|(entity, score)| (entity.id, score))
            .collect();

        let mut fused = fuse_ranked_lists(
            &vector_ranked,
            &keyword_ranked,
            vector_weight,
            keyword_weight,
        );
        fused.truncate(top_k);
        self.hydrate_ranked(&fused).await
    }

    /// Hybrid search where each hit also carries its `context_depth`-hop
    /// neighborhood, bounded per hop to keep high-degree nodes from
    /// exploding the result.
    pub async fn search_with_context(
        &self,
        query_text: &str,
        top_k: usize,
        context_depth: usize,
    ) -> GraphResult<Vec<ContextualSearchResult>> {
        let hits = self
            .hybrid_search(
                query_text,
                top_k,
                self.config.default_vector_weight,
                self.config.default_keyword_weight,
            )
            .await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let seeds = vec![hit.entity.id.clone()];
            let context = expand_neighborhood(
                &self.client,
                &seeds,
                context_depth,
                crate::models::TraversalDirection::Both,
                Some(self.config.max_neighbors_per_hop),
            )
            .await?;
            results.push(ContextualSearchResult { hit, context });
        }
        Ok(results)
    }

    fn overfetch(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.config.overfetch_factor).max(top_k).max(1)
    }

    /// Store-side token prefilter plus client-side fuzzy rescoring,
    /// descending score with ascending-id tie-break.
    async fn keyword_candidates(
        &self,
        query_text: &str,
        limit: usize,
    ) -> GraphResult<Vec<(Entity, f32)>> {
        let tokens = query_tokens(query_text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let cypher = format!(
            "MATCH (n:`{}`) \
             WHERE any(token IN $tokens WHERE toLower(n.text) CONTAINS token) \
             RETURN {} LIMIT {}",
            BASE_LABEL,
            entity_projection(),
            limit.max(1)
        );
        let rows = self
            .client
            .execute_collect(query(&cypher).param("tokens", string_list(&tokens)))
            .await?;

        let mut scored: Vec<(Entity, f32)> = rows
            .iter()
            .map(row_to_entity)
            .collect::<GraphResult<Vec<_>>>()?
            .into_iter()
            .map(|entity| {
                let score = keyword_score(query_text, &entity.text);
                (entity, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        Ok(scored)
    }

    async fn hydrate_ranked(&self, ranked: &[(String, f32)]) -> GraphResult<Vec<SearchHit>> {
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let entities = fetch_entities_by_ids(&self.client, &ids).await?;
        let mut by_id: HashMap<String, Entity> =
            entities.into_iter().map(|e| (e.id.clone(), e)).collect();

        Ok(ranked
            .iter()
            .filter_map(|(id, score)| {
                by_id.remove(id).map(|entity| SearchHit {
                    entity,
                    score: *score,
                })
            })
            .collect())
    }
}
