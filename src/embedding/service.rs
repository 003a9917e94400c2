use arc_swap::ArcSwapOption;
use neo4rs::{query, BoltMap, BoltString};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::EmbeddingConfig;
use crate::errors::{GraphError, GraphResult};
use crate::graph_db::bolt::{bolt_string, float_list, map_list};
use crate::graph_db::records::{fetch_index_candidates, IndexCandidate};
use crate::graph_db::schema::BASE_LABEL;
use crate::graph_db::Neo4jClient;
use crate::models::IndexBuildReport;

use super::index::{IndexEntry, VectorIndex};
use super::{EmbeddingClient, EmbeddingRequest};

/// Rebuild mode for [`EmbeddingIndexService::build_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBuild {
    /// Embed only entities without a cached vector.
    Incremental,
    /// Re-embed everything.
    Full,
}

/// Owns embedding computation and the shared vector index.
///
/// The index is published by atomic swap: readers either see the previous
/// complete index or the new one, never a partially-built structure.
pub struct EmbeddingIndexService {
    client: Arc<Neo4jClient>,
    embedder: Arc<dyn EmbeddingClient>,
    config: EmbeddingConfig,
    index: ArcSwapOption<VectorIndex>,
}

impl EmbeddingIndexService {
    pub fn new(
        client: Arc<Neo4jClient>,
        embedder: Arc<dyn EmbeddingClient>,
        config: EmbeddingConfig,
    ) -> Self {
        Self {
            client,
            embedder,
            config,
            index: ArcSwapOption::default(),
        }
    }

    /// The currently published index, if any build has completed.
    pub fn index(&self) -> Option<Arc<VectorIndex>> {
        self.index.load_full()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub async fn embed_query(&self, text: &str) -> GraphResult<Vec<f32>> {
        let texts = vec![text.to_string()];
        let response = self
            .embedder
            .embed(EmbeddingRequest { texts: &texts })
            .await
            .map_err(|e| GraphError::Internal(format!("query embedding failed: {}", e)))?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::Internal("embedding backend returned nothing".into()))
    }

    /// Compute embeddings for matching entities and publish a fresh index.
    ///
    /// Individual embedding failures are logged and skipped; the index is
    /// best-effort coverage, not a completeness guarantee. Computed
    /// vectors are written back to the store as the node-level cache, so
    /// the next incremental build reuses them.
    pub async fn build_index(
        &self,
        label_filter: Option<&str>,
        mode: IndexBuild,
        cancel: &CancellationToken,
    ) -> GraphResult<IndexBuildReport> {
        let dimension = self.embedder.dimension();
        let candidates = fetch_index_candidates(&self.client, label_filter).await?;
        tracing::info!(
            "Building vector index over {} candidate entities (mode {:?})",
            candidates.len(),
            mode
        );

        let mut report = IndexBuildReport::default();
        let mut items: Vec<(IndexEntry, Vec<f32>)> = Vec::with_capacity(candidates.len());
        let mut pending: Vec<IndexCandidate> = Vec::new();

        for candidate in candidates {
            let cached = candidate
                .embedding
                .as_ref()
                .filter(|v| v.len() == dimension && mode == IndexBuild::Incremental);
            match cached {
                Some(vector) => {
                    report.reused += 1;
                    items.push((entry_for(&candidate), vector.clone()));
                }
                None => pending.push(candidate),
            }
        }

        let mut written: Vec<(String, Vec<f32>)> = Vec::new();
        for chunk in pending.chunks(self.config.embed_batch_size.max(1)) {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            for (candidate, vector) in self.embed_chunk(chunk).await {
                match vector {
                    Some(vector) if vector.len() == dimension => {
                        report.embedded += 1;
                        written.push((candidate.id.clone(), vector.clone()));
                        items.push((entry_for(candidate), vector));
                    }
                    Some(vector) => {
                        tracing::warn!(
                            "Skipping {}: backend returned dimension {} (expected {})",
                            candidate.id,
                            vector.len(),
                            dimension
                        );
                        report.skipped += 1;
                    }
                    None => report.skipped += 1,
                }
            }
        }

        if let Err(e) = self.write_back(&written).await {
            tracing::warn!("Embedding cache write-back failed (index still built): {}", e);
        }

        report.indexed = items.len();
        let index = VectorIndex::build(dimension, items)?;
        self.index.store(Some(Arc::new(index)));
        tracing::info!(
            "Vector index published: {} indexed, {} embedded, {} reused, {} skipped",
            report.indexed,
            report.embedded,
            report.reused,
            report.skipped
        );
        Ok(report)
    }

    /// Batch embed with a per-entity fallback so one bad text does not
    /// poison the whole chunk.
    async fn embed_chunk<'a>(
        &self,
        chunk: &'a [IndexCandidate],
    ) -> Vec<(&'a IndexCandidate, Option<Vec<f32>>)> {
        let texts: Vec<String> = chunk.iter().map(|c| c.text.clone()).collect();
        match self.embedder.embed(EmbeddingRequest { texts: &texts }).await {
            Ok(response) if response.embeddings.len() == chunk.len() => chunk
                .iter()
                .zip(response.embeddings.into_iter().map(Some))
                .collect(),
            Ok(_) | Err(_) => {
                let mut out = Vec::with_capacity(chunk.len());
                for candidate in chunk {
                    let texts = vec![candidate.text.clone()];
                    let vector = match self.embedder.embed(EmbeddingRequest { texts: &texts }).await
                    {
                        Ok(mut response) => response.embeddings.pop(),
                        Err(e) => {
                            tracing::warn!("Embedding failed for {}: {}", candidate.id, e);
                            None
                        }
                    };
                    out.push((candidate, vector));
                }
                out
            }
        }
    }

    async fn write_back(&self, vectors: &[(String, Vec<f32>)]) -> GraphResult<()> {
        if vectors.is_empty() {
            return Ok(());
        }
        let cypher = format!(
            "UNWIND $rows AS row MATCH (n:`{}` {{id: row.id}}) SET n.embedding = row.embedding",
            BASE_LABEL
        );
        for chunk in vectors.chunks(500) {
            let rows: Vec<BoltMap> = chunk
                .iter()
                .map(|(id, vector)| {
                    let mut row = BoltMap::new();
                    row.put(BoltString::from("id"), bolt_string(id));
                    row.put(BoltString::from("embedding"), float_list(vector));
                    row
                })
                .collect();
            self.client
                .run(query(&cypher).param("rows", map_list(rows)))
                .await?;
        }
        Ok(())
    }

    /// Persist the published index. Fails with
    /// [`GraphError::IndexNotBuilt`] when nothing has been built yet.
    pub fn save_index(&self, path: &Path) -> GraphResult<()> {
        let index = self.index().ok_or(GraphError::IndexNotBuilt)?;
        index.save(path)
    }

    /// Restore a persisted index and publish it.
    pub fn load_index(&self, path: &Path) -> GraphResult<()> {
        let index = VectorIndex::load(path, self.embedder.dimension())?;
        tracing::info!("Loaded vector index ({} entries) from {:?}", index.len(), path);
        self.index.store(Some(Arc::new(index)));
        Ok(())
    }
}

fn entry_for(candidate: &IndexCandidate) -> IndexEntry {
    IndexEntry {
        id: candidate.id.clone(),
        labels: candidate.labels.clone(),
    }
}
