//! Embedding computation and the derived similarity index.
//!
//! The core depends only on the [`EmbeddingClient`] capability; backends
//! are swappable per deployment.

pub mod hash;
pub mod index;
pub mod openai;
pub mod service;

pub use hash::HashEmbeddingClient;
pub use index::VectorIndex;
pub use openai::OpenAiEmbeddingClient;
pub use service::{EmbeddingIndexService, IndexBuild};

use anyhow::Result;
use async_trait::async_trait;

pub struct EmbeddingRequest<'req> {
    pub texts: &'req [String],
}

pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
}

/// Capability interface for vector embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed<'req>(&self, request: EmbeddingRequest<'req>) -> Result<EmbeddingResponse>;

    /// Output dimensionality; every returned vector must have this length.
    fn dimension(&self) -> usize;
}
