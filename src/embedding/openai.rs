use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequest, EmbeddingInput},
    Client as OpenAIClient,
};
use phf::phf_map;

use crate::config::EmbeddingConfig;

use super::{EmbeddingClient, EmbeddingRequest, EmbeddingResponse};

static DEFAULT_EMBEDDING_DIMENSIONS: phf::Map<&str, usize> = phf_map! {
    "text-embedding-3-small" => 1536,
    "text-embedding-3-large" => 3072,
    "text-embedding-ada-002" => 1536,
};

/// OpenAI embedding backend.
pub struct OpenAiEmbeddingClient {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Uses `OPENAI_API_KEY` (and optionally `OPENAI_API_BASE`) from the
    /// environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable must be set");
        }

        let dimension = DEFAULT_EMBEDDING_DIMENSIONS
            .get(config.model.as_str())
            .copied()
            .unwrap_or(config.dimension);

        Ok(Self {
            client: OpenAIClient::with_config(OpenAIConfig::new()),
            model: config.model.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed<'req>(&self, request: EmbeddingRequest<'req>) -> Result<EmbeddingResponse> {
        let response = self
            .client
            .embeddings()
            .create(CreateEmbeddingRequest {
                model: self.model.clone(),
                input: EmbeddingInput::StringArray(request.texts.to_vec()),
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow!("Failed to create embeddings: {}", e))?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        if data.len() != request.texts.len() {
            bail!(
                "embedding count mismatch: requested {}, got {}",
                request.texts.len(),
                data.len()
            );
        }

        Ok(EmbeddingResponse {
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
