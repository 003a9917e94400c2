use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use super::{EmbeddingClient, EmbeddingRequest, EmbeddingResponse};

/// Deterministic, offline embedding backend.
///
/// Tokens are hashed into a fixed-dimension bag-of-features vector, so
/// identical text always produces identical vectors and texts sharing
/// tokens land near each other under cosine similarity. Useful for tests
/// and air-gapped deployments; not a substitute for a learned model.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(anyhow!("text cannot be empty"));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(digest[0..8].try_into().unwrap()) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket % self.dimension] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed<'req>(&self, request: EmbeddingRequest<'req>) -> Result<EmbeddingResponse> {
        let embeddings = request
            .texts
            .par_iter()
            .map(|text| self.embed_one(text))
            .collect::<Result<Vec<_>>>()?;
        Ok(EmbeddingResponse { embeddings })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
