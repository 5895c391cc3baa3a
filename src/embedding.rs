use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Number;
use crate::error::{RagError, Result};
use crate::provider::ProviderClient;
use crate::vector_ops::average_vectors;

/// Text-to-vector model.
///
/// Implementors only supply the raw per-chunk vectors; [`Embedder::embed`]
/// folds them into one vector of [`Embedder::dimension`] components.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// One vector per chunk the model split `text` into.
    fn embed_chunks(&self, text: &str) -> Result<Vec<Vec<Number>>>;

    fn embed(&self, text: &str) -> Result<Vec<Number>> {
        let chunks = self.embed_chunks(text)?;
        if chunks.len() > 1 {
            debug!("Embedding returned {} chunks, averaging them", chunks.len());
        }
        let vector = average_vectors(&chunks)
            .ok_or_else(|| RagError::Upstream("embedding response had no usable vectors".to_string()))?;
        if vector.len() != self.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Degrade-don't-halt policy for query embeddings: a failed call becomes the
/// all-zero vector, which is still a valid query.
pub fn embed_or_zero(embedder: &dyn Embedder, text: &str) -> Vec<Number> {
    match embedder.embed(text) {
        Ok(vector) => vector,
        Err(e) => {
            error!("Error generating embedding: {}", e);
            vec![0.0; embedder.dimension()]
        }
    }
}

/// Embeddings endpoint of an OpenAI-compatible provider.
pub struct EmbeddingClient {
    provider: ProviderClient,
    model: String,
    dimension: usize,
}

impl EmbeddingClient {
    pub fn new(provider: ProviderClient, model: &str, dimension: usize) -> Self {
        Self {
            provider,
            model: model.to_string(),
            dimension,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f64>,
}

impl Embedder for EmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_chunks(&self, text: &str) -> Result<Vec<Vec<Number>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let mut response: EmbeddingResponse = self.provider.post_json("embeddings", &request)?;
        if response.data.is_empty() {
            return Err(RagError::Upstream("missing embedding data".to_string()));
        }
        response.data.sort_by_key(|item| item.index);
        Ok(response
            .data
            .into_iter()
            .map(|item| item.embedding.into_iter().map(|v| v as Number).collect())
            .collect())
    }
}
