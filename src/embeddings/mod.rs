// Embeddings module
// Provider abstraction plus the Ollama-backed implementation

pub mod ollama;

use async_trait::async_trait;

use crate::{RagError, Result};

pub use ollama::{ModelInfo, OllamaClient};

/// Turns text into fixed-length vectors.
///
/// Every vector returned by one provider has the same length. Implementations
/// return [`RagError::DownstreamFailure`] when the backing service fails.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed several texts, preserving order
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RagError::DownstreamFailure("embedding service returned no vectors".to_string())
        })
    }

    /// Model identifier, for logging
    fn model_name(&self) -> &str;
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || client.generate_embeddings_batch(&texts))
            .await
            .map_err(|e| RagError::DownstreamFailure(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::DownstreamFailure(format!("{:#}", e)))
    }

    fn model_name(&self) -> &str {
        self.model()
    }
}
