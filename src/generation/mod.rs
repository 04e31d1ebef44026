// Answer generation over retrieved context


use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::{RagError, Result};

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Completes prompts with a hosted language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the model's completion of `prompt`
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Join chunk texts, in ranked order, into one context block
#[inline]
pub fn build_context<'a, I>(texts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Fill the fixed instruction template; inserted text is never re-scanned
/// for placeholders
#[inline]
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant answering questions about a knowledge base.
Answer the question using only the context below. If the context does not contain the answer, say that you don't know.

Context:
{context}

Question: {question}

Answer:",
        question = question.trim()
    )
}

/// Ollama `/api/generate` backed language model
#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
}

impl OllamaLlm {
    #[inline]
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    /// Client for the `[llm]` model on the `[ollama]` server
    #[inline]
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = OllamaClient::new(&config.ollama)
            .context("Failed to create Ollama client for answer generation")?
            .with_model(config.llm.model.clone())
            .with_timeout(Duration::from_secs(config.llm.timeout_seconds));
        Ok(Self::new(client))
    }

    #[inline]
    pub fn model(&self) -> &str {
        self.client.model()
    }
}

#[async_trait]
impl LanguageModel for OllamaLlm {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        debug!("Generating answer with model {}", self.client.model());

        let client = self.client.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || client.generate(&prompt, temperature))
            .await
            .map_err(|e| RagError::DownstreamFailure(format!("Generation task failed: {}", e)))?
            .map_err(|e| RagError::DownstreamFailure(format!("{:#}", e)))
    }
}
