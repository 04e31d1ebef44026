// Retrieval pipeline
// Ingests uploads into a knowledge base and answers questions over it


use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunking::{Chunk, ChunkingConfig, chunk_text};
use crate::config::{Config, RetrievalConfig};
use crate::database::lancedb::{SearchHit, SearchParams, StoreOutcome, VectorStore};
use crate::database::{
    Database, Document, DocumentStatus, DocumentUpdate, KnowledgeBase, MetadataStore,
    NewDocument, NewKnowledgeBase,
};
use crate::embeddings::{EmbeddingProvider, OllamaClient};
use crate::extraction::{ExtractorRegistry, TextExtractor, file_extension};
use crate::generation::{LanguageModel, OllamaLlm, build_context, render_prompt};
use crate::hashing::content_hash;
use crate::storage::{ByteStream, FileStorage, LocalStorage, object_name};
use crate::{RagError, Result};

/// One uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub kb_id: Uuid,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub doc_id: Uuid,
    pub name: String,
    pub status: DocumentStatus,
    pub chunk_count: usize,
}

impl IngestReceipt {
    fn from_document(document: &Document) -> Self {
        Self {
            doc_id: document.id,
            name: document.name.clone(),
            status: document.status,
            chunk_count: usize::try_from(document.chunk_count).unwrap_or_default(),
        }
    }
}

/// Generated answer with the chunks it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SearchHit>,
    /// The vector search failed and the model answered without context
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub document: Document,
    /// Whether the uploaded bytes are still in file storage
    pub file_present: bool,
}

/// Ingestion and question answering over injected collaborators.
///
/// Every operation is independent; share the pipeline as `Arc` to run them
/// from concurrent tasks.
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn FileStorage>,
    vector_store: Arc<VectorStore>,
    extractors: ExtractorRegistry,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
    temperature: f32,
}

impl std::fmt::Debug for RetrievalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("embedder", &self.embedder.model_name())
            .field("vector_store", &self.vector_store)
            .field("extractors", &self.extractors)
            .field("chunking", &self.chunking)
            .field("retrieval", &self.retrieval)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl RetrievalPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn FileStorage>,
        vector_store: Arc<VectorStore>,
    ) -> Self {
        Self {
            embedder,
            llm,
            metadata,
            storage,
            vector_store,
            extractors: ExtractorRegistry::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            temperature: crate::config::LlmConfig::default().temperature,
        }
    }

    /// Build every collaborator from `config`.
    ///
    /// Returns the metadata database too, for maintenance commands that
    /// need more than the [`MetadataStore`] surface.
    #[inline]
    pub async fn from_config(config: &Config) -> Result<(Self, Arc<Database>)> {
        let database = Arc::new(
            Database::initialize_from_config_dir(config.get_base_dir())
                .await
                .map_err(|e| RagError::Database(format!("{:#}", e)))?,
        );
        let vector_store = Arc::new(VectorStore::from_config(config).await?);
        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| RagError::Config(format!("{:#}", e)))?;
        let llm = OllamaLlm::from_config(config).map_err(|e| RagError::Config(format!("{:#}", e)))?;
        let storage = LocalStorage::new(config.storage_path());

        let pipeline = Self::new(
            Arc::new(embedder),
            Arc::new(llm),
            Arc::clone(&database) as Arc<dyn MetadataStore>,
            Arc::new(storage),
            vector_store,
        )
        .with_chunking(config.chunking.clone())
        .with_retrieval(config.retrieval.clone())
        .with_temperature(config.llm.temperature);

        Ok((pipeline, database))
    }

    #[inline]
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.vector_store
    }

    #[inline]
    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }

    #[inline]
    pub async fn create_knowledge_base(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<KnowledgeBase> {
        let kb = self
            .metadata
            .create_knowledge_base(NewKnowledgeBase {
                name: name.trim().to_string(),
                description,
            })
            .await?;
        info!("Created knowledge base {} ({})", kb.name, kb.id);
        Ok(kb)
    }

    #[inline]
    pub async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>> {
        self.metadata.list_knowledge_bases().await
    }

    /// Look a knowledge base up by id, or by name when `key` is not a UUID
    #[inline]
    pub async fn resolve_knowledge_base(&self, key: &str) -> Result<KnowledgeBase> {
        if let Ok(id) = Uuid::parse_str(key) {
            return self.require_knowledge_base(id).await;
        }

        self.metadata
            .get_knowledge_base_by_name(key.trim())
            .await?
            .ok_or_else(|| RagError::not_found("knowledge base", key))
    }

    /// Store, extract, chunk, embed and index one upload.
    ///
    /// Validation failures happen before any record exists. Once the record
    /// is created, embedding or indexing failures leave it `failed` with the
    /// error message; [`Self::repair_document`] can finish the job later.
    #[inline]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt> {
        let IngestRequest {
            kb_id,
            file_name,
            bytes,
        } = request;

        self.require_knowledge_base(kb_id).await?;
        let extractor = self.extractors.for_file_name(&file_name)?;
        let extension = file_extension(&file_name);

        let content_hash = content_hash(&bytes);
        if let Some(existing) = self
            .metadata
            .find_active_by_hash(kb_id, &content_hash)
            .await?
        {
            info!(
                "Rejecting {}: same content as document {}",
                file_name, existing.id
            );
            return Err(RagError::DuplicateContent {
                existing: existing.id,
            });
        }

        let size = i64::try_from(bytes.len())
            .map_err(|_| RagError::InvalidInput(format!("{} is too large", file_name)))?;
        let locator = self
            .storage
            .save(&object_name(kb_id, Uuid::new_v4(), &file_name), &bytes)
            .await?;
        debug!("Stored {} ({} bytes) at {}", file_name, size, locator);

        let chunks = match self.extract_chunks(extractor, bytes, &file_name).await {
            Ok(chunks) => chunks,
            Err(e) => {
                self.discard_upload(&locator).await;
                return Err(e);
            }
        };

        let document = self
            .metadata
            .create_document(NewDocument {
                knowledge_base_id: kb_id,
                name: file_name,
                extension,
                size,
                content_hash,
                storage: locator,
            })
            .await?;

        let receipt = self.index_document(&document, &chunks).await?;
        info!(
            "Ingested {} as document {} with {} chunks",
            receipt.name, receipt.doc_id, receipt.chunk_count
        );
        Ok(receipt)
    }

    /// Answer `question` from the knowledge base's most similar chunks.
    ///
    /// A degraded search still produces an answer, from an empty context.
    #[inline]
    pub async fn query(&self, kb_id: Uuid, question: &str) -> Result<Answer> {
        let outcome = self.retrieve(kb_id, question).await?;
        let degraded = outcome.is_degraded();
        let sources = outcome.into_value();

        let context = build_context(sources.iter().map(|hit| hit.text.as_str()));
        let prompt = render_prompt(&context, question);
        debug!(
            "Answering with {} context chunks ({} chars)",
            sources.len(),
            context.chars().count()
        );

        let text = self.llm.complete(&prompt, self.temperature).await?;
        Ok(Answer {
            text,
            sources,
            degraded,
        })
    }

    /// The embed-and-search half of [`Self::query`]
    #[inline]
    pub async fn retrieve(
        &self,
        kb_id: Uuid,
        question: &str,
    ) -> Result<StoreOutcome<Vec<SearchHit>>> {
        self.require_knowledge_base(kb_id).await?;

        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyContent("question".to_string()));
        }

        let vector = self.embedder.embed_one(question).await?;
        let params = SearchParams::new(self.retrieval.limit)
            .with_kb(kb_id)
            .with_threshold(self.retrieval.score_threshold)
            .with_candidate_multiplier(self.retrieval.candidate_multiplier);

        Ok(self.vector_store.search(&vector, &params).await)
    }

    /// Remove a document's vectors, stored bytes and listing entry.
    ///
    /// The record is only marked deleted once its vectors are gone, so a
    /// failed call can simply be retried.
    #[inline]
    pub async fn delete_document(&self, doc_id: Uuid) -> Result<()> {
        let document = self.require_document(doc_id).await?;

        if let StoreOutcome::Degraded { reason, .. } =
            self.vector_store.delete_by_document(doc_id).await
        {
            return Err(RagError::StoreUnavailable(reason));
        }

        if !self.storage.delete(&document.storage).await? {
            debug!("Stored file for document {} was already gone", doc_id);
        }

        self.metadata.soft_delete_document(doc_id).await?;
        info!("Deleted document {} ({})", document.name, doc_id);
        Ok(())
    }

    #[inline]
    pub async fn document_info(&self, doc_id: Uuid) -> Result<DocumentInfo> {
        let document = self
            .metadata
            .get_document(doc_id)
            .await?
            .ok_or_else(|| RagError::not_found("document", doc_id))?;

        let file_present = self.storage.exists(&document.storage).await?;
        Ok(DocumentInfo {
            document,
            file_present,
        })
    }

    /// Processing and ready documents of a knowledge base, newest first
    #[inline]
    pub async fn list_documents(&self, kb_id: Uuid) -> Result<Vec<Document>> {
        self.require_knowledge_base(kb_id).await?;

        let mut documents = self.metadata.list_documents(kb_id).await?;
        documents.retain(Document::is_active);
        Ok(documents)
    }

    /// Stream the original upload of a document
    #[inline]
    pub async fn read_document(&self, doc_id: Uuid) -> Result<(Document, ByteStream)> {
        let document = self.require_document(doc_id).await?;
        let stream = self.storage.stream(&document.storage).await?;
        Ok((document, stream))
    }

    /// Rebuild the vectors of a document from its stored bytes.
    ///
    /// Stale points are removed before re-indexing. Ready documents are
    /// returned unchanged.
    #[inline]
    pub async fn repair_document(&self, doc_id: Uuid) -> Result<IngestReceipt> {
        let document = self.require_document(doc_id).await?;
        if !document.needs_repair() {
            debug!("Document {} is already ready", doc_id);
            return Ok(IngestReceipt::from_document(&document));
        }

        info!("Repairing document {} ({})", document.name, doc_id);
        let extractor = self.extractors.for_file_name(&document.name)?;
        let bytes = self.storage.read(&document.storage).await?;

        let chunks = match self.extract_chunks(extractor, bytes, &document.name).await {
            Ok(chunks) => chunks,
            Err(e) => {
                self.mark_failed(doc_id, &e).await;
                return Err(e);
            }
        };

        if let StoreOutcome::Degraded { reason, .. } =
            self.vector_store.delete_by_document(doc_id).await
        {
            return Err(RagError::StoreUnavailable(reason));
        }

        self.index_document(&document, &chunks).await
    }

    /// Documents whose indexing failed, optionally within one knowledge base
    #[inline]
    pub async fn failed_documents(&self, kb_id: Option<Uuid>) -> Result<Vec<Document>> {
        self.metadata
            .list_documents_by_status(DocumentStatus::Failed, kb_id)
            .await
    }

    async fn require_knowledge_base(&self, kb_id: Uuid) -> Result<KnowledgeBase> {
        self.metadata
            .get_knowledge_base(kb_id)
            .await?
            .ok_or_else(|| RagError::not_found("knowledge base", kb_id))
    }

    /// A document that has not been deleted
    async fn require_document(&self, doc_id: Uuid) -> Result<Document> {
        self.metadata
            .get_document(doc_id)
            .await?
            .filter(|document| document.status != DocumentStatus::Deleted)
            .ok_or_else(|| RagError::not_found("document", doc_id))
    }

    async fn extract_chunks(
        &self,
        extractor: Arc<dyn TextExtractor>,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<Vec<Chunk>> {
        let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
            .await
            .map_err(|e| RagError::Extraction(format!("Extraction task failed: {}", e)))??;

        if text.trim().is_empty() {
            return Err(RagError::EmptyContent(file_name.to_string()));
        }

        let chunks = chunk_text(&text, &self.chunking)?;
        debug!(
            "Extracted {} chars from {} into {} chunks",
            text.chars().count(),
            file_name,
            chunks.len()
        );
        Ok(chunks)
    }

    /// Embed and insert `chunks`, then record the outcome on the document
    async fn index_document(&self, document: &Document, chunks: &[Chunk]) -> Result<IngestReceipt> {
        let inserted = match self.embed_and_insert(document, chunks).await {
            Ok(inserted) => inserted,
            Err(e) => {
                error!("Failed to index document {}: {}", document.id, e);
                self.mark_failed(document.id, &e).await;
                return Err(e);
            }
        };

        let updated = self
            .metadata
            .update_document_status(document.id, DocumentUpdate::ready(inserted))
            .await?
            .ok_or_else(|| RagError::not_found("document", document.id))?;

        Ok(IngestReceipt::from_document(&updated))
    }

    async fn embed_and_insert(&self, document: &Document, chunks: &[Chunk]) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_many(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::DownstreamFailure(format!(
                "{} returned {} embeddings for {} chunks",
                self.embedder.model_name(),
                embeddings.len(),
                chunks.len()
            )));
        }

        self.vector_store
            .insert(document.knowledge_base_id, document.id, chunks, &embeddings)
            .await
    }

    async fn mark_failed(&self, doc_id: Uuid, cause: &RagError) {
        if let Err(e) = self
            .metadata
            .update_document_status(doc_id, DocumentUpdate::failed(cause.to_string()))
            .await
        {
            error!("Failed to mark document {} as failed: {}", doc_id, e);
        }
    }

    async fn discard_upload(&self, locator: &str) {
        if let Err(e) = self.storage.delete(locator).await {
            warn!("Failed to remove rejected upload {}: {}", locator, e);
        }
    }
}
