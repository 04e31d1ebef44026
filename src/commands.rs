use anyhow::{Context, Result};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::{Database, Document, DocumentStatus};
use crate::embeddings::OllamaClient;
use crate::pipeline::{IngestRequest, RetrievalPipeline};

async fn open_pipeline() -> Result<(Config, RetrievalPipeline, Arc<Database>)> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let (pipeline, database) = RetrievalPipeline::from_config(&config)
        .await
        .context("Failed to initialize pipeline")?;
    Ok((config, pipeline, database))
}

fn parse_document_id(doc: &str) -> Result<Uuid> {
    Uuid::parse_str(doc.trim()).with_context(|| format!("Invalid document id: {}", doc))
}

/// Where `download` writes: `dest` itself, or the original name inside it
fn download_target(dest: &Path, document_name: &str) -> PathBuf {
    if dest.is_dir() {
        let name = Path::new(document_name)
            .file_name()
            .map_or_else(|| PathBuf::from("document"), PathBuf::from);
        dest.join(name)
    } else {
        dest.to_path_buf()
    }
}

fn print_document(document: &Document) {
    println!("📄 {} (ID: {})", document.name, document.id);
    println!("   Status: {}", document.status);
    println!("   Size: {} bytes", document.size);
    println!("   Chunks: {}", document.chunk_count);
    println!(
        "   Uploaded: {}",
        document.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(message) = &document.error_message {
        println!("   Error: {}", message);
    }
}

/// Create a knowledge base
#[inline]
pub async fn create_knowledge_base(name: &str, description: Option<String>) -> Result<()> {
    let (_config, pipeline, _database) = open_pipeline().await?;

    let kb = pipeline.create_knowledge_base(name, description).await?;

    println!("Created knowledge base: {} (ID: {})", kb.name, kb.id);
    Ok(())
}

/// List all knowledge bases with their document counts
#[inline]
pub async fn list_knowledge_bases() -> Result<()> {
    let (_config, pipeline, _database) = open_pipeline().await?;

    let knowledge_bases = pipeline.list_knowledge_bases().await?;
    if knowledge_bases.is_empty() {
        println!("No knowledge bases have been created yet.");
        println!("Use 'kb-rag kb create <name>' to create one.");
        return Ok(());
    }

    println!("Knowledge Bases ({} total):", knowledge_bases.len());
    println!();

    for kb in &knowledge_bases {
        println!("📚 {} (ID: {})", kb.name, kb.id);
        if let Some(description) = &kb.description {
            println!("   {}", description);
        }
        match pipeline.list_documents(kb.id).await {
            Ok(documents) => println!("   Documents: {}", documents.len()),
            Err(e) => println!("   Documents: Error - {}", e),
        }
        println!();
    }

    Ok(())
}

/// Upload one file into a knowledge base
#[inline]
pub async fn ingest_file(kb: &str, path: &Path) -> Result<()> {
    let (_config, pipeline, _database) = open_pipeline().await?;
    let kb = pipeline.resolve_knowledge_base(kb).await?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    info!("Ingesting {} into knowledge base {}", file_name, kb.name);
    let receipt = pipeline
        .ingest(IngestRequest {
            kb_id: kb.id,
            file_name,
            bytes,
        })
        .await?;

    println!("Document ID: {}", receipt.doc_id);
    println!("Name: {}", receipt.name);
    println!("Status: {}", receipt.status);
    println!("Chunks: {}", receipt.chunk_count);
    Ok(())
}

/// Answer a question from a knowledge base
#[inline]
pub async fn ask(kb: &str, question: &str) -> Result<()> {
    let (_config, pipeline, _database) = open_pipeline().await?;
    let kb = pipeline.resolve_knowledge_base(kb).await?;

    let answer = pipeline.query(kb.id, question).await?;

    println!("{}", answer.text.trim());
    println!();
    if answer.degraded {
        println!("⚠️  Search was unavailable; the answer was generated without context.");
    }
    if !answer.sources.is_empty() {
        println!("Sources:");
        for hit in &answer.sources {
            println!(
                "  • document {} chunk {} (score {:.3})",
                hit.doc_id, hit.chunk_index, hit.score
            );
        }
    }
    Ok(())
}

/// List the documents of a knowledge base
#[inline]
pub async fn list_documents(kb: &str) -> Result<()> {
    let (_config, pipeline, _database) = open_pipeline().await?;
    let kb = pipeline.resolve_knowledge_base(kb).await?;

    let documents = pipeline.list_documents(kb.id).await?;
    if documents.is_empty() {
        println!("Knowledge base {} has no documents.", kb.name);
        println!("Use 'kb-rag ingest {} <file>' to add one.", kb.name);
    } else {
        println!("Documents in {} ({} total):", kb.name, documents.len());
        println!();
        for document in &documents {
            print_document(document);
        }
    }

    let failed = pipeline.failed_documents(Some(kb.id)).await?;
    if !failed.is_empty() {
        println!();
        println!(
            "⚠️  {} document(s) failed to index; run 'kb-rag repair' to retry.",
            failed.len()
        );
    }
    Ok(())
}

/// Delete a document with its vectors and stored file
#[inline]
pub async fn delete_document(doc: &str) -> Result<()> {
    let doc_id = parse_document_id(doc)?;
    let (_config, pipeline, _database) = open_pipeline().await?;

    pipeline.delete_document(doc_id).await?;

    println!("Deleted document {}", doc_id);
    Ok(())
}

/// Show a document record
#[inline]
pub async fn document_info(doc: &str) -> Result<()> {
    let doc_id = parse_document_id(doc)?;
    let (_config, pipeline, _database) = open_pipeline().await?;

    let info = pipeline.document_info(doc_id).await?;

    print_document(&info.document);
    println!("   Knowledge base: {}", info.document.knowledge_base_id);
    println!("   Extension: {}", info.document.extension);
    println!("   SHA-256: {}", info.document.content_hash);
    println!(
        "   Stored file: {}",
        if info.file_present { "present" } else { "missing" }
    );
    Ok(())
}

/// Write the original upload of a document to `dest`
#[inline]
pub async fn download_document(doc: &str, dest: &Path) -> Result<()> {
    let doc_id = parse_document_id(doc)?;
    let (_config, pipeline, _database) = open_pipeline().await?;

    let (document, mut stream) = pipeline.read_document(doc_id).await?;
    let target = download_target(dest, &document.name);

    let mut file = tokio::fs::File::create(&target)
        .await
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let mut written = 0_usize;
    while let Some(piece) = stream
        .try_next()
        .await
        .context("Failed to read stored document")?
    {
        file.write_all(&piece)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
        written += piece.len();
    }
    file.flush().await?;

    println!(
        "Saved {} ({} bytes) to {}",
        document.name,
        written,
        target.display()
    );
    Ok(())
}

/// Re-index one document, or every failed document
#[inline]
pub async fn repair(doc: Option<&str>) -> Result<()> {
    let (_config, pipeline, _database) = open_pipeline().await?;

    let doc_ids = match doc {
        Some(doc) => vec![parse_document_id(doc)?],
        None => pipeline
            .failed_documents(None)
            .await?
            .into_iter()
            .map(|document| document.id)
            .collect(),
    };

    if doc_ids.is_empty() {
        println!("✅ No documents need repair.");
        return Ok(());
    }

    let mut repaired = 0_usize;
    for doc_id in &doc_ids {
        match pipeline.repair_document(*doc_id).await {
            Ok(receipt) => {
                repaired += 1;
                println!(
                    "✅ {} ({}): {} chunks",
                    receipt.name, receipt.doc_id, receipt.chunk_count
                );
            }
            Err(e) => {
                warn!("Repair of document {} failed: {}", doc_id, e);
                println!("❌ {}: {}", doc_id, e);
            }
        }
    }

    println!();
    println!("Repaired {}/{} document(s)", repaired, doc_ids.len());
    Ok(())
}

/// Show the health of every component
#[inline]
pub async fn show_status() -> Result<()> {
    let (config, pipeline, database) = open_pipeline().await?;

    println!("📊 kb-rag status");
    println!();
    println!("Data directory: {}", config.get_base_dir().display());

    println!();
    println!("🤖 Ollama ({}):", config.ollama_url()?);
    let client = OllamaClient::new(&config.ollama)?;
    let embed_client = client.clone();
    let llm_client = client.with_model(config.llm.model.clone());
    let (embed_model, llm_model) = tokio::task::spawn_blocking(move || {
        (embed_client.validate_model(), llm_client.validate_model())
    })
    .await
    .context("Ollama health check task failed")?;
    match embed_model {
        Ok(()) => println!("   ✅ Embedding model {} available", config.ollama.model),
        Err(e) => println!("   ❌ Embedding model {}: {}", config.ollama.model, e),
    }
    match llm_model {
        Ok(()) => println!("   ✅ Language model {} available", config.llm.model),
        Err(e) => println!("   ❌ Language model {}: {}", config.llm.model, e),
    }

    println!();
    println!("🗂️  Vector store ({}):", config.vector_store_uri());
    let vector_store = pipeline.vector_store();
    if vector_store.check_connection().await {
        match vector_store.collection_info().await {
            Ok(Some(info)) => {
                println!("   Collection: {}", info.name);
                println!("   Dimension: {}", info.dimension);
                println!("   Points: {}", info.points_count);
                println!("   Metric: {}", info.metric);
            }
            Ok(None) => println!(
                "   Collection {} not created yet",
                vector_store.collection_name()
            ),
            Err(e) => println!("   ❌ Failed to read collection: {}", e),
        }
    } else {
        println!("   ❌ Not reachable");
    }

    println!();
    println!("📄 Documents:");
    let counts = database.document_counts().await?;
    for status in DocumentStatus::ALL {
        let count = counts
            .iter()
            .find(|(counted, _)| *counted == status)
            .map_or(0, |(_, count)| *count);
        println!("   {}: {}", status, count);
    }

    let knowledge_bases = pipeline.list_knowledge_bases().await?;
    println!();
    println!("📚 Knowledge bases: {}", knowledge_bases.len());

    Ok(())
}
