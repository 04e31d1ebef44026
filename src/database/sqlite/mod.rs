use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::RagError;
use crate::database::MetadataStore;

#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

pub use models::{
    Document, DocumentStatus, DocumentUpdate, KnowledgeBase, MAX_NAME_LEN, NewDocument,
    NewKnowledgeBase,
};
pub use queries::{DocumentQueries, KnowledgeBaseQueries};

pub type DbPool = Pool<Sqlite>;

/// SQLite metadata store for knowledge bases and documents
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open (creating if needed) `metadata.db` inside `config_dir`
    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("metadata.db");

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_path).await
    }

    /// Number of documents per status, statuses without documents omitted
    #[inline]
    pub async fn document_counts(&self) -> Result<Vec<(DocumentStatus, i64)>> {
        DocumentQueries::count_by_status(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}

fn database_error(error: &anyhow::Error) -> RagError {
    RagError::Database(format!("{:#}", error))
}

fn validate_knowledge_base(new_kb: &NewKnowledgeBase) -> crate::Result<()> {
    let name_len = new_kb.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_LEN {
        return Err(RagError::InvalidInput(format!(
            "knowledge base name must be 1 to {} characters",
            MAX_NAME_LEN
        )));
    }
    if new_kb
        .description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_NAME_LEN)
    {
        return Err(RagError::InvalidInput(format!(
            "knowledge base description must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

#[async_trait]
impl MetadataStore for Database {
    async fn create_knowledge_base(&self, new_kb: NewKnowledgeBase) -> crate::Result<KnowledgeBase> {
        validate_knowledge_base(&new_kb)?;
        if self
            .get_knowledge_base_by_name(&new_kb.name)
            .await?
            .is_some()
        {
            return Err(RagError::NameConflict(new_kb.name));
        }
        KnowledgeBaseQueries::create(&self.pool, new_kb)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn get_knowledge_base(&self, id: Uuid) -> crate::Result<Option<KnowledgeBase>> {
        KnowledgeBaseQueries::get_by_id(&self.pool, id)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn get_knowledge_base_by_name(&self, name: &str) -> crate::Result<Option<KnowledgeBase>> {
        KnowledgeBaseQueries::get_by_name(&self.pool, name)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn list_knowledge_bases(&self) -> crate::Result<Vec<KnowledgeBase>> {
        KnowledgeBaseQueries::list_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn create_document(&self, new_doc: NewDocument) -> crate::Result<Document> {
        DocumentQueries::create(&self.pool, new_doc)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn get_document(&self, id: Uuid) -> crate::Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn find_active_by_hash(
        &self,
        kb_id: Uuid,
        content_hash: &str,
    ) -> crate::Result<Option<Document>> {
        DocumentQueries::find_active_by_hash(&self.pool, kb_id, content_hash)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn list_documents(&self, kb_id: Uuid) -> crate::Result<Vec<Document>> {
        DocumentQueries::list_by_knowledge_base(&self.pool, kb_id)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn update_document_status(
        &self,
        id: Uuid,
        update: DocumentUpdate,
    ) -> crate::Result<Option<Document>> {
        DocumentQueries::update(&self.pool, id, update)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn soft_delete_document(&self, id: Uuid) -> crate::Result<bool> {
        DocumentQueries::soft_delete(&self.pool, id)
            .await
            .map_err(|e| database_error(&e))
    }

    async fn list_documents_by_status(
        &self,
        status: DocumentStatus,
        kb_id: Option<Uuid>,
    ) -> crate::Result<Vec<Document>> {
        DocumentQueries::list_by_status(&self.pool, status, kb_id)
            .await
            .map_err(|e| database_error(&e))
    }
}
