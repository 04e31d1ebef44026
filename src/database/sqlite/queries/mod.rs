
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

const KNOWLEDGE_BASE_COLUMNS: &str = "id, name, description, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "id, knowledge_base_id, name, extension, size, content_hash, \
     storage, status, chunk_count, error_message, created_at, updated_at";

pub struct KnowledgeBaseQueries;

impl KnowledgeBaseQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_kb: NewKnowledgeBase) -> Result<KnowledgeBase> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO knowledge_bases (id, name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&new_kb.name)
        .bind(&new_kb.description)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create knowledge base")?;

        debug!("Created knowledge base {} ({})", new_kb.name, id);

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created knowledge base"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<KnowledgeBase>> {
        let query = format!(
            "SELECT {} FROM knowledge_bases WHERE id = ?",
            KNOWLEDGE_BASE_COLUMNS
        );
        sqlx::query_as::<_, KnowledgeBase>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get knowledge base by id")
    }

    #[inline]
    pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<KnowledgeBase>> {
        let query = format!(
            "SELECT {} FROM knowledge_bases WHERE name = ?",
            KNOWLEDGE_BASE_COLUMNS
        );
        sqlx::query_as::<_, KnowledgeBase>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("Failed to get knowledge base by name")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<KnowledgeBase>> {
        let query = format!(
            "SELECT {} FROM knowledge_bases ORDER BY created_at DESC",
            KNOWLEDGE_BASE_COLUMNS
        );
        sqlx::query_as::<_, KnowledgeBase>(&query)
            .fetch_all(pool)
            .await
            .context("Failed to list knowledge bases")
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_doc: NewDocument) -> Result<Document> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO documents (id, knowledge_base_id, name, extension, size, content_hash, \
             storage, status, chunk_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'processing', 0, ?, ?)",
        )
        .bind(id)
        .bind(new_doc.knowledge_base_id)
        .bind(&new_doc.name)
        .bind(&new_doc.extension)
        .bind(new_doc.size)
        .bind(&new_doc.content_hash)
        .bind(&new_doc.storage)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?;

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Document>> {
        let query = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        sqlx::query_as::<_, Document>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get document by id")
    }

    /// Newest processing or ready document in `kb_id` with the given hash
    #[inline]
    pub async fn find_active_by_hash(
        pool: &SqlitePool,
        kb_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        let query = format!(
            "SELECT {} FROM documents \
             WHERE knowledge_base_id = ? AND content_hash = ? \
             AND status IN ('processing', 'ready') \
             ORDER BY created_at DESC LIMIT 1",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(kb_id)
            .bind(content_hash)
            .fetch_optional(pool)
            .await
            .context("Failed to look up document by content hash")
    }

    /// Every document of a knowledge base that has not been deleted
    #[inline]
    pub async fn list_by_knowledge_base(pool: &SqlitePool, kb_id: Uuid) -> Result<Vec<Document>> {
        let query = format!(
            "SELECT {} FROM documents \
             WHERE knowledge_base_id = ? AND status != 'deleted' \
             ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(kb_id)
            .fetch_all(pool)
            .await
            .context("Failed to list documents")
    }

    #[inline]
    pub async fn list_by_status(
        pool: &SqlitePool,
        status: DocumentStatus,
        kb_id: Option<Uuid>,
    ) -> Result<Vec<Document>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM documents WHERE status = ", DOCUMENT_COLUMNS));
        builder.push_bind(status);
        if let Some(kb_id) = kb_id {
            builder.push(" AND knowledge_base_id = ");
            builder.push_bind(kb_id);
        }
        builder.push(" ORDER BY created_at");

        builder
            .build_query_as::<Document>()
            .fetch_all(pool)
            .await
            .context("Failed to list documents by status")
    }

    #[inline]
    pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(DocumentStatus, i64)>> {
        sqlx::query_as::<_, (DocumentStatus, i64)>(
            "SELECT status, COUNT(*) FROM documents GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
        .context("Failed to count documents by status")
    }

    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        update: DocumentUpdate,
    ) -> Result<Option<Document>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("UPDATE documents SET updated_at = ");
        builder.push_bind(Utc::now());

        if let Some(status) = update.status {
            builder.push(", status = ");
            builder.push_bind(status);
            builder.push(", error_message = ");
            builder.push_bind(update.error_message);
        }

        if let Some(chunk_count) = update.chunk_count {
            builder.push(", chunk_count = ");
            builder.push_bind(chunk_count);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder
            .build()
            .execute(pool)
            .await
            .context("Failed to update document")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::get_by_id(pool, id).await
    }

    /// Mark a document deleted; `false` if it was unknown or already deleted
    #[inline]
    pub async fn soft_delete(pool: &SqlitePool, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = 'deleted', updated_at = ? \
             WHERE id = ? AND status != 'deleted'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}
