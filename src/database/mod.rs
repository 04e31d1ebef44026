// Database module
// Dual store: SQLite for document metadata, LanceDB for chunk vectors

pub mod lancedb;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::Result;

pub use sqlite::{
    Database, Document, DocumentStatus, DocumentUpdate, KnowledgeBase, NewDocument,
    NewKnowledgeBase,
};

/// Records for knowledge bases and their documents
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_knowledge_base(&self, new_kb: NewKnowledgeBase) -> Result<KnowledgeBase>;

    async fn get_knowledge_base(&self, id: Uuid) -> Result<Option<KnowledgeBase>>;

    /// Knowledge base names are unique
    async fn get_knowledge_base_by_name(&self, name: &str) -> Result<Option<KnowledgeBase>>;

    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>>;

    /// Insert a document record with status `processing`
    async fn create_document(&self, new_doc: NewDocument) -> Result<Document>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// A `processing` or `ready` document in `kb_id` with identical bytes
    async fn find_active_by_hash(&self, kb_id: Uuid, content_hash: &str)
    -> Result<Option<Document>>;

    /// Documents of a knowledge base, newest first, excluding deleted ones
    async fn list_documents(&self, kb_id: Uuid) -> Result<Vec<Document>>;

    /// Apply `update`; `None` if the document does not exist
    async fn update_document_status(
        &self,
        id: Uuid,
        update: DocumentUpdate,
    ) -> Result<Option<Document>>;

    /// Mark the document `deleted`; `false` if unknown or already deleted
    async fn soft_delete_document(&self, id: Uuid) -> Result<bool>;

    async fn list_documents_by_status(
        &self,
        status: DocumentStatus,
        kb_id: Option<Uuid>,
    ) -> Result<Vec<Document>>;
}
