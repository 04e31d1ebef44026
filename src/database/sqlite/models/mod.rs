
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Longest accepted knowledge base name or description
pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct KnowledgeBase {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKnowledgeBase {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Failed,
    Deleted,
}

impl DocumentStatus {
    pub const ALL: [Self; 4] = [Self::Processing, Self::Ready, Self::Failed, Self::Deleted];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }

    /// Counts toward deduplication and listings
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Processing | Self::Ready)
    }
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub content_hash: String,
    /// Locator returned by file storage
    pub storage: String,
    pub status: DocumentStatus,
    pub chunk_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Stored without vectors; `repair_document` can fix it
    #[inline]
    pub fn needs_repair(&self) -> bool {
        matches!(
            self.status,
            DocumentStatus::Processing | DocumentStatus::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub knowledge_base_id: Uuid,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub content_hash: String,
    pub storage: String,
}

/// Partial update of a document record.
///
/// Setting `status` always overwrites `error_message` with the given value, so
/// moving a document out of `failed` clears its stale message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentUpdate {
    pub status: Option<DocumentStatus>,
    pub chunk_count: Option<i64>,
    pub error_message: Option<String>,
}

impl DocumentUpdate {
    #[inline]
    pub fn ready(chunk_count: usize) -> Self {
        Self {
            status: Some(DocumentStatus::Ready),
            chunk_count: Some(i64::try_from(chunk_count).unwrap_or(i64::MAX)),
            error_message: None,
        }
    }

    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(DocumentStatus::Failed),
            chunk_count: None,
            error_message: Some(message.into()),
        }
    }

    #[inline]
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
