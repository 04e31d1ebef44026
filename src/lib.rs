use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Unsupported file type: .{extension}")]
    UnsupportedFileType { extension: String },

    #[error("Content is empty: {0}")]
    EmptyContent(String),

    #[error("Duplicate content: identical bytes already ingested as document {existing}")]
    DuplicateContent { existing: Uuid },

    #[error("Knowledge base name already in use: {0}")]
    NameConflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Arity mismatch: {chunks} chunks but {embeddings} embeddings")]
    ArityMismatch { chunks: usize, embeddings: usize },

    #[error("Dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector insert failed: {0}")]
    InsertFailed(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Downstream provider failure: {0}")]
    DownstreamFailure(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    #[inline]
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the caller caused this error (bad input, unknown ids, duplicates)
    /// as opposed to a failing system or dependency.
    #[inline]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// HTTP-equivalent status code for surfacing the error to a client
    #[inline]
    pub fn status_code(&self) -> u16 {
        match *self {
            Self::UnsupportedFileType { .. } => 415,
            Self::EmptyContent(_) | Self::Extraction(_) => 422,
            Self::DuplicateContent { .. } | Self::NameConflict(_) => 409,
            Self::InvalidInput(_)
            | Self::ArityMismatch { .. }
            | Self::DimensionMismatch { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::StoreUnavailable(_) => 503,
            Self::DownstreamFailure(_) => 502,
            Self::InsertFailed(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Other(_) => 500,
        }
    }
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extraction;
pub mod generation;
pub mod hashing;
pub mod pipeline;
pub mod storage;
