use std::time::Duration;
use thiserror::Error;

/// Coarse classification surfaced to callers: every failure aborts the request as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    MissingObject(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding dimension {actual} does not match expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding model failed: {0}")]
    Model(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("document contains no text: {0}")]
    EmptyDocument(String),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidChunkConfig(_) | Self::EmptyDocument(_) => {
                ErrorKind::Validation
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(_) | Self::Embedding(_) | Self::Extraction(_) | Self::Worker(_) => {
                ErrorKind::Upstream
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("No nodes found for this file")]
    EmptyCorpus { file_id: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector scan exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::EmptyCorpus { .. } => ErrorKind::NotFound,
            Self::Store(_) | Self::Embedding(_) | Self::DeadlineExceeded(_) | Self::Worker(_) => {
                ErrorKind::Upstream
            }
        }
    }
}
