use thiserror::Error;

use crate::external::ExternalError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store not initialized. Call create_from_documents or load_existing first.")]
    NotInitialized,

    #[error("Embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vector store file is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Vector DB error: {0}")]
    Backend(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] ExternalError),
}
