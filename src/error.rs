//! Error types for semantic cache operations
//!
//! Every variant knows whether it is worth retrying; the retry executor gives
//! up immediately on the ones that are not.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backing store unreachable or connection dropped
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Collaborator call exceeded its deadline
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Embedding provider failure
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Reranker provider failure
    #[error("Reranker error: {0}")]
    RerankerError(String),

    /// Backing store rejected an operation for a transient reason
    #[error("Store error: {0}")]
    StoreError(String),

    /// Malformed configuration detected at construction
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Caller supplied invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filter expression the backing store cannot evaluate
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Retries exhausted
    #[error("Operation '{operation}' failed after {attempts} attempt(s): {source}")]
    OperationFailed {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<CacheError>,
    },

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether the retry executor should try the operation again
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::ConnectionError(_)
            | CacheError::TimeoutError { .. }
            | CacheError::EmbeddingError(_)
            | CacheError::RerankerError(_)
            | CacheError::StoreError(_)
            | CacheError::Other(_) => true,
            CacheError::ConfigError(_)
            | CacheError::Validation(_)
            | CacheError::InvalidFilter(_)
            | CacheError::SerializationError(_)
            | CacheError::OperationFailed { .. } => false,
        }
    }

    /// Short machine-friendly label, used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::ConnectionError(_) => "connection",
            CacheError::TimeoutError { .. } => "timeout",
            CacheError::EmbeddingError(_) => "embedding",
            CacheError::RerankerError(_) => "reranker",
            CacheError::StoreError(_) => "store",
            CacheError::ConfigError(_) => "config",
            CacheError::Validation(_) => "validation",
            CacheError::InvalidFilter(_) => "invalid_filter",
            CacheError::SerializationError(_) => "serialization",
            CacheError::OperationFailed { .. } => "operation_failed",
            CacheError::Other(_) => "other",
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
