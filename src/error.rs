//! Error types for the image loader.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Transient;

/// Errors raised while listing the source directory.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source directory unavailable: {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    #[error("invalid exclude pattern '{0}'")]
    InvalidPattern(String),
}

/// Errors related to embedding computation.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding function failed: {0}")]
    FunctionError(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Transient for EncodingError {
    fn is_transient(&self) -> bool {
        match self {
            EncodingError::ConnectionError(_) | EncodingError::Timeout => true,
            EncodingError::ServerError(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.contains("unavailable")
            }
            EncodingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            // A bad image stays bad on the next attempt.
            EncodingError::InvalidResponse(_) | EncodingError::FunctionError(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to PostgreSQL: {0}")]
    ConnectionError(String),

    #[error("pgvector extension error: {0}")]
    ExtensionError(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("vector has dimension {got}, table expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("insert error: {0}")]
    InsertError(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),
}

/// Failure of a single item. Never aborts sibling items or the run.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("encoding failed for {identifier}: {cause}")]
    EncodingFailed {
        identifier: String,
        cause: EncodingError,
    },

    #[error("write failed for {location}: {cause}")]
    WriteFailed { location: String, cause: StoreError },

    #[error("worker for {identifier} panicked")]
    Panicked { identifier: String },
}

impl ItemError {
    pub fn identifier(&self) -> &str {
        match self {
            ItemError::EncodingFailed { identifier, .. } | ItemError::Panicked { identifier } => {
                identifier
            }
            ItemError::WriteFailed { location, .. } => location,
        }
    }
}

/// Worker pool failures that abort the current batch.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool exhausted: {0}")]
    ResourceExhaustion(String),
}

/// Fatal pipeline errors. Each one terminates the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),

    #[error("schema initialization failed: {0}")]
    Schema(#[source] StoreError),

    #[error(
        "batch {batch_index} aborted after {processed} items were processed in earlier batches: {source}"
    )]
    ResourceExhaustion {
        batch_index: usize,
        processed: u64,
        #[source]
        source: PoolError,
    },
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}
