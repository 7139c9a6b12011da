//! Embedding encoders.
//!
//! An encoder turns one image path into a vector. The pipeline treats it as an opaque,
//! slow and independently failing call.

mod http;
mod sql;

pub use http::HttpEncoder;
pub use sql::SqlFunctionEncoder;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::EncodingError;
use crate::models::{EncoderConfig, EncoderDriver};
use crate::utils::retry::{RetryPolicy, retry_transient};

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Compute the embedding of the file at `path`.
    async fn encode(&self, path: &Path) -> Result<Vec<f32>, EncodingError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Encoder decorator that retries transient failures.
pub struct Retrying<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: Encoder> Retrying<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<E: Encoder> Encoder for Retrying<E> {
    async fn encode(&self, path: &Path) -> Result<Vec<f32>, EncodingError> {
        retry_transient(&self.policy, || self.inner.encode(path)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Build the configured encoder. The SQL driver needs a database pool.
pub fn create_encoder(
    config: &EncoderConfig,
    pool: Option<PgPool>,
) -> Result<Arc<dyn Encoder>, EncodingError> {
    let policy = RetryPolicy::new(config.max_attempts);

    match config.driver {
        EncoderDriver::Http => {
            let encoder = HttpEncoder::new(config)?;
            Ok(Arc::new(Retrying::new(encoder, policy)))
        }
        EncoderDriver::Sql => {
            let pool = pool.ok_or_else(|| {
                EncodingError::ConnectionError(
                    "the sql encoder requires a PostgreSQL store; \
                     use --encoder http (encoder.driver = \"http\") with the memory store"
                        .to_string(),
                )
            })?;
            let encoder = SqlFunctionEncoder::new(pool, &config.function);
            Ok(Arc::new(Retrying::new(encoder, policy)))
        }
    }
}
