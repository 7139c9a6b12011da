use std::path::Path;

use async_trait::async_trait;
use sqlx::PgPool;

use super::Encoder;
use crate::error::EncodingError;

/// Computes embeddings with a function installed in the database,
/// e.g. `clip_image(path) -> real[]`.
pub struct SqlFunctionEncoder {
    pool: PgPool,
    query: String,
}

impl SqlFunctionEncoder {
    /// `function` must already be validated as a SQL identifier.
    pub fn new(pool: PgPool, function: &str) -> Self {
        Self {
            pool,
            query: encode_query(function),
        }
    }
}

fn encode_query(function: &str) -> String {
    format!("SELECT {}($1)::real[]", function)
}

#[async_trait]
impl Encoder for SqlFunctionEncoder {
    async fn encode(&self, path: &Path) -> Result<Vec<f32>, EncodingError> {
        let (vector,): (Option<Vec<f32>>,) = sqlx::query_as(&self.query)
            .bind(path.to_string_lossy().into_owned())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
                    EncodingError::ConnectionError(e.to_string())
                }
                other => EncodingError::FunctionError(other.to_string()),
            })?;

        vector.ok_or_else(|| EncodingError::FunctionError("function returned NULL".to_string()))
    }

    fn name(&self) -> &str {
        "sql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_query() {
        assert_eq!(
            encode_query("clip_image"),
            "SELECT clip_image($1)::real[]"
        );
    }
}
