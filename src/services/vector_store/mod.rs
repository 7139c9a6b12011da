//! Vector store abstraction layer.
//!
//! The pipeline only bootstraps the schema and inserts rows; searching the index is
//! left to whoever queries the table later.

mod memory;
mod pgvector;

pub use self::memory::MemoryStore;
pub use self::pgvector::{PgVectorStore, connect_pool};

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::{IndexParams, StoreConfig, StoreDriver};

/// Fixed layout of the target table and its ANN index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSpec {
    pub table: String,
    pub index: String,
    pub dimension: usize,
    pub params: IndexParams,
}

impl SchemaSpec {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            table: config.table.clone(),
            index: config.index.clone(),
            dimension: config.dimension as usize,
            params: config.hnsw,
        }
    }

    pub(crate) fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

/// A persisted row. Only the in-memory backend hands these back.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub location: String,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Check if the store is reachable.
    async fn health_check(&self) -> Result<bool, StoreError>;

    /// Create the table and its cosine HNSW index if missing.
    ///
    /// Safe to call on every run. A pre-existing table or index whose dimension,
    /// metric or construction parameters differ is an error, never migrated.
    async fn initialize_schema(&self) -> Result<(), StoreError>;

    /// Persist one row in its own transaction and return the assigned id.
    async fn insert(&self, location: &str, vector: &[f32]) -> Result<i64, StoreError>;

    /// Number of stored rows, or `None` when the table does not exist.
    async fn count(&self) -> Result<Option<u64>, StoreError>;

    fn spec(&self) -> &SchemaSpec;
}

/// A connected backend. `pool` is shared with database-side encoders.
pub struct Backend {
    pub store: Arc<dyn VectorStore>,
    pub pool: Option<PgPool>,
}

/// Connect the configured backend with room for `concurrency` simultaneous items.
pub async fn create_backend(
    config: &StoreConfig,
    concurrency: usize,
) -> Result<Backend, StoreError> {
    let spec = SchemaSpec::from_config(config);

    match config.driver {
        StoreDriver::Memory => Ok(Backend {
            store: Arc::new(MemoryStore::new(spec)),
            pool: None,
        }),
        StoreDriver::PostgreSQL => {
            let max_connections = config
                .pool_max
                .unwrap_or_else(|| u32::try_from(concurrency).unwrap_or(u32::MAX));
            let pool = connect_pool(config, max_connections).await?;
            Ok(Backend {
                store: Arc::new(PgVectorStore::new(pool.clone(), spec)),
                pool: Some(pool),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_default_config() {
        let spec = SchemaSpec::from_config(&StoreConfig::default());
        assert_eq!(spec.dimension, 512);
        assert_eq!(spec.table, "image_table");
        assert_eq!(spec.index, "semantic_image");
    }

    #[test]
    fn test_check_dimension() {
        let spec = SchemaSpec::from_config(&StoreConfig::default());
        assert!(spec.check_dimension(&[0.0; 512]).is_ok());
        assert!(matches!(
            spec.check_dimension(&[0.0; 256]),
            Err(StoreError::DimensionMismatch {
                expected: 512,
                got: 256
            })
        ));
    }

    #[tokio::test]
    async fn test_memory_backend_has_no_pool() {
        let config = StoreConfig {
            driver: StoreDriver::Memory,
            ..Default::default()
        };
        let backend = create_backend(&config, 4).await.unwrap();
        assert!(backend.pool.is_none());
        assert!(backend.store.health_check().await.unwrap());
    }
}
