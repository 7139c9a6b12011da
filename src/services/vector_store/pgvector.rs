use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::{SchemaSpec, VectorStore};
use crate::error::StoreError;
use crate::models::{IndexParams, StoreConfig};

// Defaults pgvector applies when an hnsw index is built without options.
const PGVECTOR_DEFAULT_M: u32 = 16;
const PGVECTOR_DEFAULT_EF_CONSTRUCTION: u32 = 64;

const COSINE_OPCLASS: &str = "vector_cosine_ops";

/// Open a bounded pool. Every session gets the index's search width.
pub async fn connect_pool(config: &StoreConfig, max_connections: u32) -> Result<PgPool, StoreError> {
    let ef_search = config.hnsw.ef_search;

    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET hnsw.ef_search = {}", ef_search))
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::ConnectionError(e.to_string()))
}

/// PostgreSQL table with a pgvector HNSW index.
pub struct PgVectorStore {
    pool: PgPool,
    spec: SchemaSpec,
    insert_sql: String,
}

/// Shape of an existing index as read from the catalog.
#[derive(Debug, sqlx::FromRow)]
struct IndexRow {
    on_table: bool,
    method: String,
    opclass: String,
    options: Option<Vec<String>>,
}

impl PgVectorStore {
    pub fn new(pool: PgPool, spec: SchemaSpec) -> Self {
        let insert_sql = format!(
            "INSERT INTO {} (v, location) VALUES ($1, $2) RETURNING id",
            spec.table
        );
        Self {
            pool,
            spec,
            insert_sql,
        }
    }

    async fn check_pgvector_extension(&self) -> Result<(), StoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname::text FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(StoreError::ExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn table_exists(&self) -> Result<bool, StoreError> {
        let (oid,): (Option<String>,) = sqlx::query_as("SELECT to_regclass($1)::text")
            .bind(&self.spec.table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::PostgresError(e.to_string()))?;
        Ok(oid.is_some())
    }

    async fn verify_table(&self) -> Result<(), StoreError> {
        // pgvector stores the declared dimension as the column's type modifier.
        let typmod: Option<(i32,)> = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = to_regclass($1) AND attname = 'v' AND NOT attisdropped",
        )
        .bind(&self.spec.table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::PostgresError(e.to_string()))?;

        match typmod {
            None => Err(StoreError::SchemaMismatch(format!(
                "table {} has no vector column v",
                self.spec.table
            ))),
            Some((dim,)) if dim < 0 || dim as usize != self.spec.dimension => {
                Err(StoreError::SchemaMismatch(format!(
                    "table {} stores vectors of dimension {}, expected {}",
                    self.spec.table, dim, self.spec.dimension
                )))
            }
            Some(_) => Ok(()),
        }
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                v vector({}) NOT NULL,
                location TEXT NOT NULL
            )
            "#,
            self.spec.table, self.spec.dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::SchemaError(e.to_string()))?;
        Ok(())
    }

    async fn find_index(&self) -> Result<Option<IndexRow>, StoreError> {
        sqlx::query_as::<_, IndexRow>(
            r#"
            SELECT
                COALESCE(i.indrelid = to_regclass($2), false) AS on_table,
                am.amname::text AS method,
                opc.opcname::text AS opclass,
                c.reloptions::text[] AS options
            FROM pg_index i
            JOIN pg_class c ON c.oid = i.indexrelid
            JOIN pg_am am ON am.oid = c.relam
            JOIN pg_opclass opc ON opc.oid = i.indclass[0]
            WHERE c.relname = $1
            "#,
        )
        .bind(&self.spec.index)
        .bind(&self.spec.table)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::PostgresError(e.to_string()))
    }

    async fn create_index(&self) -> Result<(), StoreError> {
        let IndexParams {
            m, ef_construction, ..
        } = self.spec.params;
        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw (v {}) WITH (m = {}, ef_construction = {})",
            self.spec.index, self.spec.table, COSINE_OPCLASS, m, ef_construction
        );

        sqlx::query(&create_index)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::SchemaError(e.to_string()))?;
        Ok(())
    }
}

/// Compare an existing index against the expected method, metric and parameters.
fn verify_index(row: &IndexRow, spec: &SchemaSpec) -> Result<(), StoreError> {
    let mismatch = |what: String| {
        Err(StoreError::SchemaMismatch(format!(
            "index {} {}",
            spec.index, what
        )))
    };

    if !row.on_table {
        return mismatch(format!("exists but is not on table {}", spec.table));
    }
    if row.method != "hnsw" {
        return mismatch(format!("uses method {}, expected hnsw", row.method));
    }
    if row.opclass != COSINE_OPCLASS {
        return mismatch(format!(
            "uses operator class {}, expected {}",
            row.opclass, COSINE_OPCLASS
        ));
    }

    let options = parse_reloptions(row.options.as_deref().unwrap_or_default());
    let m = options.get("m").copied().unwrap_or(PGVECTOR_DEFAULT_M);
    let ef_construction = options
        .get("ef_construction")
        .copied()
        .unwrap_or(PGVECTOR_DEFAULT_EF_CONSTRUCTION);

    if m != spec.params.m || ef_construction != spec.params.ef_construction {
        return mismatch(format!(
            "was built with m={}, ef_construction={}; expected m={}, ef_construction={}",
            m, ef_construction, spec.params.m, spec.params.ef_construction
        ));
    }

    Ok(())
}

/// Parse `{"m=5","ef_construction=30"}` style storage options.
fn parse_reloptions(options: &[String]) -> HashMap<String, u32> {
    options
        .iter()
        .filter_map(|opt| {
            let (key, value) = opt.split_once('=')?;
            Some((key.trim().to_lowercase(), value.trim().parse().ok()?))
        })
        .collect()
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| StoreError::ConnectionError(e.to_string()))
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        self.check_pgvector_extension().await?;

        if self.table_exists().await? {
            self.verify_table().await?;
            debug!(table = %self.spec.table, "table already present");
        } else {
            self.create_table().await?;
            info!(table = %self.spec.table, dimension = self.spec.dimension, "created table");
        }

        match self.find_index().await? {
            Some(row) => {
                verify_index(&row, &self.spec)?;
                debug!(index = %self.spec.index, "index already present");
            }
            None => {
                self.create_index().await?;
                info!(
                    index = %self.spec.index,
                    m = self.spec.params.m,
                    ef_construction = self.spec.params.ef_construction,
                    "created hnsw index"
                );
            }
        }

        Ok(())
    }

    async fn insert(&self, location: &str, vector: &[f32]) -> Result<i64, StoreError> {
        self.spec.check_dimension(vector)?;

        // One connection per item, returned to the pool when `conn` drops.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        sqlx::query_scalar::<_, i64>(&self.insert_sql)
            .bind(Vector::from(vector.to_vec()))
            .bind(location)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| StoreError::InsertError(e.to_string()))
    }

    async fn count(&self) -> Result<Option<u64>, StoreError> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let query = format!("SELECT COUNT(*) FROM {}", self.spec.table);
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::PostgresError(e.to_string()))?;

        Ok(Some(count as u64))
    }

    fn spec(&self) -> &SchemaSpec {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SchemaSpec {
        SchemaSpec::from_config(&StoreConfig::default())
    }

    fn index_row(method: &str, opclass: &str, options: Option<&[&str]>) -> IndexRow {
        IndexRow {
            on_table: true,
            method: method.to_string(),
            opclass: opclass.to_string(),
            options: options.map(|o| o.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn test_parse_reloptions() {
        let options = parse_reloptions(&["m=5".to_string(), "ef_construction=30".to_string()]);
        assert_eq!(options.get("m"), Some(&5));
        assert_eq!(options.get("ef_construction"), Some(&30));
    }

    #[test]
    fn test_verify_matching_index() {
        let row = index_row("hnsw", COSINE_OPCLASS, Some(&["m=5", "ef_construction=30"]));
        assert!(verify_index(&row, &spec()).is_ok());
    }

    #[test]
    fn test_verify_rejects_other_metric() {
        let row = index_row("hnsw", "vector_l2_ops", Some(&["m=5", "ef_construction=30"]));
        assert!(matches!(
            verify_index(&row, &spec()),
            Err(StoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_verify_rejects_other_method() {
        let row = index_row("ivfflat", COSINE_OPCLASS, None);
        assert!(verify_index(&row, &spec()).is_err());
    }

    #[test]
    fn test_missing_options_fall_back_to_pgvector_defaults() {
        let row = index_row("hnsw", COSINE_OPCLASS, None);
        let err = verify_index(&row, &spec()).unwrap_err();
        assert!(err.to_string().contains("m=16"));
    }

    #[test]
    fn test_verify_rejects_index_on_other_table() {
        let mut row = index_row("hnsw", COSINE_OPCLASS, Some(&["m=5", "ef_construction=30"]));
        row.on_table = false;
        assert!(verify_index(&row, &spec()).is_err());
    }
}
