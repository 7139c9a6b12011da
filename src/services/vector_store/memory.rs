use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{SchemaSpec, StoredRecord, VectorStore};
use crate::error::StoreError;
use crate::models::IndexParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableMeta {
    dimension: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexMeta {
    params: IndexParams,
}

#[derive(Debug, Default)]
struct State {
    table: Option<TableMeta>,
    index: Option<IndexMeta>,
    rows: Vec<StoredRecord>,
    insert_attempts: u64,
}

/// Process-local store with the same contract as the PostgreSQL backend.
///
/// Handles made with [`MemoryStore::with_spec`] share rows and schema, which models
/// two runs with different settings pointing at one database.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    spec: SchemaSpec,
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new(spec: SchemaSpec) -> Self {
        Self {
            spec,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Another handle on the same data, expecting a different schema.
    pub fn with_spec(&self, spec: SchemaSpec) -> Self {
        Self {
            spec,
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Rows are appended whole, so a poisoned lock still holds consistent data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.lock().rows.clone()
    }

    /// Number of `insert` calls, successful or not.
    pub fn insert_attempts(&self) -> u64 {
        self.lock().insert_attempts
    }

    pub fn table_count(&self) -> usize {
        usize::from(self.lock().table.is_some())
    }

    pub fn index_count(&self) -> usize {
        usize::from(self.lock().index.is_some())
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        let (table, index) = (state.table, state.index);

        match table {
            Some(table) if table.dimension != self.spec.dimension => {
                return Err(StoreError::SchemaMismatch(format!(
                    "table {} stores vectors of dimension {}, expected {}",
                    self.spec.table, table.dimension, self.spec.dimension
                )));
            }
            Some(_) => {}
            None => {
                state.table = Some(TableMeta {
                    dimension: self.spec.dimension,
                });
            }
        }

        match index {
            Some(index) if index.params.m != self.spec.params.m
                || index.params.ef_construction != self.spec.params.ef_construction =>
            {
                return Err(StoreError::SchemaMismatch(format!(
                    "index {} was built with m={}, ef_construction={}",
                    self.spec.index, index.params.m, index.params.ef_construction
                )));
            }
            Some(_) => {}
            None => {
                state.index = Some(IndexMeta {
                    params: self.spec.params,
                });
            }
        }

        Ok(())
    }

    async fn insert(&self, location: &str, vector: &[f32]) -> Result<i64, StoreError> {
        let mut state = self.lock();
        state.insert_attempts += 1;

        let Some(table) = state.table else {
            return Err(StoreError::InsertError(format!(
                "relation \"{}\" does not exist",
                self.spec.table
            )));
        };
        if vector.len() != table.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: table.dimension,
                got: vector.len(),
            });
        }

        let id = state.rows.len() as i64 + 1;
        state.rows.push(StoredRecord {
            id,
            location: location.to_string(),
            vector: vector.to_vec(),
        });
        Ok(id)
    }

    async fn count(&self) -> Result<Option<u64>, StoreError> {
        let state = self.lock();
        Ok(state.table.map(|_| state.rows.len() as u64))
    }

    fn spec(&self) -> &SchemaSpec {
        &self.spec
    }
}
