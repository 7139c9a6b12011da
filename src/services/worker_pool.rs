//! Bounded fan-out of encode + insert over the items of one batch.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, warn};

use crate::error::{ItemError, PoolError};
use crate::models::{Batch, Item};
use crate::services::embedding::Encoder;
use crate::services::vector_store::VectorStore;

/// Per-batch result. Failed items are listed; successful ones are only counted.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: u64,
    pub failures: Vec<ItemError>,
}

impl BatchOutcome {
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }
}

enum WorkerError {
    Item(ItemError),
    PoolClosed,
}

/// Runs up to `concurrency` items at a time. Batches go through one at a time.
pub struct WorkerPool {
    encoder: Arc<dyn Encoder>,
    store: Arc<dyn VectorStore>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

/// Items of one batch that have been handed to workers.
pub struct InFlightBatch {
    tasks: JoinSet<Result<i64, WorkerError>>,
    identifiers: HashMap<task::Id, String>,
}

impl WorkerPool {
    pub fn new(encoder: Arc<dyn Encoder>, store: Arc<dyn VectorStore>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            encoder,
            store,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Stop handing out worker slots. Items still waiting for a slot fail the batch.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Spawn one task per item. Each task waits for a free slot before doing any work.
    pub fn dispatch(&self, batch: Batch) -> InFlightBatch {
        let mut tasks = JoinSet::new();
        let mut identifiers = HashMap::with_capacity(batch.len());

        for item in batch.items {
            let identifier = item.location();
            let encoder = Arc::clone(&self.encoder);
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&self.permits);

            let handle = tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| WorkerError::PoolClosed)?;
                process_item(encoder.as_ref(), store.as_ref(), &item)
                    .await
                    .map_err(WorkerError::Item)
            });
            identifiers.insert(handle.id(), identifier);
        }

        InFlightBatch { tasks, identifiers }
    }

    /// Dispatch and wait for every item of `batch`.
    pub async fn run(&self, batch: Batch) -> Result<BatchOutcome, PoolError> {
        self.dispatch(batch).collect().await
    }
}

impl InFlightBatch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Join barrier: returns once every item has finished, one way or another.
    pub async fn collect(mut self) -> Result<BatchOutcome, PoolError> {
        let mut outcome = BatchOutcome::default();
        let mut exhausted: Option<String> = None;

        while let Some(joined) = self.tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(id))) => {
                    outcome.succeeded += 1;
                    debug!(id, "item stored");
                }
                Ok((_, Err(WorkerError::Item(e)))) => {
                    warn!(item = e.identifier(), error = %e, "item failed");
                    outcome.failures.push(e);
                }
                Ok((_, Err(WorkerError::PoolClosed))) => {
                    if exhausted.is_none() {
                        exhausted = Some("no worker slots available: pool closed".to_string());
                        self.tasks.abort_all();
                    }
                }
                Err(e) if e.is_panic() => {
                    let identifier = self.identifiers.remove(&e.id()).unwrap_or_default();
                    warn!(item = %identifier, "worker panicked");
                    outcome.failures.push(ItemError::Panicked { identifier });
                }
                Err(_) => {
                    // Cancelled by the runtime, or by `abort_all` above.
                    if exhausted.is_none() {
                        exhausted = Some("worker task cancelled by the runtime".to_string());
                        self.tasks.abort_all();
                    }
                }
            }
        }

        match exhausted {
            Some(reason) => Err(PoolError::ResourceExhaustion(reason)),
            None => Ok(outcome),
        }
    }
}

/// Encode one item and store its vector.
pub async fn process_item(
    encoder: &dyn Encoder,
    store: &dyn VectorStore,
    item: &Item,
) -> Result<i64, ItemError> {
    let vector = encoder
        .encode(item.path())
        .await
        .map_err(|cause| ItemError::EncodingFailed {
            identifier: item.location(),
            cause,
        })?;

    let location = item.location();
    store
        .insert(&location, &vector)
        .await
        .map_err(|cause| ItemError::WriteFailed { location, cause })
}
