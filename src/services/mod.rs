pub mod batch;
pub mod embedding;
mod pipeline;
mod progress;
pub mod vector_store;
mod worker_pool;

pub use batch::{Batches, batch, batch_count};
pub use embedding::{Encoder, create_encoder};
pub use pipeline::{Pipeline, RunState};
pub use progress::{LogReporter, ProgressReporter};
pub use vector_store::{Backend, MemoryStore, PgVectorStore, SchemaSpec, VectorStore, create_backend};
pub use worker_pool::{BatchOutcome, InFlightBatch, WorkerPool, process_item};
