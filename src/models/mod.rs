mod config;
mod format;
mod item;
mod progress;

pub use config::{
    Config, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_DIMENSION, DEFAULT_INDEX,
    DEFAULT_TABLE, EncoderConfig, EncoderDriver, IndexParams, OutputConfig, PipelineConfig,
    SourceConfig, StoreConfig, StoreDriver, is_plain_identifier, is_sql_identifier,
};
pub use format::OutputFormat;
pub use item::{Batch, Item};
pub use progress::{ProgressRecord, RunStatus, RunSummary};
