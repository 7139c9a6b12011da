//! Run command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::output::get_formatter;
use crate::cli::progress::ConsoleReporter;
use crate::models::{Config, EncoderDriver, OutputFormat, RunStatus, StoreDriver};
use crate::services::{Pipeline, create_backend, create_encoder};
use crate::sources::LocalDirectory;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory containing the images (defaults to source.directory from the config)
    pub directory: Option<PathBuf>,

    /// Items per batch
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Items processed concurrently within a batch
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Skip batches before this index
    #[arg(long)]
    pub resume_from_batch: Option<usize>,

    /// Only load files with these extensions (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// File patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Vector store driver: postgresql or memory (memory needs --encoder http)
    #[arg(long)]
    pub store: Option<StoreDriver>,

    /// Encoder driver: sql or http
    #[arg(long)]
    pub encoder: Option<EncoderDriver>,

    /// Embedding server URL for the http encoder
    #[arg(long)]
    pub embedding_url: Option<String>,

    /// Attempts per item on transient encoder errors
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

impl RunArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.directory {
            config.source.directory = Some(dir.clone());
        }
        if let Some(n) = self.batch_size {
            config.pipeline.batch_size = n;
        }
        if let Some(n) = self.concurrency {
            config.pipeline.concurrency = n;
        }
        if let Some(n) = self.resume_from_batch {
            config.pipeline.resume_from_batch = n;
        }
        if !self.extensions.is_empty() {
            config.source.extensions = self.extensions.clone();
        }
        config.source.exclude_patterns.extend(self.exclude.iter().cloned());
        if let Some(url) = &self.database_url {
            config.store.url = url.clone();
        }
        if let Some(driver) = self.store {
            config.store.driver = driver;
        }
        if let Some(driver) = self.encoder {
            config.encoder.driver = driver;
        }
        if let Some(url) = &self.embedding_url {
            config.encoder.url = url.clone();
        }
        if let Some(n) = self.max_attempts {
            config.encoder.max_attempts = n;
        }
    }
}

pub async fn handle_run(
    args: RunArgs,
    mut config: Config,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<RunStatus> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let directory = config
        .source
        .directory
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no image directory given and source.directory is not set"))?;
    let source = LocalDirectory::from_config(&directory, &config.source)?;

    let backend = create_backend(&config.store, config.pipeline.concurrency)
        .await
        .with_context(|| format!("failed to open {} vector store", config.store.driver))?;
    let encoder = create_encoder(&config.encoder, backend.pool.clone())
        .context("failed to create encoder")?;

    if config.store.driver == StoreDriver::Memory {
        warn!("memory store selected: vectors are discarded when the run ends");
    }

    let reporter = Arc::new(ConsoleReporter::new(format, !verbose));
    let mut pipeline = Pipeline::new(
        config.pipeline.clone(),
        source,
        encoder,
        backend.store,
        reporter.clone(),
    )?
    .with_cancellation(cancel);

    let result = pipeline.run().await;
    reporter.finish();
    let summary = result.with_context(|| format!("ingestion of {} failed", directory.display()))?;

    let formatter = get_formatter(format);
    print!("{}", formatter.format_summary(&summary));
    if format != OutputFormat::Text {
        println!();
    }

    Ok(summary.status)
}
