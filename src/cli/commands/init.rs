use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, StoreDriver};
use crate::services::create_backend;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Vector store driver: postgresql or memory
    #[arg(long)]
    pub store: Option<StoreDriver>,
}

pub async fn handle_init(args: InitArgs, mut config: Config, format: OutputFormat) -> Result<()> {
    if let Some(url) = args.database_url {
        config.store.url = url;
    }
    if let Some(driver) = args.store {
        config.store.driver = driver;
    }
    config.validate().context("invalid configuration")?;

    let formatter = get_formatter(format);
    let backend = create_backend(&config.store, 1)
        .await
        .with_context(|| format!("failed to open {} vector store", config.store.driver))?;
    backend
        .store
        .initialize_schema()
        .await
        .context("failed to initialize schema")?;

    let spec = backend.store.spec();
    println!(
        "{}",
        formatter.format_message(&format!(
            "Schema ready: table {} (vector({})), index {} (hnsw, vector_cosine_ops, m={}, ef_construction={})",
            spec.table, spec.dimension, spec.index, spec.params.m, spec.params.ef_construction
        ))
    );
    Ok(())
}
