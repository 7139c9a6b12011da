use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter, mask_password};
use crate::models::{Config, EncoderDriver, OutputFormat, StoreDriver};
use crate::services::create_backend;

pub async fn handle_status(config: Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    let (store_connected, rows) = match create_backend(&config.store, 1).await {
        Ok(backend) => {
            let connected = backend.store.health_check().await.unwrap_or(false);
            let rows = if connected {
                backend.store.count().await.ok().flatten()
            } else {
                None
            };
            (connected, rows)
        }
        Err(_) => (false, None),
    };

    let encoder_target = match config.encoder.driver {
        EncoderDriver::Sql => format!("{}(path)", config.encoder.function),
        EncoderDriver::Http => config.encoder.url.clone(),
    };

    let status = StatusInfo {
        store_driver: config.store.driver.to_string(),
        store_url: mask_password(&config.store.url),
        store_connected,
        table: config.store.table.clone(),
        index: config.store.index.clone(),
        dimension: config.store.dimension,
        rows,
        encoder_driver: config.encoder.driver.to_string(),
        encoder_target,
    };

    print!("{}", formatter.format_status(&status));
    if format != OutputFormat::Text {
        println!();
    }

    if !store_connected && config.store.driver == StoreDriver::PostgreSQL {
        eprintln!();
        eprintln!("Warning: PostgreSQL not accessible. Check DATABASE_URL or store.url.");
    }

    Ok(())
}
