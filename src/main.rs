use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use imload::cli::commands::{handle_config, handle_init, handle_run, handle_status};
use imload::cli::{Cli, Commands};
use imload::models::{Config, OutputFormat, RunStatus};

/// Exit code for a run stopped by SIGINT/SIGTERM.
const EXIT_CANCELLED: u8 = 130;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "imload=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let format = cli.format.unwrap_or(config.output.default_format);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("received shutdown signal, finishing the current batch");
            cancel.cancel();
        }
    });

    match run_command(cli, config, format, cancel).await {
        Ok(RunStatus::Completed) => ExitCode::SUCCESS,
        Ok(RunStatus::Cancelled) => ExitCode::from(EXIT_CANCELLED),
        Err(e) => {
            eprint!(
                "{}",
                imload::cli::output::get_formatter(format).format_error(&format!("{e:#}"))
            );
            if format != OutputFormat::Text {
                eprintln!();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_command(
    cli: Cli,
    config: Config,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<RunStatus> {
    match cli.command {
        Commands::Run(args) => handle_run(args, config, format, cli.verbose, cancel).await,
        Commands::Init(args) => {
            handle_init(args, config, format).await?;
            Ok(RunStatus::Completed)
        }
        Commands::Status => {
            handle_status(config, format).await?;
            Ok(RunStatus::Completed)
        }
        Commands::Config(cmd) => {
            handle_config(cmd, config, cli.config, format).await?;
            Ok(RunStatus::Completed)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
