use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{get_formatter, mask_password};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path {
        #[arg(long, help = "Show all possible config paths")]
        all: bool,
    },
}

/// `explicit` is the `--config` path, if one was given.
pub async fn handle_config(
    cmd: ConfigCommand,
    config: Config,
    explicit: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(explicit, force, format),
        ConfigCommand::Show => handle_show(config, format),
        ConfigCommand::Path { all } => handle_path(explicit.as_deref(), all),
    }
}

fn target_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    explicit
        .or_else(Config::config_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(explicit: Option<PathBuf>, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let path = target_path(explicit)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(mut config: Config, format: OutputFormat) -> Result<()> {
    config.store.url = mask_password(&config.store.url);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

fn handle_path(explicit: Option<&Path>, show_all: bool) -> Result<()> {
    println!("Configuration paths:");
    println!();

    if let Some(path) = explicit {
        println!("Explicit config (active): {}", path.display());
    }

    if let Some(path) = Config::config_path() {
        if path.exists() && explicit.is_none() {
            println!("User config (active): {}", path.display());
        } else if show_all {
            println!("User config (would be): {}", path.display());
        }
    }

    if show_all && let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        } else {
            println!(".env file (would be): {}", env_path.display());
        }
    }

    Ok(())
}
