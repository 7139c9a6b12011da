//! CLI module for the image loader.

pub mod commands;
pub mod output;
pub mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Embed a directory of images into a pgvector table with an HNSW cosine index.
#[derive(Debug, Parser)]
#[command(name = "imload")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "IMLOAD_CONFIG",
        help = "Path to a TOML config file"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed every image in a directory and store the vectors
    Run(commands::RunArgs),

    /// Create the table and HNSW index without loading anything
    Init(commands::InitArgs),

    /// Check the vector store and encoder settings
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
