//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand};

use crate::cli::commands::{
    cache::CacheCommands, completions::CompletionsArgs, data::DataArgs, metadata::MetadataArgs,
};

#[derive(Parser)]
#[command(name = "rivapi")]
#[command(author, version, about = "Retrieve river data from national hydrology services")]
#[command(
    long_about = "Download site metadata and river discharge/stage observations from the USGS \
National Water Information System, the Australian Bureau of Meteorology and the French \
Eaufrance Hub'Eau API, writing tidy CSV files."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct GlobalOpts {
    /// Maximum HTTP requests per second
    #[arg(long, global = true)]
    pub rate_limit: Option<f64>,

    /// Maximum attempts per request
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Initial retry backoff in seconds (doubled per attempt)
    #[arg(long, global = true)]
    pub backoff: Option<f64>,

    /// Bypass the HTTP response cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a source's site inventory to a CSV file
    Metadata(MetadataArgs),

    /// Download observations for one or more sites
    Data(DataArgs),

    /// List the supported sources and what each one offers
    Sources,

    /// Manage the HTTP response cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}
