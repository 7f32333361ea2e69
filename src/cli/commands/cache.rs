//! `rivapi cache` command - Manage the HTTP response cache
//!
//! The cache is a local SQLite database holding raw API responses so
//! repeated downloads do not hit the upstream services. It is
//! user-local and can always be deleted safely.

use clap::Subcommand;
use console::style;
use dialoguer::Confirm;
use miette::{IntoDiagnostic, Result};

use crate::core::cache::{remove_default_cache, HttpCache};

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,

    /// Delete the cache completely
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub fn run(cmd: CacheCommands) -> Result<()> {
    match cmd {
        CacheCommands::Status => run_status(),
        CacheCommands::Clear { yes } => run_clear(yes),
    }
}

fn run_status() -> Result<()> {
    let cache = HttpCache::open().into_diagnostic()?;
    let stats = cache.statistics().into_diagnostic()?;

    println!("{}", style("Cache Status").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("  Location:      {}", cache.path().display());
    println!("  Total entries: {}", style(stats.total_entries).cyan());
    println!(
        "  Database size: {} KB",
        style(stats.db_size_bytes / 1024).cyan()
    );
    if let Some(oldest) = stats.oldest_entry {
        println!(
            "  Oldest entry:  {}",
            style(oldest.format("%Y-%m-%d %H:%M:%S UTC")).cyan()
        );
    }

    Ok(())
}

fn run_clear(yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt("Delete the HTTP response cache?")
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    if remove_default_cache().into_diagnostic()? {
        println!("{} Cache cleared", style("✓").green());
    } else {
        println!("No cache to clear");
    }

    Ok(())
}
