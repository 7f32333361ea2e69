//! `rivapi metadata` command - download a source's site inventory

use std::path::PathBuf;

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::cli::helpers::build_agent;
use crate::clients::{make_client, MetadataQuery, Source, Variable};
use crate::core::table::WriteMode;

#[derive(Args, Debug)]
pub struct MetadataArgs {
    /// Data source to query
    #[arg(value_enum)]
    pub source: Source,

    /// Restrict the inventory to sites measuring this variable
    #[arg(long, value_enum)]
    pub variable: Option<Variable>,

    /// US state postal code to include (USGS only; repeatable, default all)
    #[arg(long = "state")]
    pub states: Vec<String>,

    /// Output CSV path [default: <source>-metadata.csv]
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Replace the output file if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

pub fn run(args: MetadataArgs, global: &GlobalOpts) -> Result<()> {
    if !args.states.is_empty() && args.source != Source::Usgs {
        return Err(miette::miette!(
            "--state only applies to usgs; {} inventories are not split by state",
            args.source
        ));
    }

    let agent = build_agent(global)?;
    let client = make_client(args.source);

    let query = MetadataQuery {
        variable: args.variable,
        states: args.states,
    };
    let metadata = client
        .fetch_metadata(&agent, &query, global.quiet)
        .into_diagnostic()?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}-metadata.csv", args.source)));
    let mode = if args.overwrite {
        WriteMode::Overwrite
    } else {
        WriteMode::Create
    };
    metadata.write_csv_mode(&output, mode).into_diagnostic()?;

    if !global.quiet {
        println!(
            "{} Wrote {} site(s) to {}",
            style("✓").green(),
            metadata.len(),
            output.display()
        );
    }

    Ok(())
}
