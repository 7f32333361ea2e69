//! `rivapi data` command - download observations for a list of sites
//!
//! Sites can be named directly, read from a file, or taken from a
//! previously downloaded metadata CSV. Each site's observations are
//! written to `<output-dir>/<site>.csv`.

use std::path::PathBuf;

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::cli::helpers::build_agent;
use crate::clients::{
    fetch_data, make_client, DataQuery, FetchOptions, Frequency, Source, Statistic, Variable,
};
use crate::core::sites::{merge_sites, parse_site_arg, read_site_file, sites_from_metadata};
use crate::core::table::{Table, WriteMode};
use crate::core::time::parse_time;

#[derive(Args, Debug)]
pub struct DataArgs {
    /// Data source to query
    #[arg(value_enum)]
    pub source: Source,

    /// Comma-separated site IDs
    #[arg(long)]
    pub site: Option<String>,

    /// File containing one site ID per line
    #[arg(long)]
    pub site_file: Option<PathBuf>,

    /// Take site IDs from the metadata file's site column
    #[arg(long, requires = "metadata_file")]
    pub sites_from_metadata: bool,

    /// Metadata CSV written by `rivapi metadata`
    #[arg(long)]
    pub metadata_file: Option<PathBuf>,

    /// Observed quantity to download
    #[arg(long, value_enum, default_value_t)]
    pub variable: Variable,

    /// Sampling frequency of the requested series
    #[arg(long, value_enum, default_value_t)]
    pub frequency: Frequency,

    /// Aggregation statistic (where the source supports one)
    #[arg(long, value_enum)]
    pub statistic: Option<Statistic>,

    /// Start of the requested window (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub start: Option<String>,

    /// End of the requested window (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub end: Option<String>,

    /// Directory for per-site CSV files
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Replace existing per-site files
    #[arg(long)]
    pub overwrite: bool,

    /// Append rows to existing per-site files
    #[arg(long, conflicts_with = "overwrite")]
    pub append: bool,
}

pub fn run(args: DataArgs, global: &GlobalOpts) -> Result<()> {
    let agent = build_agent(global)?;
    let client = make_client(args.source);

    let metadata = args
        .metadata_file
        .as_deref()
        .map(Table::from_csv_path)
        .transpose()
        .into_diagnostic()?;

    let mut lists = Vec::new();
    if let Some(arg) = &args.site {
        lists.push(parse_site_arg(arg));
    }
    if let Some(path) = &args.site_file {
        lists.push(read_site_file(path).into_diagnostic()?);
    }
    if args.sites_from_metadata {
        let meta = metadata
            .as_ref()
            .ok_or_else(|| miette::miette!("--sites-from-metadata requires --metadata-file"))?;
        let sites = sites_from_metadata(meta, client.site_column()).ok_or_else(|| {
            miette::miette!(
                "metadata file has no '{}' column; was it written for {}?",
                client.site_column(),
                args.source
            )
        })?;
        lists.push(sites);
    }

    let query = DataQuery {
        variable: args.variable,
        frequency: args.frequency,
        statistic: args.statistic,
        start: args
            .start
            .as_deref()
            .map(parse_time)
            .transpose()
            .into_diagnostic()?,
        end: args
            .end
            .as_deref()
            .map(parse_time)
            .transpose()
            .into_diagnostic()?,
    };

    let mode = if args.overwrite {
        WriteMode::Overwrite
    } else if args.append {
        WriteMode::Append
    } else {
        WriteMode::Create
    };

    let opts = FetchOptions {
        sites: merge_sites(lists),
        query,
        metadata,
        output_dir: Some(args.output_dir.clone()),
        mode,
        quiet: global.quiet,
    };
    let results = fetch_data(client.as_ref(), &agent, &opts).into_diagnostic()?;

    if !global.quiet {
        println!(
            "{} Downloaded data for {} of {} site(s) to {}",
            style("✓").green(),
            results.len(),
            opts.sites.len(),
            args.output_dir.display()
        );
        if global.verbose {
            for site in opts.sites.iter().filter(|s| !results.contains_key(*s)) {
                println!("  {} no data for {}", style("→").blue(), site);
            }
        }
    }

    Ok(())
}
