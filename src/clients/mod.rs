//! Source clients for the supported hydrology services
//!
//! Each national service has its own client implementing [`Client`].
//! Clients translate the shared vocabulary (variable, frequency,
//! statistic) into source-specific codes, fetch site metadata tables,
//! and fetch per-site observation tables. The multi-site download loop
//! lives here so progress reporting and file writing behave the same
//! for every source.

pub mod bom;
pub mod eaufrance;
pub mod usgs;

pub use bom::BomClient;
pub use eaufrance::EaufranceClient;
pub use usgs::UsgsClient;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::core::http::{HttpAgent, HttpError};
use crate::core::table::{self, Table, TableError, WriteMode};
use crate::core::time::{validate_range, TimeError};

/// A supported data source
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// USGS National Water Information System (United States)
    Usgs,
    /// Bureau of Meteorology Water Data Online (Australia)
    Bom,
    /// Eaufrance Hub'Eau hydrometrie (France)
    Eaufrance,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Usgs, Source::Bom, Source::Eaufrance];
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Usgs => write!(f, "usgs"),
            Source::Bom => write!(f, "bom"),
            Source::Eaufrance => write!(f, "eaufrance"),
        }
    }
}

impl std::error::Error for Source {}

/// An observed quantity
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Variable {
    #[default]
    Discharge,
    Stage,
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variable::Discharge => write!(f, "discharge"),
            Variable::Stage => write!(f, "stage"),
        }
    }
}

/// Sampling frequency of the requested series
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Frequency {
    #[default]
    Daily,
    Instantaneous,
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Instantaneous => write!(f, "instantaneous"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

/// Aggregation statistic for elaborated series
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Maximum,
    Minimum,
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statistic::Mean => write!(f, "mean"),
            Statistic::Maximum => write!(f, "maximum"),
            Statistic::Minimum => write!(f, "minimum"),
        }
    }
}

/// Errors that can occur during client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} '{name}' is not available from {source}. Valid values: {valid}")]
    Unsupported {
        kind: &'static str,
        name: String,
        source: Source,
        valid: String,
    },

    #[error("state code(s) {codes} not recognised")]
    StateCode { codes: String },

    #[error("statistics are not selectable for {source}; each service returns its published statistic")]
    NoStatistics { source: Source },

    #[error("stage is only available as a maximum instantaneous value from the Eaufrance API")]
    StageStatistic,

    #[error("no sites provided. Pass --site, --site-file or --sites-from-metadata.")]
    NoSites,

    #[error("start and end times are required for {source}")]
    MissingTimeRange { source: Source },

    #[error("query parameter '{name}' is not available for endpoint '{endpoint}'")]
    UnknownParameter { name: String, endpoint: String },

    #[error("request matches {count} records, exceeding the API limit of {limit}. Use filters to reduce the number of records.")]
    RecordLimit { count: i64, limit: i64 },

    #[error("{source} API error: {message}")]
    Api { source: Source, message: String },

    #[error("unexpected response from {source}: {message}")]
    Malformed { source: Source, message: String },

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Helper for building the standard unsupported-value error
pub(crate) fn unsupported(
    source: Source,
    kind: &'static str,
    name: impl std::fmt::Display,
    valid: &[&str],
) -> ClientError {
    ClientError::Unsupported {
        kind,
        name: name.to_string(),
        source,
        valid: valid.join(", "),
    }
}

/// A data request in the shared vocabulary, before source translation
#[derive(Debug, Clone, Default)]
pub struct DataQuery {
    pub variable: Variable,
    pub frequency: Frequency,
    pub statistic: Option<Statistic>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A data request translated into one source's codes
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub variable: String,
    pub frequency: Option<String>,
    pub statistic: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Metadata request options
#[derive(Debug, Clone, Default)]
pub struct MetadataQuery {
    /// Restrict the inventory to sites measuring this variable
    pub variable: Option<Variable>,
    /// US state codes to include (USGS only; empty means all states)
    pub states: Vec<String>,
}

/// A hydrology service client
pub trait Client {
    fn source(&self) -> Source;

    /// Name of the site-ID column in this source's metadata tables
    fn site_column(&self) -> &'static str;

    fn variable_code(&self, variable: Variable) -> Result<String, ClientError>;

    fn frequency_code(&self, frequency: Frequency) -> Result<Option<String>, ClientError>;

    fn statistic_code(&self, statistic: Statistic) -> Result<Option<String>, ClientError>;

    /// Translate a query into this source's codes, validating the
    /// combination. The default translates each field independently.
    fn resolve_query(&self, query: &DataQuery) -> Result<ResolvedQuery, ClientError> {
        validate_range(query.start, query.end)?;
        Ok(ResolvedQuery {
            variable: self.variable_code(query.variable)?,
            frequency: self.frequency_code(query.frequency)?,
            statistic: match query.statistic {
                Some(s) => self.statistic_code(s)?,
                None => None,
            },
            start: query.start,
            end: query.end,
        })
    }

    /// Download the site metadata table for this source
    fn fetch_metadata(
        &self,
        http: &HttpAgent,
        query: &MetadataQuery,
        quiet: bool,
    ) -> Result<Table, ClientError>;

    /// Download observations for a single site.
    ///
    /// Returns None when the source has no data for the query, e.g. a
    /// station that was closed before the requested window.
    fn fetch_site_data(
        &self,
        http: &HttpAgent,
        site: &str,
        query: &ResolvedQuery,
        metadata: Option<&Table>,
    ) -> Result<Option<Table>, ClientError>;
}

/// Build the client for a source
pub fn make_client(source: Source) -> Box<dyn Client> {
    match source {
        Source::Usgs => Box::new(UsgsClient),
        Source::Bom => Box::new(BomClient),
        Source::Eaufrance => Box::new(EaufranceClient),
    }
}

/// Options for the multi-site download loop
#[derive(Debug, Default)]
pub struct FetchOptions {
    pub sites: Vec<String>,
    pub query: DataQuery,
    pub metadata: Option<Table>,
    /// Write each site's table to `<output_dir>/<site>.csv` when set
    pub output_dir: Option<PathBuf>,
    pub mode: WriteMode,
    pub quiet: bool,
}

/// Download data for every site, with a progress bar.
///
/// Sites the source has no data for are omitted from the result map.
pub fn fetch_data(
    client: &dyn Client,
    http: &HttpAgent,
    opts: &FetchOptions,
) -> Result<BTreeMap<String, Table>, ClientError> {
    if opts.sites.is_empty() {
        return Err(ClientError::NoSites);
    }
    let resolved = client.resolve_query(&opts.query)?;

    let pb = progress_bar(
        opts.sites.len() as u64,
        &format!("Downloading data for {} site(s)", opts.sites.len()),
        opts.quiet,
    );

    let mut results = BTreeMap::new();
    for site in &opts.sites {
        let data = client.fetch_site_data(http, site, &resolved, opts.metadata.as_ref())?;
        if let Some(data) = data {
            if let Some(dir) = &opts.output_dir {
                table::write_site_data(dir, site, &data, opts.mode)?;
            }
            results.insert(site.clone(), data);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(results)
}

/// Progress bar in the house style; hidden when quiet
pub(crate) fn progress_bar(total: u64, message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("progress template is valid")
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb
}

/// Render a scalar JSON value as a cell string
pub(crate) fn json_scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
