//! rivapi: river data retrieval
//!
//! Download site metadata and river discharge/stage observations from
//! national hydrology services (USGS NWIS, Australian BOM, French
//! Eaufrance Hub'Eau) as tidy CSV files.

pub mod cli;
pub mod clients;
pub mod core;

pub use clients::{
    fetch_data, make_client, Client, ClientError, DataQuery, FetchOptions, Frequency,
    MetadataQuery, Source, Statistic, Variable,
};
pub use crate::core::{Config, HttpAgent, HttpCache, Table};
