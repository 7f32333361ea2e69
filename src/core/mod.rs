//! Core module - fundamental types and utilities

pub mod cache;
pub mod config;
pub mod http;
pub mod sites;
pub mod table;
pub mod time;

pub use cache::{CacheError, CacheStats, HttpCache};
pub use config::Config;
pub use http::{HttpAgent, HttpError};
pub use table::{Table, TableError, WriteMode};
pub use time::{parse_time, validate_range, TimeError};
