//! Shared helper functions for CLI commands
//!
//! This module contains utility functions that are used across multiple
//! command modules to avoid code duplication.

use miette::{IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::core::cache::HttpCache;
use crate::core::{Config, HttpAgent};

/// Load the layered configuration, applying command-line overrides last
pub fn load_config(global: &GlobalOpts) -> Config {
    let mut config = Config::load();
    if global.rate_limit.is_some() {
        config.rate_limit = global.rate_limit;
    }
    if global.retries.is_some() {
        config.retries = global.retries;
    }
    if global.backoff.is_some() {
        config.backoff = global.backoff;
    }
    config
}

/// Build the HTTP agent, attaching the response cache unless disabled
pub fn build_agent(global: &GlobalOpts) -> Result<HttpAgent> {
    let config = load_config(global);
    let cache = if global.no_cache {
        None
    } else {
        Some(HttpCache::open().into_diagnostic()?)
    };
    HttpAgent::new(&config, cache).into_diagnostic()
}
