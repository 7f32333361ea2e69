//! CLI command implementations

pub mod cache;
pub mod completions;
pub mod data;
pub mod metadata;
pub mod sources;
