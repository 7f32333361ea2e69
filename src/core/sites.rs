//! Site list assembly
//!
//! Sites can come from three places: a comma-separated CLI value, a text
//! file with one site ID per line, and the site-ID column of a metadata
//! table. The merged list is deduplicated preserving first-seen order.

use std::collections::HashSet;
use std::path::Path;

use crate::core::table::Table;

/// Split a comma-separated site argument into trimmed, non-empty IDs
pub fn parse_site_arg(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Read site IDs from a file, one per line, skipping blank lines
pub fn read_site_file(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

/// Site IDs from a metadata table's site column.
///
/// Returns None if the column is absent; callers decide whether that is
/// an error.
pub fn sites_from_metadata(metadata: &Table, site_column: &str) -> Option<Vec<String>> {
    metadata
        .column_values(site_column)
        .map(|values| values.into_iter().map(String::from).collect())
}

/// Merge site lists, deduplicating while preserving first-seen order
pub fn merge_sites<I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for site in list {
            if seen.insert(site.clone()) {
                merged.push(site);
            }
        }
    }
    merged
}
