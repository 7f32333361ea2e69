//! Column-oriented tables for site metadata and observation records
//!
//! Every source returns tabular data with its own column vocabulary, so
//! tables are kept generic: named columns plus string rows. CSV is the
//! interchange format for both metadata files and per-site data files.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur reading or writing tables
#[derive(Debug, Error)]
pub enum TableError {
    #[error("row has {got} values but the table has {expected} columns")]
    RowArity { expected: usize, got: usize },

    #[error("table is missing required column '{column}'")]
    ColumnMissing { column: String },

    #[error("{path} already exists. Pass --overwrite or --append.")]
    FileExists { path: PathBuf },

    #[error("tables have mismatched columns and cannot be concatenated")]
    ConcatMismatch,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to handle an existing file when writing data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Error if the file already exists
    #[default]
    Create,
    /// Rewrite the file, header included
    Overwrite,
    /// Append rows without repeating the header
    Append,
}

/// A generic table: named columns and string-valued rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, checking it matches the column count
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowArity {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a named column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a named column, erroring if absent
    pub fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column_index(name).ok_or_else(|| TableError::ColumnMissing {
            column: name.to_string(),
        })
    }

    /// All values of a named column, in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Value at (row, column name)
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// First row whose named column equals `value`
    pub fn find_row(&self, column: &str, value: &str) -> Option<&[String]> {
        let idx = self.column_index(column)?;
        self.rows
            .iter()
            .find(|r| r[idx] == value)
            .map(|r| r.as_slice())
    }

    /// Concatenate tables sharing a column set; later tables must match
    /// the first table's columns exactly.
    pub fn concat<I>(tables: I) -> Result<Table, TableError>
    where
        I: IntoIterator<Item = Table>,
    {
        let mut iter = tables.into_iter();
        let mut out = match iter.next() {
            Some(t) => t,
            None => return Ok(Table::default()),
        };
        for table in iter {
            if table.columns != out.columns {
                return Err(TableError::ConcatMismatch);
            }
            out.rows.extend(table.rows);
        }
        Ok(out)
    }

    /// Read a table from a CSV file (first record is the header)
    pub fn from_csv_path(path: &Path) -> Result<Table, TableError> {
        let mut reader = csv::Reader::from_path(path)?;
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter().map(|s| s.to_string()).collect())?;
        }
        Ok(table)
    }

    /// Write the table to a CSV file, header first
    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the table to `path` honoring the write mode.
    ///
    /// Append mode writes rows only; the header is assumed to be present
    /// from the initial write.
    pub fn write_csv_mode(&self, path: &Path, mode: WriteMode) -> Result<(), TableError> {
        let exists = path.exists();
        match mode {
            WriteMode::Create if exists => Err(TableError::FileExists {
                path: path.to_path_buf(),
            }),
            WriteMode::Append if exists => {
                let file = OpenOptions::new().append(true).open(path)?;
                let mut writer = csv::WriterBuilder::new().from_writer(file);
                for row in &self.rows {
                    writer.write_record(row)?;
                }
                writer.flush()?;
                Ok(())
            }
            // Fresh file, or overwrite requested
            _ => self.write_csv(path),
        }
    }
}

/// Write one site's observations to `<output_dir>/<site>.csv`
pub fn write_site_data(
    output_dir: &Path,
    site: &str,
    table: &Table,
    mode: WriteMode,
) -> Result<PathBuf, TableError> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{site}.csv"));
    table.write_csv_mode(&path, mode)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Table {
        let mut t = Table::new(["site_no", "value"]);
        t.push_row(vec!["01646500".into(), "120.0".into()]).unwrap();
        t.push_row(vec!["01647000".into(), "35.5".into()]).unwrap();
        t
    }

    #[test]
    fn test_push_row_arity_checked() {
        let mut t = Table::new(["a", "b"]);
        let err = t.push_row(vec!["only one".into()]).unwrap_err();
        assert!(matches!(err, TableError::RowArity { expected: 2, got: 1 }));
    }

    #[test]
    fn test_require_column() {
        let t = sample();
        assert_eq!(t.require_column("site_no").unwrap(), 0);
        let err = t.require_column("station_no").unwrap_err();
        assert!(matches!(err, TableError::ColumnMissing { .. }));
    }

    #[test]
    fn test_find_row() {
        let t = sample();
        let row = t.find_row("site_no", "01647000").unwrap();
        assert_eq!(row[1], "35.5");
        assert!(t.find_row("site_no", "nope").is_none());
    }

    #[test]
    fn test_csv_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("meta.csv");
        let t = sample();
        t.write_csv(&path).unwrap();

        let loaded = Table::from_csv_path(&path).unwrap();
        assert_eq!(loaded, t);
    }

    #[test]
    fn test_write_mode_create_refuses_existing() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("site.csv");
        let t = sample();
        t.write_csv_mode(&path, WriteMode::Create).unwrap();

        let err = t.write_csv_mode(&path, WriteMode::Create).unwrap_err();
        assert!(matches!(err, TableError::FileExists { .. }));
    }

    #[test]
    fn test_write_mode_append_skips_header() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("site.csv");
        let t = sample();
        t.write_csv_mode(&path, WriteMode::Create).unwrap();
        t.write_csv_mode(&path, WriteMode::Append).unwrap();

        let loaded = Table::from_csv_path(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.columns(), t.columns());
    }

    #[test]
    fn test_write_mode_overwrite_replaces() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("site.csv");
        let t = sample();
        t.write_csv_mode(&path, WriteMode::Create).unwrap();
        t.write_csv_mode(&path, WriteMode::Overwrite).unwrap();

        let loaded = Table::from_csv_path(&path).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_concat() {
        let combined = Table::concat([sample(), sample()]).unwrap();
        assert_eq!(combined.len(), 4);

        let other = Table::new(["different"]);
        let err = Table::concat([sample(), other]).unwrap_err();
        assert!(matches!(err, TableError::ConcatMismatch));
    }

    #[test]
    fn test_write_site_data_creates_dir() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("out/nested");
        let path = write_site_data(&dir, "01646500", &sample(), WriteMode::Create).unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "01646500.csv");
    }
}
