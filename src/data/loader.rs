//! CSV Data Loader Module
//! Handles delimited file loading using Polars.
//!
//! Every column is read as a string. ZIP identifiers therefore never pass
//! through an integer type; prices are cast to floats later, per column.

use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Failed to load {path}: {source}")]
    CsvError {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("{path} has no column named {column:?}")]
    MissingColumn { path: PathBuf, column: String },
}

/// Pick the field separator from the file name: anything whose extension
/// mentions `tsv` (e.g. `.tsv000`) is tab separated, the rest comma.
pub fn infer_separator(path: &Path) -> u8 {
    let is_tsv = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase().contains("tsv"))
        .unwrap_or(false);
    if is_tsv {
        b'\t'
    } else {
        b','
    }
}

/// Fail fast if an input path does not resolve to a file.
pub fn ensure_exists(path: &Path) -> Result<(), LoaderError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LoaderError::FileNotFound(path.to_path_buf()))
    }
}

/// Loads delimited tables into string-typed DataFrames.
pub struct DataLoader {
    path: PathBuf,
    separator: u8,
}

impl DataLoader {
    /// Loader for `path`; without an explicit separator one is inferred from
    /// the extension.
    pub fn new(path: impl Into<PathBuf>, separator: Option<u8>) -> Self {
        let path = path.into();
        let separator = separator.unwrap_or_else(|| infer_separator(&path));
        Self { path, separator }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file with a header row.
    pub fn load(&self) -> Result<DataFrame, LoaderError> {
        ensure_exists(&self.path)?;
        debug!(
            path = %self.path.display(),
            separator = %(self.separator as char).escape_default(),
            "Reading table"
        );

        // Schema inference over zero rows reads every column as String.
        let df = LazyCsvReader::new(&self.path)
            .with_has_header(true)
            .with_separator(self.separator)
            .with_infer_schema_length(Some(0))
            .finish()
            .and_then(|lazy| lazy.collect())
            .map_err(|source| LoaderError::CsvError {
                path: self.path.clone(),
                source,
            })?;

        info!(
            path = %self.path.display(),
            rows = df.height(),
            columns = df.width(),
            "Loaded table"
        );
        Ok(df)
    }

    /// Check that each named column is present.
    pub fn require_columns(&self, df: &DataFrame, columns: &[&str]) -> Result<(), LoaderError> {
        let present = column_names(df);
        for column in columns {
            if !present.iter().any(|c| c == column) {
                return Err(LoaderError::MissingColumn {
                    path: self.path.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Column names of a DataFrame in file order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect()
}
