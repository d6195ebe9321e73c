//! Flat-file export of the ranked table.
//!
//! Rows are written in ranking order. Floats use Rust's shortest round-trip
//! formatting, so the same table always produces the same bytes.

use csv::WriterBuilder;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::ratio::{RankedTable, RatioRecord};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A column of the exported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportColumn {
    Zip,
    SalePrice,
    RentalPrice,
    Ratio,
}

impl ExportColumn {
    pub fn header(&self) -> &'static str {
        match self {
            ExportColumn::Zip => "RegionName",
            ExportColumn::SalePrice => "CurrentSalesPrice",
            ExportColumn::RentalPrice => "CurrentRentalPrice",
            ExportColumn::Ratio => "RentToSaleRatio",
        }
    }

    fn value(&self, record: &RatioRecord) -> String {
        match self {
            ExportColumn::Zip => record.zip.to_string(),
            ExportColumn::SalePrice => record.sale_price.to_string(),
            ExportColumn::RentalPrice => record.rental_price.to_string(),
            ExportColumn::Ratio => record.ratio.to_string(),
        }
    }
}

impl FromStr for ExportColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zip" | "regionname" => Ok(ExportColumn::Zip),
            "sale_price" | "currentsalesprice" => Ok(ExportColumn::SalePrice),
            "rental_price" | "currentrentalprice" => Ok(ExportColumn::RentalPrice),
            "ratio" | "renttosaleratio" => Ok(ExportColumn::Ratio),
            other => Err(format!(
                "unknown column {other:?} (expected zip, sale_price, rental_price or ratio)"
            )),
        }
    }
}

/// Which slice of the table to write, and how.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub columns: Vec<ExportColumn>,
    /// Rows skipped from the top before writing.
    pub skip_rows: usize,
    pub max_rows: Option<usize>,
    pub delimiter: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            columns: vec![ExportColumn::Zip, ExportColumn::Ratio],
            skip_rows: 0,
            max_rows: None,
            delimiter: b',',
        }
    }
}

/// Writes the ranked table to `path`, creating parent directories. Returns
/// the number of data rows written.
pub fn write_ranked(
    path: &Path,
    table: &RankedTable,
    options: &ExportOptions,
) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_path(path)?;

    writer.write_record(options.columns.iter().map(|c| c.header()))?;

    let take = options.max_rows.unwrap_or(usize::MAX);
    let mut written = 0;
    for record in table.iter().skip(options.skip_rows).take(take) {
        writer.write_record(options.columns.iter().map(|c| c.value(record)))?;
        written += 1;
    }
    writer.flush()?;

    if written == 0 {
        warn!(path = %path.display(), "Export contains no rows");
    }
    info!(path = %path.display(), rows = written, "Wrote ranked export");
    Ok(written)
}
