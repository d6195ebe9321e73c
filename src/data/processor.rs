//! Data Processor Module
//! Normalizes the sales and rental tables to one median price per ZIP code.
//!
//! Both tables are reduced to the same long shape (`zip`, `value`) before a
//! single group-by median, so the two normalizers differ only in how they
//! reach that shape.

use polars::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::window::TimeWindow;
use crate::data::zip_code::{ZipCode, ZipCodeError};
use crate::report::{DataIssue, StageCounts};

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Missing column {0:?}")]
    MissingColumn(String),
    #[error("ZIP pattern unavailable: {0}")]
    ZipPattern(#[source] regex::Error),
}

/// How repeated ZIP rows in the rental table are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Every row of the ZIP feeds one median.
    #[default]
    Pool,
    /// Only the first row seen is used.
    First,
    /// Only the last row seen is used.
    Last,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pool" => Ok(DuplicatePolicy::Pool),
            "first" => Ok(DuplicatePolicy::First),
            "last" => Ok(DuplicatePolicy::Last),
            other => Err(format!(
                "unknown duplicate policy {other:?} (expected pool, first or last)"
            )),
        }
    }
}

/// One median price per ZIP code, ordered by ZIP.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPrices(BTreeMap<ZipCode, f64>);

impl NormalizedPrices {
    pub fn get(&self, zip: &ZipCode) -> Option<f64> {
        self.0.get(zip).copied()
    }

    pub fn contains(&self, zip: &ZipCode) -> bool {
        self.0.contains_key(zip)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ZipCode, &f64)> {
        self.0.iter()
    }

    pub fn zips(&self) -> impl Iterator<Item = &ZipCode> {
        self.0.keys()
    }
}

impl FromIterator<(ZipCode, f64)> for NormalizedPrices {
    fn from_iter<I: IntoIterator<Item = (ZipCode, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Column names of the sales table.
#[derive(Debug, Clone)]
pub struct SalesColumns {
    pub period: String,
    pub region: String,
    pub price: String,
}

impl Default for SalesColumns {
    fn default() -> Self {
        Self {
            period: "period_begin".to_string(),
            region: "region".to_string(),
            price: "median_sale_price".to_string(),
        }
    }
}

/// Normalized sales plus the counters gathered on the way.
#[derive(Debug, Default)]
pub struct SalesNormalized {
    pub prices: NormalizedPrices,
    pub counts: StageCounts,
}

/// Normalized rentals plus reshape and duplicate bookkeeping.
#[derive(Debug, Default)]
pub struct RentalNormalized {
    pub prices: NormalizedPrices,
    pub counts: StageCounts,
    /// Month columns the window selected, in file order.
    pub months: Vec<String>,
    /// ZIPs found on more than one row.
    pub duplicate_zips: Vec<ZipCode>,
    /// Extra rows beyond the first for each duplicated ZIP.
    pub duplicate_rows: usize,
}

/// Handles data cleaning and transformation operations.
pub struct DataProcessor;

impl DataProcessor {
    /// Reduce the sales table to a median sale price per ZIP.
    ///
    /// Rows outside the window are skipped, region labels are reduced to
    /// their first digit run, and null prices are ignored by the median.
    pub fn normalize_sales(
        df: &DataFrame,
        columns: &SalesColumns,
        window: &TimeWindow,
    ) -> Result<SalesNormalized, ProcessorError> {
        let periods = Self::column(df, &columns.period)?;
        let periods = periods.str()?;
        let regions = Self::column(df, &columns.region)?;
        let regions = regions.str()?;
        let prices = Self::column(df, &columns.price)?.cast(&DataType::Float64)?;
        let prices = prices.f64()?;

        let mut counts = StageCounts {
            rows_read: df.height(),
            ..Default::default()
        };
        let mut zips: Vec<String> = Vec::new();
        let mut values: Vec<Option<f64>> = Vec::new();

        for ((period, region), price) in periods.into_iter().zip(regions).zip(prices) {
            if !period.map(|p| window.matches(p)).unwrap_or(false) {
                continue;
            }
            counts.rows_in_window += 1;

            let zip = match region.map(ZipCode::extract) {
                Some(Ok(zip)) => zip,
                Some(Err(ZipCodeError::Pattern(e))) => return Err(ProcessorError::ZipPattern(e)),
                Some(Err(e)) => {
                    debug!(kind = %DataIssue::MalformedZip, error = %e, "Dropping sales row");
                    counts.malformed_zip += 1;
                    continue;
                }
                None => {
                    debug!(kind = %DataIssue::MalformedZip, "Dropping sales row with empty region");
                    counts.malformed_zip += 1;
                    continue;
                }
            };

            let price = price.filter(|p| p.is_finite());
            if price.is_none() {
                counts.missing_price += 1;
            }
            zips.push(zip.to_string());
            values.push(price);
        }

        if counts.malformed_zip > 0 {
            warn!(
                kind = %DataIssue::MalformedZip,
                count = counts.malformed_zip,
                "Sales rows without a usable ZIP code were dropped"
            );
        }

        let long = DataFrame::new(vec![
            Column::new("zip".into(), zips),
            Column::new("value".into(), values),
        ])?;
        let prices = Self::median_by_zip(&long)?;
        counts.zips_out = prices.len();

        info!(
            window = %window,
            rows = counts.rows_read,
            in_window = counts.rows_in_window,
            zips = counts.zips_out,
            "Normalized sales"
        );
        Ok(SalesNormalized { prices, counts })
    }

    /// Month columns of the wide rental table that fall in the window.
    pub fn select_months(df: &DataFrame, zip_col: &str, window: &TimeWindow) -> Vec<String> {
        df.get_column_names()
            .iter()
            .map(|name| name.to_string())
            .filter(|name| name != zip_col && window.matches(name))
            .collect()
    }

    /// Transform the wide rental table to long format (stack operation).
    ///
    /// `rows` pairs a row index with the ZIP already parsed from it, so each
    /// value is written next to the ZIP of the row it came from.
    ///
    /// Output columns: ["zip", "month", "value"]
    pub fn stack_to_long(
        df: &DataFrame,
        rows: &[(usize, ZipCode)],
        month_cols: &[String],
    ) -> Result<DataFrame, ProcessorError> {
        let capacity = rows.len() * month_cols.len();
        let mut zips: Vec<String> = Vec::with_capacity(capacity);
        let mut months: Vec<String> = Vec::with_capacity(capacity);
        let mut values: Vec<Option<f64>> = Vec::with_capacity(capacity);

        for month in month_cols {
            let value_f64 = Self::column(df, month)?.cast(&DataType::Float64)?;
            let value_ca = value_f64.f64()?;

            for (idx, zip) in rows {
                zips.push(zip.to_string());
                months.push(month.clone());
                values.push(value_ca.get(*idx).filter(|v| v.is_finite()));
            }
        }

        let df = DataFrame::new(vec![
            Column::new("zip".into(), zips),
            Column::new("month".into(), months),
            Column::new("value".into(), values),
        ])?;

        Ok(df)
    }

    /// Reduce the wide rental table to a median rent per ZIP over the
    /// window's month columns.
    pub fn normalize_rentals(
        df: &DataFrame,
        zip_col: &str,
        window: &TimeWindow,
        policy: DuplicatePolicy,
    ) -> Result<RentalNormalized, ProcessorError> {
        let zip_cells = Self::column(df, zip_col)?;
        let zip_cells = zip_cells.str()?;

        let mut counts = StageCounts {
            rows_read: df.height(),
            ..Default::default()
        };

        let months = Self::select_months(df, zip_col, window);
        if months.is_empty() {
            warn!(window = %window, "No rental month columns match the window");
            return Ok(RentalNormalized {
                counts,
                ..Default::default()
            });
        }

        // Row indexes per ZIP, in file order.
        let mut seen: Vec<ZipCode> = Vec::new();
        let mut rows_by_zip: HashMap<ZipCode, Vec<usize>> = HashMap::new();
        for (idx, cell) in zip_cells.into_iter().enumerate() {
            match cell.map(ZipCode::from_padded) {
                Some(Ok(zip)) => {
                    let rows = rows_by_zip.entry(zip).or_default();
                    if rows.is_empty() {
                        seen.push(zip);
                    }
                    rows.push(idx);
                }
                _ => {
                    debug!(
                        kind = %DataIssue::MalformedZip,
                        row = idx,
                        cell = ?cell,
                        "Dropping rental row"
                    );
                    counts.malformed_zip += 1;
                }
            }
        }

        if counts.malformed_zip > 0 {
            warn!(
                kind = %DataIssue::MalformedZip,
                count = counts.malformed_zip,
                "Rental rows without a usable ZIP code were dropped"
            );
        }

        let mut duplicate_zips = Vec::new();
        let mut duplicate_rows = 0;
        let mut kept: Vec<(usize, ZipCode)> = Vec::new();
        for zip in &seen {
            let rows = &rows_by_zip[zip];
            if rows.len() > 1 {
                warn!(
                    kind = %DataIssue::DuplicateZip,
                    zip = %zip,
                    rows = rows.len(),
                    policy = ?policy,
                    "ZIP code appears on more than one rental row"
                );
                duplicate_zips.push(*zip);
                duplicate_rows += rows.len() - 1;
            }

            match policy {
                DuplicatePolicy::Pool => kept.extend(rows.iter().map(|&idx| (idx, *zip))),
                DuplicatePolicy::First => kept.extend(rows.first().map(|&idx| (idx, *zip))),
                DuplicatePolicy::Last => kept.extend(rows.last().map(|&idx| (idx, *zip))),
            }
        }
        kept.sort_by_key(|(idx, _)| *idx);

        let long = Self::stack_to_long(df, &kept, &months)?;
        counts.rows_in_window = long.height();
        counts.missing_price = long.column("value")?.null_count();

        let prices = Self::median_by_zip(&long)?;
        counts.zips_out = prices.len();

        info!(
            window = %window,
            months = months.len(),
            rows = counts.rows_read,
            zips = counts.zips_out,
            duplicates = duplicate_zips.len(),
            "Normalized rentals"
        );
        Ok(RentalNormalized {
            prices,
            counts,
            months,
            duplicate_zips,
            duplicate_rows,
        })
    }

    /// Median of `value` per `zip`, ignoring nulls. ZIPs whose values are
    /// all null produce no entry.
    pub fn median_by_zip(long: &DataFrame) -> Result<NormalizedPrices, ProcessorError> {
        let grouped = long
            .clone()
            .lazy()
            .group_by([col("zip")])
            .agg([col("value").median()])
            .collect()?;

        let zips = grouped.column("zip")?.str()?;
        let medians = grouped.column("value")?.f64()?;

        let prices = zips
            .into_iter()
            .zip(medians)
            .filter_map(|(zip, median)| {
                let zip = ZipCode::from_padded(zip?).ok()?;
                median.filter(|m| m.is_finite()).map(|m| (zip, m))
            })
            .collect();
        Ok(prices)
    }

    fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, ProcessorError> {
        df.column(name)
            .map_err(|_| ProcessorError::MissingColumn(name.to_string()))
    }
}
