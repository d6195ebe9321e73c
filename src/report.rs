//! Per-run data-quality counters and ratio summary.
//!
//! Data problems never abort a run; they are counted here and logged once
//! the pipeline finishes.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::stats::RatioSummary;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Non-fatal data-quality conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataIssue {
    /// Region or ZIP cell yields no canonical ZIP code.
    MalformedZip,
    /// Same ZIP on more than one rental row.
    DuplicateZip,
    /// Median sale price of exactly zero.
    DivisionByZero,
    /// Sales and rentals share no ZIP code.
    EmptyJoinResult,
}

impl DataIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataIssue::MalformedZip => "MalformedZip",
            DataIssue::DuplicateZip => "DuplicateZip",
            DataIssue::DivisionByZero => "DivisionByZero",
            DataIssue::EmptyJoinResult => "EmptyJoinResult",
        }
    }
}

impl fmt::Display for DataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one normalizer pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StageCounts {
    pub rows_read: usize,
    pub rows_in_window: usize,
    pub malformed_zip: usize,
    /// Prices (sales rows or rental month cells) that were null,
    /// unparseable or non-finite.
    pub missing_price: usize,
    pub zips_out: usize,
}

/// Counters for the join and threshold filter.
#[derive(Debug, Default, Clone, Serialize)]
pub struct JoinCounts {
    pub joined: usize,
    pub sales_only: usize,
    pub rentals_only: usize,
    pub division_by_zero: usize,
    pub above_threshold: usize,
    pub ranked: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct PipelineReport {
    pub sales: StageCounts,
    pub rentals: StageCounts,
    /// Rental month columns selected by the window.
    pub rental_months: Vec<String>,
    /// Number of extra rows seen for ZIPs repeated in the rental table.
    pub duplicate_zip: usize,
    pub join: JoinCounts,
    pub issues: BTreeMap<DataIssue, usize>,
    pub ratio_summary: Option<RatioSummary>,
}

impl PipelineReport {
    pub fn record(&mut self, issue: DataIssue, count: usize) {
        if count > 0 {
            *self.issues.entry(issue).or_default() += count;
        }
    }

    pub fn count(&self, issue: DataIssue) -> usize {
        self.issues.get(&issue).copied().unwrap_or(0)
    }

    pub fn has_issue(&self, issue: DataIssue) -> bool {
        self.count(issue) > 0
    }

    /// Log the per-reason drop counts next to the run output.
    pub fn log_summary(&self) {
        info!(
            sales_rows = self.sales.rows_read,
            sales_in_window = self.sales.rows_in_window,
            sales_zips = self.sales.zips_out,
            rental_rows = self.rentals.rows_read,
            rental_months = self.rental_months.len(),
            rental_zips = self.rentals.zips_out,
            joined = self.join.joined,
            ranked = self.join.ranked,
            "Pipeline finished"
        );
        info!(
            sales_missing_price = self.sales.missing_price,
            rentals_missing_price = self.rentals.missing_price,
            sales_only = self.join.sales_only,
            rentals_only = self.join.rentals_only,
            above_threshold = self.join.above_threshold,
            "Rows dropped"
        );
        for (issue, count) in &self.issues {
            warn!(kind = %issue, count, "Data issue summary");
        }
        if let Some(summary) = &self.ratio_summary {
            info!(
                count = summary.count,
                mean = summary.mean,
                median = summary.median,
                std = summary.std,
                p05 = summary.p05,
                p95 = summary.p95,
                "Ratio distribution"
            );
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
