//! End-to-end run: load both tables, normalize, join and rank.

use polars::prelude::DataFrame;
use thiserror::Error;
use tracing::{info, info_span};

use crate::config::{Config, ConfigError};
use crate::data::{
    ensure_exists, DataLoader, DataProcessor, LoaderError, ProcessorError, RentalNormalized,
    SalesNormalized,
};
use crate::ratio::{RankedTable, RatioJoiner};
use crate::report::{DataIssue, JoinCounts, PipelineReport};
use crate::stats::StatsCalculator;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub table: RankedTable,
    pub report: PipelineReport,
}

pub struct Pipeline;

impl Pipeline {
    /// Run the full pipeline from the configured input files.
    ///
    /// The config is validated and both input paths are checked before
    /// either file is read.
    pub fn run(config: &Config) -> Result<PipelineOutput, PipelineError> {
        let _span = info_span!("pipeline").entered();

        config.validate()?;
        ensure_exists(&config.sales.path)?;
        ensure_exists(&config.rentals.path)?;

        let sales_loader = DataLoader::new(&config.sales.path, config.sales_separator()?);
        let sales_df = sales_loader.load()?;
        let columns = config.sales.columns();
        sales_loader.require_columns(
            &sales_df,
            &[
                columns.period.as_str(),
                columns.region.as_str(),
                columns.price.as_str(),
            ],
        )?;

        let rental_loader = DataLoader::new(&config.rentals.path, config.rental_separator()?);
        let rental_df = rental_loader.load()?;
        rental_loader.require_columns(&rental_df, &[config.rentals.zip_column.as_str()])?;

        Self::process(config, &sales_df, &rental_df)
    }

    /// Run normalization, join and ranking over already loaded tables.
    pub fn run_frames(
        config: &Config,
        sales_df: &DataFrame,
        rental_df: &DataFrame,
    ) -> Result<PipelineOutput, PipelineError> {
        config.validate()?;
        Self::process(config, sales_df, rental_df)
    }

    fn process(
        config: &Config,
        sales_df: &DataFrame,
        rental_df: &DataFrame,
    ) -> Result<PipelineOutput, PipelineError> {
        let sales = DataProcessor::normalize_sales(
            sales_df,
            &config.sales.columns(),
            &config.sales.window,
        )?;
        let rentals = DataProcessor::normalize_rentals(
            rental_df,
            &config.rentals.zip_column,
            &config.rentals.window,
            config.rentals.duplicate_policy,
        )?;

        let (table, join) =
            RatioJoiner::join(&sales.prices, &rentals.prices, config.ratio.threshold);

        let report = Self::build_report(sales, rentals, join, &table);
        report.log_summary();
        info!(ranked = table.len(), "Pipeline complete");

        Ok(PipelineOutput { table, report })
    }

    fn build_report(
        sales: SalesNormalized,
        rentals: RentalNormalized,
        join: JoinCounts,
        table: &RankedTable,
    ) -> PipelineReport {
        let mut report = PipelineReport {
            sales: sales.counts,
            rentals: rentals.counts,
            rental_months: rentals.months,
            duplicate_zip: rentals.duplicate_rows,
            join,
            ratio_summary: StatsCalculator::summarize(&table.ratios()),
            ..Default::default()
        };

        let malformed = report.sales.malformed_zip + report.rentals.malformed_zip;
        report.record(DataIssue::MalformedZip, malformed);
        report.record(DataIssue::DuplicateZip, rentals.duplicate_zips.len());
        report.record(DataIssue::DivisionByZero, report.join.division_by_zero);
        if report.join.joined == 0 {
            report.record(DataIssue::EmptyJoinResult, 1);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn sales(rows: &[(&str, &str, &str)]) -> DataFrame {
        DataFrame::new(vec![
            Column::new("period_begin".into(), rows.iter().map(|r| r.0).collect::<Vec<_>>()),
            Column::new("region".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
            Column::new(
                "median_sale_price".into(),
                rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            ),
        ])
        .unwrap()
    }

    fn rentals(zips: &[&str], jan: &[&str], feb: &[&str]) -> DataFrame {
        DataFrame::new(vec![
            Column::new("RegionName".into(), zips.to_vec()),
            Column::new("2022-01".into(), jan.to_vec()),
            Column::new("2022-02".into(), feb.to_vec()),
        ])
        .unwrap()
    }

    #[test]
    fn test_report_counts_issues() {
        let sales_df = sales(&[
            ("2022-01-01", "Zip Code: 90266", "1000000"),
            ("2022-02-01", "Zip Code: 90266", "1100000"),
            ("2022-01-01", "Zip Code: none", "5"),
            ("2022-01-01", "Zip Code: 10017", "0"),
        ]);
        let rental_df = rentals(
            &["90266", "10017", "90266", "22222"],
            &["1700", "2000", "1700", "900"],
            &["1700", "2100", "1700", "900"],
        );

        let out = Pipeline::run_frames(&Config::default(), &sales_df, &rental_df).unwrap();

        assert_eq!(out.table.len(), 1);
        assert_eq!(out.report.count(DataIssue::MalformedZip), 1);
        assert_eq!(out.report.count(DataIssue::DuplicateZip), 1);
        assert_eq!(out.report.count(DataIssue::DivisionByZero), 1);
        assert!(!out.report.has_issue(DataIssue::EmptyJoinResult));
        assert_eq!(out.report.join.rentals_only, 1);
        assert_eq!(out.report.rental_months.len(), 2);
        assert_eq!(out.report.ratio_summary.as_ref().unwrap().count, 1);
    }

    #[test]
    fn test_empty_join_is_not_fatal() {
        let sales_df = sales(&[("2022-01-01", "Zip Code: 11111", "100000")]);
        let rental_df = rentals(&["22222"], &["1000"], &["1000"]);

        let out = Pipeline::run_frames(&Config::default(), &sales_df, &rental_df).unwrap();
        assert!(out.table.is_empty());
        assert!(out.report.has_issue(DataIssue::EmptyJoinResult));
        assert!(out.report.ratio_summary.is_none());
    }

    #[test]
    fn test_invalid_threshold_is_rejected_before_ranking() {
        let sales_df = sales(&[("2022-01-01", "Zip Code: 90266", "1000")]);
        let rental_df = rentals(&["90266"], &["900"], &["900"]);

        for threshold in [f64::NAN, f64::INFINITY, -0.01] {
            let mut config = Config::default();
            config.ratio.threshold = threshold;
            let err = Pipeline::run_frames(&config, &sales_df, &rental_df).unwrap_err();
            assert!(matches!(
                err,
                PipelineError::Config(ConfigError::Invalid(_))
            ));
        }
    }

    #[test]
    fn test_run_validates_before_touching_inputs() {
        let mut config = Config::default();
        config.ratio.threshold = f64::NAN;
        config.sales.path = "/no/such/sales.tsv".into();
        assert!(matches!(
            Pipeline::run(&config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_bad_separator_is_an_error() {
        let mut config = Config::default();
        config.rentals.separator = Some('§');
        assert!(matches!(
            Pipeline::run(&config),
            Err(PipelineError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_missing_input_file_is_fatal() {
        let mut config = Config::default();
        config.sales.path = "/no/such/sales.tsv".into();
        let err = Pipeline::run(&config).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Loader(LoaderError::FileNotFound(_))
        ));
    }
}
