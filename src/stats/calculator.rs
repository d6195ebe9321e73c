//! Statistics Calculator Module
//! Descriptive statistics over the ranked ratios, reported with each run.

use serde::Serialize;
use statrs::statistics::Statistics;

/// Distribution of the ratios that survived the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p05: f64,
}

pub struct StatsCalculator;

impl StatsCalculator {
    /// Compute descriptive statistics for an array of values. Returns `None`
    /// for an empty slice.
    pub fn summarize(values: &[f64]) -> Option<RatioSummary> {
        let n = values.len();
        if n == 0 {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = values.iter().mean();
        let std = if n > 1 { values.iter().std_dev() } else { 0.0 };

        Some(RatioSummary {
            count: n,
            mean,
            median: Self::median(&sorted),
            std,
            min: sorted[0],
            max: sorted[n - 1],
            p95: Self::percentile(&sorted, 95.0),
            p05: Self::percentile(&sorted, 5.0),
        })
    }

    /// Median of already sorted values; mean of the middle pair when even.
    pub fn median(sorted_values: &[f64]) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n % 2 == 0 {
            (sorted_values[n / 2 - 1] + sorted_values[n / 2]) / 2.0
        } else {
            sorted_values[n / 2]
        }
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }
}
