//! Ratio Joiner Module
//! Inner-joins normalized sales and rentals, computes rent-to-sale ratios,
//! drops outliers and ranks what is left.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::data::{NormalizedPrices, ZipCode};
use crate::report::{DataIssue, JoinCounts};

/// Ratio threshold used when none is configured.
pub const DEFAULT_THRESHOLD: f64 = 0.015;

/// One joined ZIP code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioRecord {
    pub zip: ZipCode,
    pub sale_price: f64,
    pub rental_price: f64,
    pub ratio: f64,
}

/// Joined records with `ratio < threshold`, sorted by ratio descending and
/// then ZIP ascending.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankedTable {
    threshold: f64,
    records: Vec<RatioRecord>,
}

impl RankedTable {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn records(&self) -> &[RatioRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RatioRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ratios(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.ratio).collect()
    }
}

impl<'a> IntoIterator for &'a RankedTable {
    type Item = &'a RatioRecord;
    type IntoIter = std::slice::Iter<'a, RatioRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Ranking order: ratio descending, ZIP ascending on ties.
pub fn rank_order(a: &RatioRecord, b: &RatioRecord) -> Ordering {
    b.ratio.total_cmp(&a.ratio).then_with(|| a.zip.cmp(&b.zip))
}

pub struct RatioJoiner;

impl RatioJoiner {
    /// Join, divide, filter and sort.
    pub fn join(
        sales: &NormalizedPrices,
        rentals: &NormalizedPrices,
        threshold: f64,
    ) -> (RankedTable, JoinCounts) {
        let mut counts = JoinCounts::default();
        let mut records = Vec::new();

        for (zip, &sale_price) in sales.iter() {
            let Some(rental_price) = rentals.get(zip) else {
                counts.sales_only += 1;
                continue;
            };
            counts.joined += 1;

            if sale_price == 0.0 {
                warn!(
                    kind = %DataIssue::DivisionByZero,
                    zip = %zip,
                    "Zero sale price, ZIP excluded"
                );
                counts.division_by_zero += 1;
                continue;
            }

            let ratio = rental_price / sale_price;
            // Negated so a NaN threshold keeps nothing.
            if !ratio.is_finite() || !(ratio < threshold) {
                debug!(zip = %zip, ratio, threshold, "Ratio filtered");
                counts.above_threshold += 1;
                continue;
            }

            records.push(RatioRecord {
                zip: *zip,
                sale_price,
                rental_price,
                ratio,
            });
        }
        counts.rentals_only = rentals.zips().filter(|z| !sales.contains(z)).count();

        if counts.joined == 0 {
            warn!(
                kind = %DataIssue::EmptyJoinResult,
                sales_zips = sales.len(),
                rental_zips = rentals.len(),
                "Sales and rentals share no ZIP codes"
            );
        }

        records.sort_by(rank_order);
        counts.ranked = records.len();

        info!(
            joined = counts.joined,
            ranked = counts.ranked,
            above_threshold = counts.above_threshold,
            threshold,
            "Ranked ZIP codes"
        );

        (RankedTable { threshold, records }, counts)
    }
}
