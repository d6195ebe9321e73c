//! Stats module - ratio distribution

mod calculator;

pub use calculator::{RatioSummary, StatsCalculator};
