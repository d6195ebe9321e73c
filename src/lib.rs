//! zipyield - per-ZIP rent-to-sale ratios
//!
//! Joins a home-sales table and a wide rental table on ZIP code, ranks ZIP
//! codes by rent-to-sale ratio, and exports the ranking as a delimited file,
//! a choropleth map or a ratio chart.

pub mod charts;
pub mod config;
pub mod data;
pub mod output;
pub mod pipeline;
pub mod ratio;
pub mod report;
pub mod stats;

pub use config::Config;
pub use pipeline::{Pipeline, PipelineError, PipelineOutput};
