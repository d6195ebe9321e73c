//! Static Chart Renderer
//! Draws the ranked ratio curve (ratio against rank position) as a PNG.

use plotters::prelude::*;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::ratio::RankedTable;

// Colors
const LINE: RGBColor = RGBColor(91, 155, 213);
const GRID: RGBColor = RGBColor(200, 200, 200);

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Nothing to plot: ranked table is empty")]
    EmptyTable,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Drawing failed: {0}")]
    Draw(String),
}

pub struct StaticChartRenderer;

impl StaticChartRenderer {
    /// Render the ratio curve to `path`, creating parent directories.
    pub fn render_ratio_curve(
        table: &RankedTable,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), ChartError> {
        if table.is_empty() {
            return Err(ChartError::EmptyTable);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let ratios = table.ratios();
        let (y_min, y_max) = Self::get_y_range(&ratios);
        let x_max = ratios.len().max(2) as f64 - 1.0;

        let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Rent-to-sale ratio by rank", ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(0f64..x_max, y_min..y_max)
            .map_err(draw_err)?;

        chart
            .configure_mesh()
            .light_line_style(GRID.mix(0.3))
            .x_desc("Rank")
            .y_desc("RentToSaleRatio")
            .y_label_formatter(&|v| format!("{:.4}", v))
            .draw()
            .map_err(draw_err)?;

        chart
            .draw_series(LineSeries::new(
                ratios.iter().enumerate().map(|(i, &r)| (i as f64, r)),
                LINE.stroke_width(2),
            ))
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
        info!(path = %path.display(), points = ratios.len(), "Wrote ratio chart");
        Ok(())
    }

    /// Y axis bounds with 5% padding; a flat series gets a unit-free band
    /// around its value.
    fn get_y_range(values: &[f64]) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in values {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if !min.is_finite() {
            return (0.0, 1.0);
        }

        let span = max - min;
        let pad = if span > 0.0 {
            span * 0.05
        } else {
            (max.abs() * 0.05).max(1e-6)
        };
        (min - pad, max + pad)
    }
}

fn draw_err<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Draw(e.to_string())
}
