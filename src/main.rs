//! CLI entry point for zipyield.
//!
//! Every subcommand runs the same pipeline (load, normalize, join, rank) and
//! then hands the ranked table to one presenter.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zipyield::charts::{ChoroplethMap, GeometryIndex, StaticChartRenderer};
use zipyield::config::Config;
use zipyield::data::{DuplicatePolicy, TimeWindow};
use zipyield::output::{write_ranked, ExportColumn};
use zipyield::pipeline::Pipeline;
use zipyield::ratio::RankedTable;

#[derive(Parser)]
#[command(name = "zipyield")]
#[command(about = "Rank ZIP codes by rent-to-sale ratio", long_about = None)]
struct Cli {
    /// TOML config file; defaults are used for anything it leaves out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Write the run report as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the shared pipeline settings.
#[derive(Args)]
struct PipelineArgs {
    /// Sales table (TSV or CSV)
    #[arg(long, global = true)]
    sales: Option<PathBuf>,

    /// Wide rental table (CSV)
    #[arg(long, global = true)]
    rentals: Option<PathBuf>,

    /// Sales period filter: a substring such as "2022" or a range "2022-01-01..2022-12-31"
    #[arg(long, global = true)]
    sales_window: Option<TimeWindow>,

    /// Rental month filter, same forms as --sales-window
    #[arg(long, global = true)]
    rental_window: Option<TimeWindow>,

    /// Ratios at or above this value are dropped
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// How repeated rental ZIP rows are resolved: pool, first or last
    #[arg(long, global = true)]
    duplicate_policy: Option<DuplicatePolicy>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the ranked table as a delimited file
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many rows
        #[arg(long)]
        max_rows: Option<usize>,

        /// Skip this many rows from the top of the ranking
        #[arg(long)]
        skip_rows: Option<usize>,

        /// Columns to write, e.g. zip,sale_price,rental_price,ratio
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<ExportColumn>>,
    },
    /// Write an HTML choropleth of the ranked ZIP codes
    Map {
        /// GeoJSON file of ZIP code polygons
        #[arg(short, long)]
        geometry: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Polygon simplification tolerance in degrees (0 disables)
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Draw the ranked ratio curve as a PNG
    Chart {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the top and bottom of the ranking
    Summary {
        #[arg(long, default_value_t = 10)]
        head: usize,

        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

impl PipelineArgs {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.sales {
            config.sales.path = path;
        }
        if let Some(path) = self.rentals {
            config.rentals.path = path;
        }
        if let Some(window) = self.sales_window {
            config.sales.window = window;
        }
        if let Some(window) = self.rental_window {
            config.rentals.window = window;
        }
        if let Some(threshold) = self.threshold {
            config.ratio.threshold = threshold;
        }
        if let Some(policy) = self.duplicate_policy {
            config.rentals.duplicate_policy = policy;
        }
    }
}

impl Commands {
    fn apply(&self, config: &mut Config) {
        match self {
            Commands::Export {
                output,
                max_rows,
                skip_rows,
                columns,
            } => {
                if let Some(path) = output {
                    config.export.path = path.clone();
                }
                if max_rows.is_some() {
                    config.export.max_rows = *max_rows;
                }
                if let Some(skip) = skip_rows {
                    config.export.skip_rows = *skip;
                }
                if let Some(columns) = columns {
                    config.export.columns = columns.clone();
                }
            }
            Commands::Map {
                geometry,
                output,
                tolerance,
            } => {
                if let Some(path) = geometry {
                    config.map.geometry_path = path.clone();
                }
                if let Some(path) = output {
                    config.map.output_path = path.clone();
                }
                if let Some(tolerance) = tolerance {
                    config.map.simplify_tolerance = *tolerance;
                }
            }
            Commands::Chart { output } => {
                if let Some(path) = output {
                    config.chart.output_path = path.clone();
                }
            }
            Commands::Summary { .. } => {}
        }
    }
}

fn print_rows(title: &str, table: &RankedTable, skip: usize, take: usize) {
    println!("{title}");
    println!(
        "{:>5}  {:>14}  {:>12}  {:>10}",
        "zip", "sale_price", "rental_price", "ratio"
    );
    for record in table.iter().skip(skip).take(take) {
        println!(
            "{:>5}  {:>14.0}  {:>12.1}  {:>10.6}",
            record.zip, record.sale_price, record.rental_price, record.ratio
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    cli.pipeline.apply(&mut config);
    cli.command.apply(&mut config);

    let output = Pipeline::run(&config)?;
    let table = &output.table;

    if let Some(path) = &cli.report {
        output
            .report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote run report");
    }

    match cli.command {
        Commands::Export { .. } => {
            let options = config.export.options()?;
            let rows = write_ranked(&config.export.path, table, &options).with_context(|| {
                format!("Failed to write export {}", config.export.path.display())
            })?;
            info!(rows, "Export finished");
        }
        Commands::Map { .. } => {
            let geometry = GeometryIndex::load(
                &config.map.geometry_path,
                &config.map.join_property,
                &config.map.label_property,
            )
            .context("Failed to load map geometry")?;
            let options = config.map.options()?;
            let summary = ChoroplethMap::write(&config.map.output_path, table, &geometry, &options)
                .with_context(|| {
                    format!("Failed to write map {}", config.map.output_path.display())
                })?;
            info!(
                rendered = summary.rendered,
                missing_geometry = summary.missing_geometry,
                "Map finished"
            );
        }
        Commands::Chart { .. } => {
            if table.is_empty() {
                warn!("Ranked table is empty, no chart written");
            } else {
                StaticChartRenderer::render_ratio_curve(
                    table,
                    &config.chart.output_path,
                    config.chart.width,
                    config.chart.height,
                )
                .with_context(|| {
                    format!("Failed to draw chart {}", config.chart.output_path.display())
                })?;
            }
        }
        Commands::Summary { head, tail } => {
            println!("{} ZIP codes ranked (threshold {})", table.len(), table.threshold());
            print_rows("Top", table, 0, head);
            let tail = tail.min(table.len());
            print_rows("Bottom", table, table.len() - tail, tail);
            if let Some(stats) = &output.report.ratio_summary {
                println!(
                    "mean {:.6}  median {:.6}  std {:.6}  p05 {:.6}  p95 {:.6}",
                    stats.mean, stats.median, stats.std, stats.p05, stats.p95
                );
            }
        }
    }

    Ok(())
}
