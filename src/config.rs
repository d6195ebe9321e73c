//! Run configuration.
//!
//! Loaded from an optional TOML file. Every key has a default, so a missing
//! file, section or key falls back to the values the 2022 analysis used.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::charts::{LinearGradient, MapOptions, Rgb};
use crate::data::{DuplicatePolicy, SalesColumns, TimeWindow};
use crate::output::{ExportColumn, ExportOptions};
use crate::ratio::DEFAULT_THRESHOLD;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sales: SalesConfig,
    pub rentals: RentalsConfig,
    pub ratio: RatioConfig,
    pub export: ExportConfig,
    pub map: MapConfig,
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SalesConfig {
    pub path: PathBuf,
    /// Field separator; inferred from the extension when unset.
    pub separator: Option<char>,
    pub window: TimeWindow,
    pub period_column: String,
    pub region_column: String,
    pub price_column: String,
}

impl Default for SalesConfig {
    fn default() -> Self {
        let columns = SalesColumns::default();
        Self {
            path: PathBuf::from("data/sales/zip_code_market_tracker.tsv000"),
            separator: None,
            window: TimeWindow::default(),
            period_column: columns.period,
            region_column: columns.region,
            price_column: columns.price,
        }
    }
}

impl SalesConfig {
    pub fn columns(&self) -> SalesColumns {
        SalesColumns {
            period: self.period_column.clone(),
            region: self.region_column.clone(),
            price: self.price_column.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RentalsConfig {
    pub path: PathBuf,
    pub separator: Option<char>,
    pub window: TimeWindow,
    pub zip_column: String,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for RentalsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/rental/Zip_zori_sm_month.csv"),
            separator: Some(','),
            window: TimeWindow::default(),
            zip_column: "RegionName".to_string(),
            duplicate_policy: DuplicatePolicy::Pool,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatioConfig {
    /// Ratios at or above this value are treated as outliers.
    pub threshold: f64,
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub path: PathBuf,
    pub columns: Vec<ExportColumn>,
    pub max_rows: Option<usize>,
    pub skip_rows: usize,
    pub delimiter: char,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data_output/out.csv"),
            columns: vec![ExportColumn::Zip, ExportColumn::Ratio],
            max_rows: None,
            skip_rows: 0,
            delimiter: ',',
        }
    }
}

impl ExportConfig {
    pub fn options(&self) -> Result<ExportOptions, ConfigError> {
        Ok(ExportOptions {
            columns: self.columns.clone(),
            max_rows: self.max_rows,
            skip_rows: self.skip_rows,
            delimiter: ascii_byte("export.delimiter", self.delimiter)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    pub geometry_path: PathBuf,
    pub output_path: PathBuf,
    /// Feature property matched against the ZIP code.
    pub join_property: String,
    /// Feature property shown as the ZIP in popups.
    pub label_property: String,
    pub color_min: f64,
    pub color_max: f64,
    pub low_color: String,
    pub high_color: String,
    pub simplify_tolerance: f64,
    /// Initial view as `[lat, lon]`.
    pub center: [f64; 2],
    pub zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            geometry_path: PathBuf::from("data/polygon/cb_2020_us_zcta520_500k.geojson"),
            output_path: PathBuf::from("web_build/index.html"),
            join_property: "NAME20".to_string(),
            label_property: "GEOID20".to_string(),
            color_min: 0.0,
            color_max: 0.016,
            low_color: "#ff0000".to_string(),
            high_color: "#008000".to_string(),
            simplify_tolerance: 0.001,
            center: [40.70, -98.94],
            zoom: 4.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartConfig {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("data_output/ratios.png"),
            width: 1000,
            height: 700,
        }
    }
}

impl Config {
    /// Read `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ratio.threshold > 0.0 && self.ratio.threshold.is_finite()) {
            return Err(invalid(format!(
                "ratio.threshold must be a positive number, got {}",
                self.ratio.threshold
            )));
        }
        if self.export.columns.is_empty() {
            return Err(invalid("export.columns must name at least one column"));
        }
        if !(self.map.color_min < self.map.color_max) {
            return Err(invalid(format!(
                "map.color_min ({}) must be below map.color_max ({})",
                self.map.color_min, self.map.color_max
            )));
        }
        if !(self.map.simplify_tolerance >= 0.0) {
            return Err(invalid("map.simplify_tolerance must be zero or positive"));
        }
        if self.chart.width == 0 || self.chart.height == 0 {
            return Err(invalid("chart.width and chart.height must be non-zero"));
        }
        self.map.colors()?;
        self.sales_separator()?;
        self.rental_separator()?;
        self.export.options()?;
        Ok(())
    }

    pub fn sales_separator(&self) -> Result<Option<u8>, ConfigError> {
        self.sales
            .separator
            .map(|c| ascii_byte("sales.separator", c))
            .transpose()
    }

    pub fn rental_separator(&self) -> Result<Option<u8>, ConfigError> {
        self.rentals
            .separator
            .map(|c| ascii_byte("rentals.separator", c))
            .transpose()
    }
}

impl MapConfig {
    /// Gradient endpoints as `(low, high)`.
    pub fn colors(&self) -> Result<(Rgb, Rgb), ConfigError> {
        let parse = |key: &str, hex: &str| {
            Rgb::from_hex(hex)
                .ok_or_else(|| invalid(format!("map.{key} is not a #rrggbb color: {hex:?}")))
        };
        Ok((
            parse("low_color", &self.low_color)?,
            parse("high_color", &self.high_color)?,
        ))
    }

    pub fn options(&self) -> Result<MapOptions, ConfigError> {
        let (low, high) = self.colors()?;
        Ok(MapOptions {
            gradient: LinearGradient::new(low, high, self.color_min, self.color_max),
            simplify_tolerance: self.simplify_tolerance,
            center: self.center,
            zoom: self.zoom,
        })
    }
}

fn ascii_byte(key: &str, c: char) -> Result<u8, ConfigError> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(invalid(format!("{key} must be a single ASCII character, got {c:?}")))
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
