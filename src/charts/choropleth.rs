//! Choropleth map export.
//!
//! Joins the ranked table to ZIP polygons from a GeoJSON FeatureCollection,
//! colors each polygon by its ratio, and writes a single Leaflet HTML page
//! with the map data inlined.

use askama::Template;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::charts::color::LinearGradient;
use crate::charts::simplify::{simplify_ring, Point};
use crate::data::ZipCode;
use crate::ratio::{RankedTable, RatioRecord};

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Geometry file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to render map page: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Template)]
#[template(path = "map.html")]
struct MapTemplate {
    /// Serialized FeatureCollection; every string in it is generated here
    /// or escaped by `PopupTemplate`.
    data: String,
    lat: f64,
    lon: f64,
    zoom: f64,
}

#[derive(Template)]
#[template(
    source = "{{ percent }}% <br> {{ label }} <br> ${{ sale }} <br> ${{ rent }} ",
    ext = "html"
)]
struct PopupTemplate<'a> {
    percent: String,
    label: &'a str,
    sale: String,
    rent: String,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Map<String, Value>,
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
    #[serde(other)]
    Unsupported,
}

/// Rings of one polygon; the first is the outer boundary.
type Polygon = Vec<Vec<Point>>;

/// Outline and popup label of one ZIP code area.
#[derive(Debug, Clone)]
pub struct ZipShape {
    pub label: String,
    pub polygons: Vec<Polygon>,
}

/// ZIP polygons keyed by ZIP code.
#[derive(Debug, Default)]
pub struct GeometryIndex {
    shapes: HashMap<ZipCode, ZipShape>,
    pub unsupported: usize,
    pub unkeyed: usize,
}

impl GeometryIndex {
    /// Read a GeoJSON FeatureCollection, keying features by `join_property`
    /// and labelling them with `label_property`.
    pub fn load(path: &Path, join_property: &str, label_property: &str) -> Result<Self, MapError> {
        if !path.is_file() {
            return Err(MapError::FileNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let collection: FeatureCollection = serde_json::from_reader(reader)?;
        let index = Self::from_features(collection.features, join_property, label_property);

        info!(
            path = %path.display(),
            shapes = index.len(),
            unsupported = index.unsupported,
            unkeyed = index.unkeyed,
            "Loaded ZIP geometry"
        );
        Ok(index)
    }

    /// Parse an in-memory GeoJSON FeatureCollection.
    pub fn from_geojson(
        text: &str,
        join_property: &str,
        label_property: &str,
    ) -> Result<Self, MapError> {
        let collection: FeatureCollection = serde_json::from_str(text)?;
        Ok(Self::from_features(collection.features, join_property, label_property))
    }

    fn from_features(features: Vec<Feature>, join_property: &str, label_property: &str) -> Self {
        let mut index = GeometryIndex::default();

        for feature in features {
            let Some(zip) = feature
                .properties
                .get(join_property)
                .and_then(property_text)
                .and_then(|s| ZipCode::from_padded(&s).ok())
            else {
                index.unkeyed += 1;
                continue;
            };

            let polygons = match feature.geometry {
                Some(Geometry::Polygon { coordinates }) => vec![to_polygon(coordinates)],
                Some(Geometry::MultiPolygon { coordinates }) => {
                    coordinates.into_iter().map(to_polygon).collect()
                }
                Some(Geometry::Unsupported) | None => {
                    index.unsupported += 1;
                    continue;
                }
            };

            let label = feature
                .properties
                .get(label_property)
                .and_then(property_text)
                .map(|s| match ZipCode::from_padded(&s) {
                    Ok(z) => z.to_string(),
                    Err(_) => s,
                })
                .unwrap_or_else(|| zip.to_string());

            if index.shapes.contains_key(&zip) {
                debug!(zip = %zip, "Duplicate geometry feature ignored");
                continue;
            }
            index.shapes.insert(zip, ZipShape { label, polygons });
        }

        index
    }

    pub fn get(&self, zip: &ZipCode) -> Option<&ZipShape> {
        self.shapes.get(zip)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

/// Property values may be strings or numbers depending on the exporter.
fn property_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_polygon(rings: Vec<Vec<Vec<f64>>>) -> Polygon {
    rings
        .into_iter()
        .map(|ring| {
            ring.into_iter()
                .filter(|pos| pos.len() >= 2)
                .map(|pos| [pos[0], pos[1]])
                .collect()
        })
        .collect()
}

/// Rendering settings for the map page.
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub gradient: LinearGradient,
    pub simplify_tolerance: f64,
    pub center: [f64; 2],
    pub zoom: f64,
}

/// Counts from one map build.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapSummary {
    pub rendered: usize,
    pub missing_geometry: usize,
}

pub struct ChoroplethMap;

impl ChoroplethMap {
    /// GeoJSON features for every ranked ZIP that has geometry, ordered by
    /// ZIP code.
    pub fn build_features(
        table: &RankedTable,
        geometry: &GeometryIndex,
        options: &MapOptions,
    ) -> Result<(Vec<Value>, MapSummary), MapError> {
        let mut records: Vec<&RatioRecord> = table.iter().collect();
        records.sort_by_key(|r| r.zip);

        let mut summary = MapSummary::default();
        let mut features = Vec::with_capacity(records.len());

        for record in records {
            let Some(shape) = geometry.get(&record.zip) else {
                summary.missing_geometry += 1;
                continue;
            };

            let polygons: Vec<Polygon> = shape
                .polygons
                .iter()
                .map(|rings| {
                    rings
                        .iter()
                        .map(|ring| simplify_ring(ring, options.simplify_tolerance))
                        .collect()
                })
                .collect();

            let popup = popup_text(record, &shape.label)?;
            features.push(json!({
                "type": "Feature",
                "properties": {
                    "zip": record.zip,
                    "ratio": record.ratio,
                    "fill": options.gradient.color(record.ratio).to_hex(),
                    "popup": popup,
                },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": polygons,
                },
            }));
            summary.rendered += 1;
        }

        if summary.missing_geometry > 0 {
            warn!(
                count = summary.missing_geometry,
                "Ranked ZIP codes without geometry left off the map"
            );
        }
        Ok((features, summary))
    }

    /// Full HTML page for the given features.
    pub fn render_html(features: Vec<Value>, options: &MapOptions) -> Result<String, MapError> {
        let collection = json!({ "type": "FeatureCollection", "features": features });
        let page = MapTemplate {
            data: serde_json::to_string(&collection)?,
            lat: options.center[0],
            lon: options.center[1],
            zoom: options.zoom,
        };
        Ok(page.render()?)
    }

    /// Build and write the map page, creating parent directories.
    pub fn write(
        path: &Path,
        table: &RankedTable,
        geometry: &GeometryIndex,
        options: &MapOptions,
    ) -> Result<MapSummary, MapError> {
        let (features, summary) = Self::build_features(table, geometry, options)?;
        let html = Self::render_html(features, options)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, html)?;

        info!(path = %path.display(), zips = summary.rendered, "Wrote choropleth map");
        Ok(summary)
    }
}

/// Popup body: ratio percentage, ZIP, sale price, rent. The label comes
/// from the geometry file and is HTML-escaped.
pub fn popup_text(record: &RatioRecord, label: &str) -> Result<String, MapError> {
    let popup = PopupTemplate {
        percent: format!("{:.2}", record.ratio * 100.0),
        label,
        sale: with_thousands(record.sale_price),
        rent: with_thousands(record.rental_price),
    };
    Ok(popup.render()?)
}

/// Round to a whole number and group digits by thousands.
pub fn with_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value);
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}")
}
