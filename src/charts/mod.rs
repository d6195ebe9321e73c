//! Charts module - map and chart rendering

mod choropleth;
mod color;
mod renderer;
mod simplify;

pub use choropleth::{
    popup_text, with_thousands, ChoroplethMap, GeometryIndex, MapError, MapOptions, MapSummary,
    ZipShape,
};
pub use color::{LinearGradient, Rgb, GREEN, RED};
pub use renderer::{ChartError, StaticChartRenderer};
pub use simplify::{simplify_ring, Point, MIN_RING_POINTS};
