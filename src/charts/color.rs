//! Linear ratio-to-color gradient for the choropleth.

use std::fmt;

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const RED: Rgb = Rgb(255, 0, 0);
pub const GREEN: Rgb = Rgb(0, 128, 0);

impl Rgb {
    /// Parse `#rrggbb` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Maps `[vmin, vmax]` onto `low..high`. Values outside the range take the
/// nearest endpoint color.
#[derive(Debug, Clone, Copy)]
pub struct LinearGradient {
    low: Rgb,
    high: Rgb,
    vmin: f64,
    vmax: f64,
}

impl LinearGradient {
    /// `vmin` must be below `vmax`; config validation enforces it.
    pub fn new(low: Rgb, high: Rgb, vmin: f64, vmax: f64) -> Self {
        Self {
            low,
            high,
            vmin,
            vmax,
        }
    }

    /// Position of `value` in the range, clamped to `[0, 1]`. NaN maps to 0.
    pub fn position(&self, value: f64) -> f64 {
        let span = self.vmax - self.vmin;
        if span <= 0.0 || value.is_nan() {
            return 0.0;
        }
        ((value - self.vmin) / span).clamp(0.0, 1.0)
    }

    pub fn color(&self, value: f64) -> Rgb {
        let t = self.position(value);
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb(
            lerp(self.low.0, self.high.0),
            lerp(self.low.1, self.high.1),
            lerp(self.low.2, self.high.2),
        )
    }
}
