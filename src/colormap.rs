//! Sequential colour schemes for density maps, plus the fixed named colours
//! used by the cosmetic and highlight styles.

use anyhow::{anyhow, Result};
use image::Rgba;
use std::fmt;
use std::str::FromStr;

pub const SKY_BLUE: &str = "#87CEEB";
pub const RED: &str = "#FF0000";
pub const LIGHT_GREY: &str = "#D3D3D3";
pub const WHITE: &str = "#FFFFFF";
pub const BLACK: &str = "#000000";
/// Fill for features whose value is not finite.
pub const MISSING: &str = "#BDBDBD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorScheme {
    #[default]
    OrRd,
    YlGn,
    Blues,
    Purples,
    Greens,
}

impl ColorScheme {
    pub const ALL: [ColorScheme; 5] = [
        ColorScheme::OrRd,
        ColorScheme::YlGn,
        ColorScheme::Blues,
        ColorScheme::Purples,
        ColorScheme::Greens,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColorScheme::OrRd => "OrRd",
            ColorScheme::YlGn => "YlGn",
            ColorScheme::Blues => "Blues",
            ColorScheme::Purples => "Purples",
            ColorScheme::Greens => "Greens",
        }
    }

    /// ColorBrewer sequential gradient, light to dark.
    pub fn gradient(&self) -> colorous::Gradient {
        match self {
            ColorScheme::OrRd => colorous::ORANGE_RED,
            ColorScheme::YlGn => colorous::YELLOW_GREEN,
            ColorScheme::Blues => colorous::BLUES,
            ColorScheme::Purples => colorous::PURPLES,
            ColorScheme::Greens => colorous::GREENS,
        }
    }

    /// Colour at `t` in [0, 1]; out-of-range and NaN are clamped.
    pub fn sample(&self, t: f64) -> Rgba<u8> {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let c = self.gradient().eval_continuous(t);
        Rgba([c.r, c.g, c.b, 255])
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| anyhow!("Unknown colour scheme: {}", s))
    }
}

pub fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    Rgba([channel(0..2), channel(2..4), channel(4..6), 255])
}
