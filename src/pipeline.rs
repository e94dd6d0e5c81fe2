use crate::colormap::{hex_to_rgba, ColorScheme, BLACK};
use crate::config::RenderConfig;
use crate::names::{resolve_name_column, NameColumn, NAME_NOT_FOUND_MESSAGE};
use crate::prepare::{default_highlights, highlight_labels, population_density};
use crate::projection::{reproject, Projection};
use crate::render::{draw_title, render_map, Style};
use crate::types::FeatureCollection;
use anyhow::{anyhow, Result};
use image::RgbaImage;
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MapMode {
    #[default]
    Cosmetics,
    VisualHierarchy,
    Choropleth,
    GeoProjection,
}

impl MapMode {
    pub const ALL: [MapMode; 4] = [
        MapMode::Cosmetics,
        MapMode::VisualHierarchy,
        MapMode::Choropleth,
        MapMode::GeoProjection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MapMode::Cosmetics => "Map Cosmetics",
            MapMode::VisualHierarchy => "Map Visual Hierarchy",
            MapMode::Choropleth => "Choropleth Map",
            MapMode::GeoProjection => "Geo Projection",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            MapMode::Cosmetics => "cosmetics",
            MapMode::VisualHierarchy => "hierarchy",
            MapMode::Choropleth => "choropleth",
            MapMode::GeoProjection => "projection",
        }
    }
}

impl fmt::Display for MapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepts the display label or the short slug.
impl FromStr for MapMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.label() == s || m.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("Unknown map mode: {}", s))
    }
}

/// Everything one interaction selects.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRequest {
    pub mode: MapMode,
    pub scheme: ColorScheme,
    pub use_log: bool,
    pub projection: Projection,
    pub highlights: Vec<String>,
}

impl Default for MapRequest {
    fn default() -> Self {
        Self {
            mode: MapMode::default(),
            scheme: ColorScheme::default(),
            use_log: true,
            projection: Projection::Wgs84,
            highlights: default_highlights(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum View {
    Figure {
        title: String,
        image: RgbaImage,
        /// Per-feature values behind the fills, for the density modes.
        density: Option<Vec<f64>>,
    },
    Message(String),
}

fn figure(title: String, mut image: RgbaImage, density: Option<Vec<f64>>) -> View {
    draw_title(&mut image, &title, hex_to_rgba(BLACK));
    View::Figure {
        title,
        image,
        density,
    }
}

/// One full pass from the loaded dataset to a figure. Nothing is retained
/// between calls.
pub fn render_view(fc: &FeatureCollection, request: &MapRequest, size: &RenderConfig) -> View {
    info!("Rendering {} ({} features)", request.mode, fc.len());
    let (w, h) = (size.width, size.height);

    match request.mode {
        MapMode::Cosmetics => figure(
            "Styled Map Example".to_string(),
            render_map(fc, &Style::cosmetic(fc.len()), w, h),
            None,
        ),
        MapMode::VisualHierarchy => {
            let column = match resolve_name_column(fc) {
                NameColumn::Found(column) => column,
                NameColumn::NotFound => return View::Message(NAME_NOT_FOUND_MESSAGE.to_string()),
            };
            let labels = highlight_labels(fc, &column, &request.highlights);
            figure(
                "Map Visual Hierarchy with Selected Countries Highlighted in Red".to_string(),
                render_map(fc, &Style::highlight(&labels), w, h),
                None,
            )
        }
        MapMode::Choropleth => {
            let density = population_density(fc, request.use_log);
            let image = render_map(fc, &Style::choropleth(&density, request.scheme), w, h);
            figure(
                format!(
                    "Population Density by Country (Color Scheme: {}, {})",
                    request.scheme,
                    if request.use_log { "Log Scale" } else { "Linear Scale" }
                ),
                image,
                Some(density),
            )
        }
        MapMode::GeoProjection => {
            // Density is taken from projected areas.
            let projected = reproject(fc, request.projection);
            let density = population_density(&projected, request.use_log);
            let image = render_map(&projected, &Style::choropleth(&density, request.scheme), w, h);
            figure(
                format!(
                    "Map in {} Projection (Color by Population Density)",
                    request.projection.label()
                ),
                image,
                Some(density),
            )
        }
    }
}
