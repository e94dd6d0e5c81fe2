use crate::projection::Projection;
use geo::MultiPolygon;
use std::collections::BTreeMap;

/// Coordinate reference system a collection's geometries are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// Longitude/latitude degrees, as shipped by the source dataset.
    Geographic,
    Projected(Projection),
}

impl Crs {
    pub fn identifier(&self) -> &'static str {
        match self {
            Crs::Geographic => "EPSG:4326",
            Crs::Projected(p) => p.identifier(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: MultiPolygon<f64>,
    // Source attributes stringified, keyed by column name
    pub attributes: BTreeMap<String, String>,
    pub pop_est: u64,
}

impl Feature {
    pub fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct FeatureCollection {
    pub crs: Crs,
    /// Attribute column names, sorted.
    pub columns: Vec<String>,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Per-feature categorical colour for the visual hierarchy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightLabel {
    Highlighted,
    Neutral,
}

impl HighlightLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightLabel::Highlighted => "highlighted",
            HighlightLabel::Neutral => "neutral",
        }
    }
}
