use crate::types::{FeatureCollection, HighlightLabel};
use geo::Area;
use std::collections::HashSet;

pub const DEFAULT_HIGHLIGHTS: [&str; 6] = [
    "Brazil",
    "India",
    "China",
    "Australia",
    "South Africa",
    "Russia",
];

pub fn default_highlights() -> Vec<String> {
    DEFAULT_HIGHLIGHTS.iter().map(|s| s.to_string()).collect()
}

/// One label per feature, in feature order.
pub fn highlight_labels(
    fc: &FeatureCollection,
    name_column: &str,
    highlighted: &[String],
) -> Vec<HighlightLabel> {
    let set: HashSet<&str> = highlighted.iter().map(String::as_str).collect();
    fc.features
        .iter()
        .map(|f| match f.attribute(name_column) {
            Some(name) if set.contains(name) => HighlightLabel::Highlighted,
            _ => HighlightLabel::Neutral,
        })
        .collect()
}

/// Population over planar area in the collection's current CRS units,
/// optionally `ln(1 + x)`. Zero-area geometries yield non-finite values.
pub fn population_density(fc: &FeatureCollection, use_log: bool) -> Vec<f64> {
    fc.features
        .iter()
        .map(|f| {
            let density = f.pop_est as f64 / f.geometry.unsigned_area();
            if use_log {
                density.ln_1p()
            } else {
                density
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Crs, Feature};
    use approx::assert_relative_eq;
    use geo::{polygon, MultiPolygon};
    use std::collections::BTreeMap;

    fn rect(width: f64, height: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: width, y: 0.0),
            (x: width, y: height),
            (x: 0.0, y: height),
            (x: 0.0, y: 0.0),
        ]])
    }

    fn feature(name: &str, geometry: MultiPolygon<f64>, pop_est: u64) -> Feature {
        Feature {
            geometry,
            attributes: BTreeMap::from([("name".to_string(), name.to_string())]),
            pop_est,
        }
    }

    fn collection(features: Vec<Feature>) -> FeatureCollection {
        FeatureCollection {
            crs: Crs::Geographic,
            columns: vec!["name".into()],
            features,
        }
    }

    #[test]
    fn labels_follow_membership_and_order() {
        let fc = collection(vec![
            feature("Chile", rect(1.0, 1.0), 1),
            feature("Brazil", rect(1.0, 1.0), 1),
            feature("Peru", rect(1.0, 1.0), 1),
        ]);
        let labels = highlight_labels(&fc, "name", &["Brazil".to_string()]);
        assert_eq!(
            labels,
            vec![
                HighlightLabel::Neutral,
                HighlightLabel::Highlighted,
                HighlightLabel::Neutral
            ]
        );
    }

    #[test]
    fn empty_highlight_set_is_all_neutral() {
        let fc = collection(vec![feature("Chile", rect(1.0, 1.0), 1)]);
        let labels = highlight_labels(&fc, "name", &[]);
        assert_eq!(labels, vec![HighlightLabel::Neutral]);
    }

    #[test]
    fn missing_name_attribute_is_neutral() {
        let fc = collection(vec![feature("Chile", rect(1.0, 1.0), 1)]);
        let labels = highlight_labels(&fc, "NAME", &["Chile".to_string()]);
        assert_eq!(labels, vec![HighlightLabel::Neutral]);
    }

    #[test]
    fn density_is_population_over_area() {
        let fc = collection(vec![feature("A", rect(4.0, 2.5), 1_000)]);
        assert_relative_eq!(population_density(&fc, false)[0], 100.0);
        assert_relative_eq!(population_density(&fc, true)[0], 101.0_f64.ln());
    }

    #[test]
    fn zero_area_is_not_guarded() {
        let degenerate = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ]]);
        let fc = collection(vec![feature("Flat", degenerate, 10)]);
        assert!(population_density(&fc, false)[0].is_infinite());
        assert!(population_density(&fc, true)[0].is_infinite());
    }

    #[test]
    fn defaults_have_six_countries() {
        let defaults = default_highlights();
        assert_eq!(defaults.len(), 6);
        assert!(defaults.contains(&"South Africa".to_string()));
    }
}
