use crate::config::AppConfig;
use crate::types::{Crs, Feature, FeatureCollection};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shapefile::dbase::FieldValue;
use shapefile::Reader;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const POPULATION_COLUMN: &str = "pop_est";

// Synthesized estimates are drawn from [MIN, MAX).
const SYNTHETIC_POP_MIN: u64 = 1_000_000;
const SYNTHETIC_POP_MAX: u64 = 1_000_000_000;

/// Once-initialized handle to the dataset. Loaded on first access and
/// read-only for the rest of the process.
pub struct DatasetCache {
    path: PathBuf,
    seed: u64,
    cell: OnceCell<FeatureCollection>,
}

impl DatasetCache {
    pub fn new(path: impl Into<PathBuf>, seed: u64) -> Self {
        Self {
            path: path.into(),
            seed,
            cell: OnceCell::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.input.dataset.clone(), config.input.seed)
    }

    pub fn get_or_load(&self) -> Result<&FeatureCollection> {
        self.cell.get_or_try_init(|| load_dataset(&self.path, self.seed))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Feature as read from disk, before population estimates are settled.
struct RawFeature {
    geometry: MultiPolygon<f64>,
    attributes: BTreeMap<String, String>,
    pop_est: Option<f64>,
}

pub fn load_dataset(path: &Path, seed: u64) -> Result<FeatureCollection> {
    info!("Loading dataset from {:?}", path);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let (mut columns, raw) = match extension.as_str() {
        "shp" => read_shapefile(path)?,
        "json" | "geojson" => read_geojson(path)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };
    // dBase records come back as a HashMap, so there is no stable source order.
    columns.sort();

    let has_population = columns.iter().any(|c| c == POPULATION_COLUMN);
    let features = settle_population(raw, has_population, seed);

    info!(
        "Loaded {} features ({} attribute columns, population {})",
        features.len(),
        columns.len(),
        if has_population { "from source" } else { "synthesized" }
    );

    Ok(FeatureCollection {
        crs: Crs::Geographic,
        columns,
        features,
    })
}

/// Deterministic stand-in population estimates, one per feature.
pub fn synthesize_population(count: usize, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| rng.gen_range(SYNTHETIC_POP_MIN..SYNTHETIC_POP_MAX))
        .collect()
}

fn settle_population(raw: Vec<RawFeature>, has_population: bool, seed: u64) -> Vec<Feature> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut filled = 0usize;

    let features = raw
        .into_iter()
        .map(|f| {
            let sourced = if has_population {
                f.pop_est
                    .filter(|v| v.is_finite() && v.round() >= 1.0)
                    .map(|v| v.round() as u64)
            } else {
                None
            };
            let pop_est = sourced.unwrap_or_else(|| {
                filled += 1;
                rng.gen_range(SYNTHETIC_POP_MIN..SYNTHETIC_POP_MAX)
            });
            Feature {
                geometry: f.geometry,
                attributes: f.attributes,
                pop_est,
            }
        })
        .collect();

    if has_population && filled > 0 {
        debug!("Filled {} missing population estimates", filled);
    }
    features
}

fn push_columns(columns: &mut Vec<String>, attributes: &BTreeMap<String, String>) {
    for key in attributes.keys() {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.clone());
        }
    }
}

fn read_shapefile(path: &Path) -> Result<(Vec<String>, Vec<RawFeature>)> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut columns = Vec::new();
    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // Skip non-polygon shapes
        };

        let mut attributes = BTreeMap::new();
        let mut pop_est = None;
        let record: HashMap<String, FieldValue> = record.into();
        for (name, value) in record {
            if name == POPULATION_COLUMN {
                pop_est = field_number(&value);
            }
            if let Some(text) = field_text(&value) {
                attributes.insert(name, text);
            } else {
                attributes.entry(name).or_insert_with(String::new);
            }
        }
        push_columns(&mut columns, &attributes);

        features.push(RawFeature {
            geometry,
            attributes,
            pop_est,
        });
    }

    Ok((columns, features))
}

fn field_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) => Some(n.to_string()),
        FieldValue::Float(Some(n)) => Some(n.to_string()),
        FieldValue::Integer(n) => Some(n.to_string()),
        FieldValue::Double(n) => Some(n.to_string()),
        FieldValue::Logical(Some(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn field_number(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Numeric(Some(n)) => Some(*n),
        FieldValue::Float(Some(n)) => Some(*n as f64),
        FieldValue::Integer(n) => Some(*n as f64),
        FieldValue::Double(n) => Some(*n),
        FieldValue::Character(Some(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn read_geojson(path: &Path) -> Result<(Vec<String>, Vec<RawFeature>)> {
    use geojson::GeoJson;
    use std::io::BufReader;

    let file =
        File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut columns = Vec::new();
    let mut features = Vec::new();

    for feature in collection.features {
        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        let mut attributes = BTreeMap::new();
        let mut pop_est = None;
        if let Some(props) = feature.properties {
            for (name, value) in props {
                if name == POPULATION_COLUMN {
                    pop_est = json_number(&value);
                }
                let text = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                attributes.insert(name, text);
            }
        }
        push_columns(&mut columns, &attributes);

        features.push(RawFeature {
            geometry,
            attributes,
            pop_est,
        });
    }

    Ok((columns, features))
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
