use crate::types::FeatureCollection;
use tracing::warn;

/// Columns that may hold the country name, highest priority first.
pub const NAME_CANDIDATES: [&str; 3] = ["name", "NAME", "country"];

pub const NAME_NOT_FOUND_MESSAGE: &str = "Country name column not found in dataset.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameColumn {
    Found(String),
    NotFound,
}

impl NameColumn {
    pub fn found(&self) -> Option<&str> {
        match self {
            NameColumn::Found(column) => Some(column),
            NameColumn::NotFound => None,
        }
    }
}

pub fn resolve_name_column(fc: &FeatureCollection) -> NameColumn {
    match NAME_CANDIDATES.iter().find(|c| fc.has_column(c)) {
        Some(column) => NameColumn::Found(column.to_string()),
        None => {
            warn!("{}", NAME_NOT_FOUND_MESSAGE);
            NameColumn::NotFound
        }
    }
}

/// Distinct values of `column`, in the order they first appear.
pub fn unique_names(fc: &FeatureCollection, column: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for feature in &fc.features {
        if let Some(name) = feature.attribute(column) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}
