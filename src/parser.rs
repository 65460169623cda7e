use std::collections::BTreeMap;

use serde_json::Value;

mod geojson;
pub use geojson::{ExtractedFeatureSet, extract_features, extract_geojsons, flatten_features};
mod scatter;
pub use scatter::{
  CATEGORY_COLORS, DERIVED_GEOMETRY_COLUMN, LegendEntry, ScatterColumns, ScatterStyle,
  derive_scatter_feature_collection, legend_entries, normalize_cell, to_element_data,
};

#[cfg(test)]
pub mod test_utils;

/// Tabular payload of a host data element: column name to the cells of that column.
pub type ElementData = BTreeMap<String, Vec<Value>>;
