use serde_json::{Value, json};

use super::ElementData;

/// Element data with a single column.
#[must_use]
pub fn element_data(column: &str, cells: Vec<Value>) -> ElementData {
  let mut data = ElementData::new();
  data.insert(column.to_string(), cells);
  data
}

/// Element data with one column per `(name, cells)` pair.
#[must_use]
pub fn columns(columns: &[(&str, Vec<Value>)]) -> ElementData {
  columns
    .iter()
    .map(|(name, cells)| ((*name).to_string(), cells.clone()))
    .collect()
}

#[must_use]
pub fn point_feature(lon: f64, lat: f64) -> Value {
  json!({
    "type": "Feature",
    "properties": {},
    "geometry": {"type": "Point", "coordinates": [lon, lat]}
  })
}

#[must_use]
pub fn line_feature(coords: &[(f64, f64)]) -> Value {
  let coordinates: Vec<Value> = coords.iter().map(|(lon, lat)| json!([lon, lat])).collect();
  json!({
    "type": "Feature",
    "properties": {},
    "geometry": {"type": "LineString", "coordinates": coordinates}
  })
}

#[must_use]
pub fn polygon_feature(ring: &[(f64, f64)]) -> Value {
  let ring: Vec<Value> = ring.iter().map(|(lon, lat)| json!([lon, lat])).collect();
  json!({
    "type": "Feature",
    "properties": {"fill-color": "#00ff00"},
    "geometry": {"type": "Polygon", "coordinates": [ring]}
  })
}

/// A single cell holding a serialized `FeatureCollection` of the given features.
#[must_use]
pub fn collection_cell(features: Vec<Value>) -> Value {
  json!(
    json!({
      "type": "FeatureCollection",
      "features": features,
    })
    .to_string()
  )
}
