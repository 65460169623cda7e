use std::hash::{DefaultHasher, Hash, Hasher};

use itertools::Itertools;
use serde_json::{Value, json};

use super::ElementData;
use crate::{
  map::feature::{Feature, FeatureCollection, Geometry, GeometryKind},
  profile_scope,
};

/// The features of one layer, split the way the renderer draws them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFeatureSet {
  /// Lines and polygons. Polygons are drawn as outlines and optionally filled.
  pub line_features: Vec<Feature>,
  pub point_features: Vec<Feature>,
  pub has_polygons: bool,
  /// Hash over the parsed documents the features were extracted from.
  pub content_hash: u64,
}

impl ExtractedFeatureSet {
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.line_features.is_empty() && self.point_features.is_empty()
  }

  #[must_use]
  pub fn lines(&self) -> FeatureCollection {
    FeatureCollection::new(self.line_features.clone())
  }

  #[must_use]
  pub fn points(&self) -> FeatureCollection {
    FeatureCollection::new(self.point_features.clone())
  }

  fn classify(&mut self, feature: Feature) {
    let Some(kind) = feature.kind() else {
      return;
    };
    match kind {
      GeometryKind::Point => self.point_features.push(feature),
      GeometryKind::MultiPoint => {
        let coordinates = feature
          .geometry
          .as_ref()
          .and_then(|g| g.coordinates.as_array())
          .cloned()
          .unwrap_or_default();
        for coordinate in coordinates {
          let geometry = Geometry {
            kind: GeometryKind::Point,
            coordinates: coordinate,
            geometries: Vec::new(),
          };
          self
            .point_features
            .push(Feature::new(geometry, feature.properties.clone()));
        }
      }
      GeometryKind::LineString | GeometryKind::MultiLineString => self.line_features.push(feature),
      GeometryKind::Polygon | GeometryKind::MultiPolygon => {
        self.has_polygons = true;
        self.line_features.push(feature);
      }
      GeometryKind::GeometryCollection => {
        log::debug!("Skipping nested geometry collection");
      }
    }
  }
}

/// Parses a single cell. Strings are JSON documents, objects are taken as they are.
fn safe_parse(cell: &Value) -> Option<Value> {
  match cell {
    Value::String(s) if s.is_empty() => None,
    Value::String(s) => serde_json::from_str(s)
      .inspect_err(|e| log::warn!("Failed to parse geometry cell: {e}"))
      .ok(),
    Value::Object(_) => Some(cell.clone()),
    _ => None,
  }
}

/// Collects the GeoJSON documents of all columns of an element.
#[must_use]
pub fn extract_geojsons(element_data: &ElementData) -> Vec<Value> {
  element_data
    .values()
    .flatten()
    .filter_map(safe_parse)
    .filter(|v| !v.is_null())
    .collect()
}

/// Flattens a GeoJSON document into standard features.
#[must_use]
pub fn flatten_features(document: &Value) -> Vec<Feature> {
  let Some(obj) = document.as_object() else {
    return Vec::new();
  };

  match obj.get("type").and_then(Value::as_str) {
    Some("FeatureCollection") => obj
      .get("features")
      .and_then(Value::as_array)
      .map(|features| features.iter().flat_map(flatten_features).collect())
      .unwrap_or_default(),
    Some("Feature") => {
      let Some(feature) = Feature::from_value(document) else {
        return Vec::new();
      };
      match &feature.geometry {
        None => Vec::new(),
        Some(geometry) if geometry.kind == GeometryKind::GeometryCollection => geometry
          .geometries
          .iter()
          .map(|inner| Feature::new(inner.clone(), feature.properties.clone()))
          .collect(),
        Some(_) => vec![feature],
      }
    }
    Some(_) if obj.contains_key("coordinates") => {
      let wrapped = json!({
        "type": "Feature",
        "properties": {},
        "geometry": document,
      });
      Feature::from_value(&wrapped)
        .filter(|f| f.geometry.is_some())
        .into_iter()
        .collect()
    }
    _ => Vec::new(),
  }
}

fn hash_documents(documents: &[Value]) -> u64 {
  let mut hasher = DefaultHasher::new();
  for document in documents {
    document.to_string().hash(&mut hasher);
  }
  documents.len().hash(&mut hasher);
  hasher.finish()
}

/// Extracts and classifies the features of an element. Malformed cells and unknown geometries are
/// skipped; exact duplicate features are dropped.
#[must_use]
pub fn extract_features(element_data: &ElementData) -> ExtractedFeatureSet {
  profile_scope!("extract_features");
  let documents = extract_geojsons(element_data);
  let mut set = ExtractedFeatureSet {
    content_hash: hash_documents(&documents),
    ..ExtractedFeatureSet::default()
  };

  documents
    .iter()
    .flat_map(flatten_features)
    .unique_by(|f| f.to_value().to_string())
    .for_each(|f| set.classify(f));

  set
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::test_utils::{element_data, line_feature, point_feature};

  #[test]
  fn unparseable_cells_are_skipped() {
    let data = element_data(
      "geometry",
      vec![
        json!("{not json"),
        json!(""),
        json!(line_feature(&[(0.0, 0.0), (1.0, 1.0)]).to_string()),
      ],
    );
    let set = extract_features(&data);
    assert_eq!(set.line_features.len(), 1);
    assert!(set.point_features.is_empty());
  }

  #[test]
  fn feature_collections_are_flattened() {
    let collection = json!({
      "type": "FeatureCollection",
      "features": [
        point_feature(1.0, 2.0),
        {
          "type": "FeatureCollection",
          "features": [line_feature(&[(0.0, 0.0), (1.0, 1.0)])]
        }
      ]
    });
    let features = flatten_features(&collection);
    assert_eq!(features.len(), 2);
  }

  #[test]
  fn bare_geometry_is_wrapped() {
    let features = flatten_features(&json!({"type": "Point", "coordinates": [5.0, 6.0]}));
    assert_eq!(features.len(), 1);
    assert!(features[0].properties.is_empty());
    assert_eq!(features[0].point(), Some([5.0, 6.0]));
  }

  #[test]
  fn geometry_collection_inherits_properties() {
    let feature = json!({
      "type": "Feature",
      "properties": {"line-color": "#123456"},
      "geometry": {
        "type": "GeometryCollection",
        "geometries": [
          {"type": "Point", "coordinates": [1.0, 1.0]},
          {"type": "LineString", "coordinates": [[0.0, 0.0], [2.0, 2.0]]}
        ]
      }
    });
    let features = flatten_features(&feature);
    assert_eq!(features.len(), 2);
    assert!(
      features
        .iter()
        .all(|f| f.properties.get("line-color") == Some(&json!("#123456")))
    );
  }

  #[test]
  fn multipoint_expands_into_points() {
    let data = element_data(
      "geometry",
      vec![json!({
        "type": "Feature",
        "properties": {"pin_type": "Ship"},
        "geometry": {"type": "MultiPoint", "coordinates": [[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]}
      })],
    );
    let set = extract_features(&data);
    assert_eq!(set.point_features.len(), 3);
    assert!(
      set
        .point_features
        .iter()
        .all(|f| f.properties.get("pin_type") == Some(&json!("Ship")))
    );
  }

  #[test]
  fn polygons_go_to_the_line_set() {
    let data = element_data(
      "geometry",
      vec![json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
      })],
    );
    let set = extract_features(&data);
    assert!(set.has_polygons);
    assert_eq!(set.line_features.len(), 1);
  }

  #[test]
  fn unknown_geometries_are_ignored() {
    let data = element_data(
      "geometry",
      vec![json!({"type": "Feature", "properties": {}, "geometry": {"type": "Blob", "coordinates": []}})],
    );
    assert!(extract_features(&data).is_empty());
  }

  #[test]
  fn duplicates_are_dropped() {
    let cell = json!(point_feature(1.0, 2.0).to_string());
    let data = element_data("geometry", vec![cell.clone(), cell]);
    assert_eq!(extract_features(&data).point_features.len(), 1);
  }

  #[test]
  fn hash_follows_content() {
    let a = element_data("geometry", vec![point_feature(1.0, 2.0)]);
    let b = element_data("geometry", vec![point_feature(1.0, 3.0)]);
    assert_eq!(
      extract_features(&a).content_hash,
      extract_features(&a.clone()).content_hash
    );
    assert_ne!(
      extract_features(&a).content_hash,
      extract_features(&b).content_hash
    );
  }
}
