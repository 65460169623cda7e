use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Feature properties, e.g. `line-color` or `pin_type`.
pub type Properties = Map<String, Value>;

/// Identifier of a feature, either given by the data or generated by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
  Number(u64),
  String(String),
}

impl FeatureId {
  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_u64().map(FeatureId::Number),
      Value::String(s) => Some(FeatureId::String(s.clone())),
      _ => None,
    }
  }

  fn to_value(&self) -> Value {
    match self {
      FeatureId::Number(n) => json!(n),
      FeatureId::String(s) => json!(s),
    }
  }
}

impl Display for FeatureId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FeatureId::Number(n) => write!(f, "{n}"),
      FeatureId::String(s) => write!(f, "{s}"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
  Point,
  MultiPoint,
  LineString,
  MultiLineString,
  Polygon,
  MultiPolygon,
  GeometryCollection,
}

/// A GeoJSON geometry. Coordinates are kept as raw JSON since the renderer consumes them as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
  #[serde(rename = "type")]
  pub kind: GeometryKind,
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub coordinates: Value,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub geometries: Vec<Geometry>,
}

impl Geometry {
  #[must_use]
  pub fn point(lon: f64, lat: f64) -> Self {
    Self {
      kind: GeometryKind::Point,
      coordinates: json!([lon, lat]),
      geometries: Vec::new(),
    }
  }

  /// Parses a geometry object. Unknown geometry types yield `None`.
  #[must_use]
  pub fn from_value(value: &Value) -> Option<Self> {
    serde_json::from_value(value.clone()).ok()
  }
}

/// A GeoJSON feature.
///
/// `source` is only set on features handed out by the renderer (hits and query results) and
/// names the renderer source the feature lives in, which is needed to address its feature-state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
  pub id: Option<FeatureId>,
  pub properties: Properties,
  pub geometry: Option<Geometry>,
  pub source: Option<String>,
}

impl Feature {
  #[must_use]
  pub fn new(geometry: Geometry, properties: Properties) -> Self {
    Self {
      id: None,
      properties,
      geometry: Some(geometry),
      source: None,
    }
  }

  #[must_use]
  pub fn with_id(mut self, id: FeatureId) -> Self {
    self.id = Some(id);
    self
  }

  #[must_use]
  pub fn with_source(mut self, source: &str) -> Self {
    self.source = Some(source.to_string());
    self
  }

  /// Reads a GeoJSON `Feature` object. `properties: null` is treated as empty properties.
  #[must_use]
  pub fn from_value(value: &Value) -> Option<Self> {
    let obj = value.as_object()?;
    if obj.get("type").and_then(Value::as_str) != Some("Feature") {
      return None;
    }
    Some(Self {
      id: obj.get("id").and_then(FeatureId::from_value),
      properties: obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default(),
      geometry: obj.get("geometry").and_then(Geometry::from_value),
      source: None,
    })
  }

  #[must_use]
  pub fn to_value(&self) -> Value {
    let mut obj = Map::new();
    obj.insert("type".to_string(), json!("Feature"));
    if let Some(id) = &self.id {
      obj.insert("id".to_string(), id.to_value());
    }
    obj.insert("properties".to_string(), Value::Object(self.properties.clone()));
    obj.insert(
      "geometry".to_string(),
      self
        .geometry
        .as_ref()
        .and_then(|g| serde_json::to_value(g).ok())
        .unwrap_or(Value::Null),
    );
    Value::Object(obj)
  }

  #[must_use]
  pub fn kind(&self) -> Option<GeometryKind> {
    self.geometry.as_ref().map(|g| g.kind)
  }

  /// The `[lon, lat]` position of a point feature.
  #[must_use]
  pub fn point(&self) -> Option<[f64; 2]> {
    let geometry = self.geometry.as_ref()?;
    if geometry.kind != GeometryKind::Point {
      return None;
    }
    let coords = geometry.coordinates.as_array()?;
    if coords.len() < 2 {
      return None;
    }
    Some([coords[0].as_f64()?, coords[1].as_f64()?])
  }

  /// Clustered features carry a `cluster` flag or a `point_count`.
  #[must_use]
  pub fn is_cluster(&self) -> bool {
    self
      .properties
      .get("cluster")
      .and_then(Value::as_bool)
      .unwrap_or(false)
      || self.properties.contains_key("point_count")
  }

  /// Stable key used to track a feature in a selection: its id, else its serialized coordinates.
  #[must_use]
  pub fn selection_key(&self) -> String {
    if let Some(id) = &self.id {
      return id.to_string();
    }
    self
      .geometry
      .as_ref()
      .map(|g| g.coordinates.to_string())
      .unwrap_or_default()
  }
}

/// A GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureCollection {
  pub features: Vec<Feature>,
}

impl FeatureCollection {
  #[must_use]
  pub fn new(features: Vec<Feature>) -> Self {
    Self { features }
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.features.len()
  }

  #[must_use]
  pub fn to_value(&self) -> Value {
    json!({
      "type": "FeatureCollection",
      "features": self.features.iter().map(Feature::to_value).collect::<Vec<_>>(),
    })
  }
}
