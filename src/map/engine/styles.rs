use serde_json::{Value, json};

use super::animation::DASH_SEQUENCE;
use crate::{
  config::PointType,
  map::{
    feature::FeatureCollection,
    renderer::{ClusterSpec, LayerKind, LayerSpec, SourceSpec},
  },
};

const LINE_COLOR: &str = "#3d293d";
const LINE_WIDTH: f64 = 2.;
const FILL_COLOR: &str = "#f59a23";
const FILL_OPACITY: f64 = 0.35;

/// Prefixes of every sub-layer the engine creates.
pub const LAYER_PREFIXES: [&str; 6] = [
  "line-background-",
  "line-dashed-",
  "polygon-fill-layer-",
  "point-layer-",
  "point-cluster-layer-",
  "point-cluster-count-layer-",
];

/// Prefixes of every source the engine creates.
pub const SOURCE_PREFIXES: [&str; 2] = ["line-", "point-"];

/// Source and sub-layer ids of one layer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerIds {
  pub line_source: String,
  pub line_background: String,
  pub line_dashed: String,
  pub polygon_fill: String,
  pub point_source: String,
  pub point_layer: String,
  pub point_cluster: String,
  pub point_cluster_count: String,
}

impl LayerIds {
  #[must_use]
  pub fn new(key: &str) -> Self {
    Self {
      line_source: format!("line-{key}"),
      line_background: format!("line-background-{key}"),
      line_dashed: format!("line-dashed-{key}"),
      polygon_fill: format!("polygon-fill-layer-{key}"),
      point_source: format!("point-{key}"),
      point_layer: format!("point-layer-{key}"),
      point_cluster: format!("point-cluster-layer-{key}"),
      point_cluster_count: format!("point-cluster-count-layer-{key}"),
    }
  }

  /// Every sub-layer id, lines first.
  #[must_use]
  pub fn layers(&self) -> [&str; 6] {
    [
      self.line_background.as_str(),
      self.line_dashed.as_str(),
      self.polygon_fill.as_str(),
      self.point_layer.as_str(),
      self.point_cluster.as_str(),
      self.point_cluster_count.as_str(),
    ]
  }
}

fn coalesce(property: &str, default: Value) -> Value {
  json!(["coalesce", ["get", property], default])
}

fn not_clustered() -> Value {
  json!(["!", ["has", "point_count"]])
}

fn clustered() -> Value {
  json!(["has", "point_count"])
}

#[must_use]
pub fn line_source(data: FeatureCollection) -> SourceSpec {
  SourceSpec::geojson(data)
    .with_line_metrics()
    .with_generate_id()
}

/// Clustering can only be chosen here, when the source is created.
#[must_use]
pub fn point_source(data: FeatureCollection, cluster_points: bool) -> SourceSpec {
  SourceSpec::geojson(data)
    .with_generate_id()
    .with_cluster(cluster_points.then(ClusterSpec::default))
}

#[must_use]
pub fn line_background(ids: &LayerIds) -> LayerSpec {
  LayerSpec::new(&ids.line_background, LayerKind::Line, &ids.line_source)
    .with_paint("line-color", coalesce("line-color", json!(LINE_COLOR)))
    .with_paint("line-width", coalesce("line-width", json!(LINE_WIDTH)))
    .with_paint("line-opacity", json!(0.4))
}

/// The foreground line. Animated lines start at the first dash pattern.
#[must_use]
pub fn line_foreground(ids: &LayerIds, animated: bool) -> LayerSpec {
  let spec = LayerSpec::new(&ids.line_dashed, LayerKind::Line, &ids.line_source)
    .with_paint("line-color", coalesce("line-color", json!(LINE_COLOR)))
    .with_paint("line-width", coalesce("line-width", json!(LINE_WIDTH)));
  if animated {
    spec
      .with_paint("line-dasharray", json!(DASH_SEQUENCE[0]))
      .with_paint("line-emissive-strength", json!(1))
  } else {
    spec
  }
}

#[must_use]
pub fn polygon_fill(ids: &LayerIds) -> LayerSpec {
  LayerSpec::new(&ids.polygon_fill, LayerKind::Fill, &ids.line_source)
    .with_paint("fill-color", coalesce("fill-color", json!(FILL_COLOR)))
    .with_paint("fill-opacity", coalesce("fill-opacity", json!(FILL_OPACITY)))
}

fn icon_image() -> Value {
  json!([
    "image",
    [
      "case",
      ["==", ["get", "pin_type"], "Factory"], "Factory",
      ["==", ["get", "pin_type"], "Ship"], "Ship",
      ["==", ["get", "pin_type"], "Anchor"], "Anchor",
      ["==", ["get", "pin_type"], "User"], "User",
      "flag"
    ],
    {"params": {"pin_color": ["get", "pin_color"]}}
  ])
}

/// The single sub-layer drawing unclustered points.
#[must_use]
pub fn point_layer(ids: &LayerIds, point_type: PointType, cluster_points: bool) -> LayerSpec {
  let spec = match point_type {
    PointType::Icon => LayerSpec::new(&ids.point_layer, LayerKind::Symbol, &ids.point_source)
      .with_layout("icon-image", icon_image())
      .with_layout("icon-anchor", json!("bottom")),
    PointType::Circle => LayerSpec::new(&ids.point_layer, LayerKind::Circle, &ids.point_source)
      .with_paint("circle-radius", coalesce("circle-radius", json!(4)))
      .with_paint("circle-color", coalesce("circle-color", json!(LINE_COLOR)))
      .with_paint("circle-stroke-width", coalesce("circle-stroke-width", json!(1)))
      .with_paint("circle-stroke-color", coalesce("circle-stroke-color", json!("#ffffff")))
      .with_paint("circle-opacity", coalesce("circle-opacity", json!(0.9))),
  };
  if cluster_points {
    spec.with_filter(not_clustered())
  } else {
    spec
  }
}

#[must_use]
pub fn cluster_bubbles(ids: &LayerIds) -> LayerSpec {
  LayerSpec::new(&ids.point_cluster, LayerKind::Circle, &ids.point_source)
    .with_filter(clustered())
    .with_paint(
      "circle-color",
      json!(["step", ["get", "point_count"], "#51bbd6", 100, "#f1f075", 750, "#f28cb1"]),
    )
    .with_paint(
      "circle-radius",
      json!(["step", ["get", "point_count"], 20, 100, 30, 750, 40]),
    )
    .with_paint("circle-opacity", json!(0.85))
}

#[must_use]
pub fn cluster_count(ids: &LayerIds) -> LayerSpec {
  LayerSpec::new(&ids.point_cluster_count, LayerKind::Symbol, &ids.point_source)
    .with_filter(clustered())
    .with_layout("text-field", json!("{point_count_abbreviated}"))
    .with_layout("text-size", json!(12))
    .with_layout(
      "text-font",
      json!(["DIN Offc Pro Medium", "Arial Unicode MS Bold"]),
    )
    .with_paint("text-color", json!("#ffffff"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_follow_the_key() {
    let ids = LayerIds::new("layer1");
    assert_eq!(ids.line_source, "line-layer1");
    assert_eq!(ids.point_cluster_count, "point-cluster-count-layer-layer1");
    for (id, prefix) in ids.layers().iter().zip(LAYER_PREFIXES) {
      assert!(id.starts_with(prefix));
    }
  }

  #[test]
  fn clustered_points_exclude_clusters() {
    let ids = LayerIds::new("layer2");
    let spec = point_layer(&ids, PointType::Icon, true);
    assert_eq!(spec.kind, LayerKind::Symbol);
    assert_eq!(spec.filter, Some(not_clustered()));
    assert!(point_layer(&ids, PointType::Circle, false).filter.is_none());
  }

  #[test]
  fn only_animated_lines_are_dashed() {
    let ids = LayerIds::new("layer1");
    assert!(line_foreground(&ids, true).paint.contains_key("line-dasharray"));
    assert!(!line_foreground(&ids, false).paint.contains_key("line-dasharray"));
  }

  #[test]
  fn point_source_clusters_on_request() {
    let source = point_source(FeatureCollection::default(), true);
    assert_eq!(source.cluster, Some(ClusterSpec { radius: 50, max_zoom: 14 }));
    assert!(source.generate_id);
    assert!(point_source(FeatureCollection::default(), false).cluster.is_none());
  }
}
