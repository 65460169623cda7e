use std::path::{Path, PathBuf};

use dirs::home_dir;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
  map::renderer::DEFAULT_BASEMAP,
  parser::{DERIVED_GEOMETRY_COLUMN, ScatterColumns},
};

/// The flat key/value configuration delivered by the host.
pub type HostConfig = Map<String, Value>;

pub const BASE_LAYER_KEYS: [&str; 4] = ["layer1", "layer2", "layer3", "layer4"];
pub const SCATTER_LAYER_KEY: &str = "scatterLayer";

/// Whether `key` names one of the layer slots.
#[must_use]
pub fn is_layer_key(key: &str) -> bool {
  key == SCATTER_LAYER_KEY || BASE_LAYER_KEYS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PointType {
  #[default]
  Circle,
  Icon,
}

impl PointType {
  #[must_use]
  pub fn name(&self) -> &'static str {
    match self {
      PointType::Circle => "Circle",
      PointType::Icon => "Icon",
    }
  }

  #[must_use]
  pub fn all() -> &'static [PointType] {
    &[PointType::Circle, PointType::Icon]
  }

  fn from_value(value: Option<&Value>) -> Self {
    match value.and_then(Value::as_str) {
      Some("Icon") => PointType::Icon,
      _ => PointType::Circle,
    }
  }
}

/// Rendering configuration of one layer slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
  pub key: String,
  pub title: String,
  pub animate_lines: bool,
  pub fill_polygons: bool,
  pub point_type: PointType,
  /// Global flag, carried per layer since it is part of every layer's render state.
  pub cluster_points: bool,
  #[serde(rename = "element")]
  pub source_element_id: Option<String>,
  pub geometry_column: Option<String>,
  /// Source columns of the derived scatter layer.
  pub columns: Option<ScatterColumns>,
}

impl LayerConfig {
  #[must_use]
  pub fn new(key: &str, title: &str) -> Self {
    Self {
      key: key.to_string(),
      title: title.to_string(),
      animate_lines: false,
      fill_polygons: false,
      point_type: PointType::Circle,
      cluster_points: false,
      source_element_id: None,
      geometry_column: None,
      columns: None,
    }
  }

  #[must_use]
  pub fn with_animate_lines(mut self, animate_lines: bool) -> Self {
    self.animate_lines = animate_lines;
    self
  }

  #[must_use]
  pub fn with_fill_polygons(mut self, fill_polygons: bool) -> Self {
    self.fill_polygons = fill_polygons;
    self
  }

  #[must_use]
  pub fn with_point_type(mut self, point_type: PointType) -> Self {
    self.point_type = point_type;
    self
  }

  #[must_use]
  pub fn with_cluster_points(mut self, cluster_points: bool) -> Self {
    self.cluster_points = cluster_points;
    self
  }

  #[must_use]
  pub fn with_element(mut self, element: &str) -> Self {
    self.source_element_id = Some(element.to_string());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MenuTheme {
  pub background_color: Option<String>,
  pub text_color: Option<String>,
  pub text_hover_color: Option<String>,
}

/// Typed view over the host configuration. Unknown keys are ignored, missing keys take the
/// editor panel defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
  pub basemap_url: String,
  pub cluster_points: bool,
  pub layers: Vec<LayerConfig>,
  pub scatter_enabled: bool,
  pub scatter_title: String,
  pub scatter_source: Option<String>,
  pub scatter_columns: ScatterColumns,
  pub scatter_point_type: PointType,
  pub filter_latitude: Option<String>,
  pub filter_longitude: Option<String>,
  pub legend: Option<String>,
  pub legend_html: Option<String>,
  pub theme: MenuTheme,
}

fn truthy(value: Option<&Value>) -> bool {
  match value {
    None | Some(Value::Null) => false,
    Some(Value::Bool(b)) => *b,
    Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0. && !n.is_nan()),
    Some(Value::String(s)) => !s.is_empty(),
    Some(Value::Array(_) | Value::Object(_)) => true,
  }
}

fn string(config: &HostConfig, key: &str) -> Option<String> {
  config
    .get(key)
    .and_then(Value::as_str)
    .map(ToString::to_string)
}

impl PluginConfig {
  #[must_use]
  pub fn from_host(config: &HostConfig) -> Self {
    let cluster_points = truthy(config.get("clusterPoints"));
    let layers = BASE_LAYER_KEYS
      .iter()
      .enumerate()
      .map(|(index, key)| {
        let n = index + 1;
        LayerConfig {
          key: (*key).to_string(),
          title: string(config, &format!("{key}Title")).unwrap_or_else(|| format!("Layer {n}")),
          animate_lines: truthy(config.get(&format!("animateLines{n}"))),
          fill_polygons: truthy(config.get(&format!("fillPolygons{n}"))),
          point_type: PointType::from_value(config.get(&format!("pointType{n}"))),
          cluster_points,
          source_element_id: string(config, key),
          geometry_column: string(config, &format!("{key}Geometry")),
          columns: None,
        }
      })
      .collect();

    Self {
      basemap_url: string(config, "basemapUrl")
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_BASEMAP.to_string()),
      cluster_points,
      layers,
      scatter_enabled: truthy(config.get("scatterLayerEnabled")),
      scatter_title: string(config, "scatterLayerTitle")
        .unwrap_or_else(|| "Scatter Layer".to_string()),
      scatter_source: string(config, "scatterSource"),
      scatter_columns: ScatterColumns {
        latitude: string(config, "scatterLatitude"),
        longitude: string(config, "scatterLongitude"),
        legend: string(config, "scatterLegend"),
      },
      scatter_point_type: PointType::from_value(config.get("scatterPointType")),
      filter_latitude: string(config, "filterLatitude"),
      filter_longitude: string(config, "filterLongitude"),
      legend: string(config, "legend"),
      legend_html: string(config, "legendHtml"),
      theme: MenuTheme {
        background_color: string(config, "menuBackgroundColor"),
        text_color: string(config, "menuTextColor"),
        text_hover_color: string(config, "menuTextHoverColor"),
      },
    }
  }

  /// The derived scatter layer, present only while enabled.
  #[must_use]
  pub fn scatter_layer(&self) -> Option<LayerConfig> {
    self.scatter_enabled.then(|| LayerConfig {
      key: SCATTER_LAYER_KEY.to_string(),
      title: self.scatter_title.clone(),
      animate_lines: false,
      fill_polygons: false,
      point_type: self.scatter_point_type,
      cluster_points: self.cluster_points,
      source_element_id: self.scatter_source.clone(),
      geometry_column: Some(DERIVED_GEOMETRY_COLUMN.to_string()),
      columns: Some(self.scatter_columns.clone()),
    })
  }

  /// The four base layers followed by the scatter layer when enabled.
  #[must_use]
  pub fn layer_configs(&self) -> Vec<LayerConfig> {
    self
      .layers
      .iter()
      .cloned()
      .chain(self.scatter_layer())
      .collect()
  }

  /// Stable fingerprint of everything that invalidates the materialized layers when changed.
  #[must_use]
  pub fn signature(&self) -> String {
    json!({
      "clusterPoints": self.cluster_points,
      "layers": self
        .layer_configs()
        .iter()
        .map(|layer| json!({
          "key": layer.key,
          "element": layer.source_element_id,
          "geometryColumn": layer.geometry_column,
          "title": layer.title,
          "animateLines": layer.animate_lines,
          "fillPolygons": layer.fill_polygons,
          "pointType": layer.point_type.name(),
          "columns": layer.columns,
        }))
        .collect::<Vec<_>>(),
    })
    .to_string()
  }
}

impl Default for PluginConfig {
  fn default() -> Self {
    Self::from_host(&HostConfig::new())
  }
}

/// Local configuration layered over what the host delivers, for development runs.
///
/// Read from the file named by `MAPSYNC_CONFIG`, else `~/.config/mapsync/config.json5`.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverlay {
  pub path: Option<PathBuf>,
  pub values: HostConfig,
}

impl ConfigOverlay {
  #[must_use]
  pub fn new() -> Self {
    let path = Self::path();
    let values = path
      .as_ref()
      .and_then(|path| Self::from_file(path))
      .unwrap_or_default();
    Self { path, values }
  }

  fn path() -> Option<PathBuf> {
    std::env::var("MAPSYNC_CONFIG")
      .ok()
      .map(PathBuf::from)
      .or_else(|| home_dir().map(|p| p.join(".config").join("mapsync").join("config.json5")))
  }

  fn from_file(path: &Path) -> Option<HostConfig> {
    if !path.exists() {
      return None;
    }
    let contents = std::fs::read_to_string(path)
      .inspect_err(|e| error!("Failed to read config overlay {}: {e}", path.display()))
      .ok()?;
    let values: HostConfig = json5::from_str(&contents)
      .inspect_err(|e| error!("Failed to parse config overlay {}: {e}", path.display()))
      .ok()?;
    info!("Loaded config overlay from {}", path.display());
    Some(values)
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// `base` with every overlay key replacing the host's value.
  #[must_use]
  pub fn apply(&self, base: &HostConfig) -> HostConfig {
    let mut merged = base.clone();
    for (key, value) in &self.values {
      merged.insert(key.clone(), value.clone());
    }
    merged
  }
}
