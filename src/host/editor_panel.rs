use serde::Serialize;
use serde_json::{Value, json};

use crate::{
  config::{BASE_LAYER_KEYS, PointType, SCATTER_LAYER_KEY},
  map::renderer::DEFAULT_BASEMAP,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
  Text,
  Toggle,
  Dropdown,
  Color,
  Element,
  Column,
  Variable,
  Group,
}

/// One field of the configuration form the host renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorField {
  pub name: String,
  #[serde(rename = "type")]
  pub field_type: FieldType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  /// The element a column field picks from, or the group a field belongs to.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_value: Option<Value>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub values: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub allow_multiple: Option<bool>,
}

impl EditorField {
  #[must_use]
  pub fn new(name: &str, field_type: FieldType) -> Self {
    Self {
      name: name.to_string(),
      field_type,
      label: None,
      source: None,
      default_value: None,
      values: Vec::new(),
      allow_multiple: None,
    }
  }

  #[must_use]
  pub fn with_label(mut self, label: &str) -> Self {
    self.label = Some(label.to_string());
    self
  }

  #[must_use]
  pub fn with_source(mut self, source: &str) -> Self {
    self.source = Some(source.to_string());
    self
  }

  #[must_use]
  pub fn with_default(mut self, value: Value) -> Self {
    self.default_value = Some(value);
    self
  }

  #[must_use]
  pub fn with_values(mut self, values: &[&str]) -> Self {
    self.values = values.iter().map(ToString::to_string).collect();
    self
  }

  /// A column field picking a single column of `source`.
  #[must_use]
  pub fn single_column(name: &str, source: &str) -> Self {
    Self {
      allow_multiple: Some(false),
      ..Self::new(name, FieldType::Column).with_source(source)
    }
  }
}

fn point_type_dropdown(name: &str) -> EditorField {
  let values: Vec<&str> = PointType::all().iter().map(PointType::name).collect();
  EditorField::new(name, FieldType::Dropdown)
    .with_label("Point Type")
    .with_values(&values)
    .with_default(json!(PointType::default().name()))
}

fn layer_fields(index: usize, key: &str) -> Vec<EditorField> {
  let n = index + 1;
  vec![
    EditorField::new(key, FieldType::Element),
    EditorField::single_column(&format!("{key}Geometry"), key).with_label("Geometry"),
    EditorField::new(&format!("{key}Title"), FieldType::Text)
      .with_source(key)
      .with_label("Layer Title")
      .with_default(json!(format!("Layer {n}"))),
    EditorField::new(&format!("animateLines{n}"), FieldType::Toggle)
      .with_source(key)
      .with_label("Animate Lines")
      .with_default(json!(false)),
    EditorField::new(&format!("fillPolygons{n}"), FieldType::Toggle)
      .with_source(key)
      .with_label("Fill Polygons")
      .with_default(json!(false)),
    point_type_dropdown(&format!("pointType{n}")).with_source(key),
  ]
}

fn scatter_fields() -> Vec<EditorField> {
  let group = SCATTER_LAYER_KEY;
  vec![
    EditorField::new(group, FieldType::Group).with_label("Scatter Layer"),
    EditorField::new("scatterLayerEnabled", FieldType::Toggle)
      .with_source(group)
      .with_label("Enable Scatter Layer")
      .with_default(json!(false)),
    EditorField::new("scatterLayerTitle", FieldType::Text)
      .with_source(group)
      .with_label("Layer Title")
      .with_default(json!("Scatter Layer")),
    EditorField::new("scatterSource", FieldType::Element)
      .with_source(group)
      .with_label("Scatter Source"),
    EditorField::single_column("scatterLatitude", "scatterSource").with_label("Latitude"),
    EditorField::single_column("scatterLongitude", "scatterSource").with_label("Longitude"),
    EditorField::single_column("scatterLegend", "scatterSource").with_label("Legend (optional)"),
    point_type_dropdown("scatterPointType").with_source(group),
    EditorField::new("filterLatitude", FieldType::Variable)
      .with_source(group)
      .with_label("Filter Latitude Variable"),
    EditorField::new("filterLongitude", FieldType::Variable)
      .with_source(group)
      .with_label("Filter Longitude Variable"),
  ]
}

fn theme_fields() -> Vec<EditorField> {
  vec![
    EditorField::new("theme", FieldType::Group).with_label("Theme"),
    EditorField::new("menuBackgroundColor", FieldType::Color)
      .with_source("theme")
      .with_label("Menu Background Color"),
    EditorField::new("menuTextColor", FieldType::Color)
      .with_source("theme")
      .with_label("Menu Text Color"),
    EditorField::new("menuTextHoverColor", FieldType::Color)
      .with_source("theme")
      .with_label("Menu Text Color (Hover)"),
  ]
}

/// The configuration form of the plugin. Its names are the keys `PluginConfig` reads.
#[must_use]
pub fn editor_panel_definition() -> Vec<EditorField> {
  let mut fields = vec![
    EditorField::new("basemapUrl", FieldType::Text)
      .with_label("Basemap Style URL")
      .with_default(json!(DEFAULT_BASEMAP)),
    EditorField::new("clusterPoints", FieldType::Toggle)
      .with_label("Cluster Points")
      .with_default(json!(false)),
  ];
  for (index, key) in BASE_LAYER_KEYS.iter().enumerate() {
    fields.extend(layer_fields(index, key));
  }
  fields.extend(scatter_fields());
  fields.push(EditorField::new("legend", FieldType::Element).with_label("Legend"));
  fields.push(EditorField::single_column("legendHtml", "legend").with_label("Legend HTML"));
  fields.extend(theme_fields());
  fields
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{HostConfig, PluginConfig};

  #[test]
  fn field_names_are_unique() {
    let fields = editor_panel_definition();
    let mut names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), fields.len());
  }

  #[test]
  fn defaults_match_the_typed_configuration() {
    let defaults: HostConfig = editor_panel_definition()
      .into_iter()
      .filter_map(|field| Some((field.name, field.default_value?)))
      .collect();
    assert_eq!(PluginConfig::from_host(&defaults), PluginConfig::default());
  }

  #[test]
  fn every_column_names_its_element() {
    let fields = editor_panel_definition();
    for field in fields.iter().filter(|f| f.field_type == FieldType::Column) {
      let source = field.source.as_deref().unwrap();
      assert!(
        fields
          .iter()
          .any(|f| f.name == source && f.field_type == FieldType::Element),
        "{} reads from {source}",
        field.name
      );
      assert_eq!(field.allow_multiple, Some(false));
    }
  }

  #[test]
  fn serializes_in_host_form() {
    let field = &editor_panel_definition()[3];
    assert_eq!(
      serde_json::to_value(field).unwrap(),
      json!({
        "name": "layer1Geometry",
        "type": "column",
        "label": "Geometry",
        "source": "layer1",
        "allowMultiple": false
      })
    );
  }
}
