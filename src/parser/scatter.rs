use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::ElementData;
use crate::{
  map::feature::{Feature, FeatureCollection, Geometry},
  profile_scope,
};

/// Colors assigned to legend categories in first-seen order.
pub const CATEGORY_COLORS: [&str; 8] = [
  "#2563eb", "#16a34a", "#f59e0b", "#dc2626", "#7c3aed", "#0ea5e9", "#d946ef", "#f97316",
];

/// Column under which the derived scatter collection is handed to the engine.
pub const DERIVED_GEOMETRY_COLUMN: &str = "__derivedGeometry";

const NO_CATEGORY: &str = "__default__";

/// The columns the scatter points are built from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScatterColumns {
  pub latitude: Option<String>,
  pub longitude: Option<String>,
  pub legend: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterStyle {
  pub point_radius: f64,
  pub point_stroke_width: f64,
  pub point_stroke_color: String,
  pub palette: Vec<String>,
}

impl Default for ScatterStyle {
  fn default() -> Self {
    Self {
      point_radius: 6.,
      point_stroke_width: 1.,
      point_stroke_color: "#111827".to_string(),
      palette: CATEGORY_COLORS.iter().map(ToString::to_string).collect(),
    }
  }
}

/// One row of the scatter legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
  pub label: String,
  pub color: String,
}

/// Normalizes a cell into a flat list of primitive values.
///
/// Strings holding a JSON array are unpacked, strings holding a JSON scalar are parsed, and any
/// other string is kept as trimmed text.
#[must_use]
pub fn normalize_cell(cell: &Value) -> Vec<Value> {
  match cell {
    Value::Null | Value::Object(_) => Vec::new(),
    Value::Array(values) => values.clone(),
    Value::Number(_) | Value::Bool(_) => vec![cell.clone()],
    Value::String(s) => {
      let trimmed = s.trim();
      if trimmed.is_empty() {
        return Vec::new();
      }
      match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(values)) => values,
        Ok(Value::Null) => Vec::new(),
        Ok(parsed) => vec![parsed],
        Err(_) => vec![Value::String(trimmed.to_string())],
      }
    }
  }
}

fn column_values(element_data: &ElementData, column: &str) -> Option<Vec<Value>> {
  element_data.get(column).map(|cells| {
    cells
      .iter()
      .flat_map(normalize_cell)
      .filter(|v| !v.is_null())
      .collect()
  })
}

/// Strict numeric parsing: finite numbers and strings that are entirely a finite number.
fn to_number(value: &Value) -> Option<f64> {
  let number = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => {
      let trimmed = s.trim();
      if trimmed.is_empty() {
        return None;
      }
      trimmed.parse::<f64>().ok()?
    }
    _ => return None,
  };
  number.is_finite().then_some(number)
}

fn category_key(legend: Option<&Value>) -> String {
  match legend {
    None | Some(Value::Null) => NO_CATEGORY.to_string(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
  }
}

/// Per-pass assignment of palette colors to categories.
struct CategoryColors<'a> {
  palette: &'a [String],
  cache: HashMap<String, String>,
}

impl<'a> CategoryColors<'a> {
  fn new(palette: &'a [String]) -> Self {
    Self {
      palette,
      cache: HashMap::new(),
    }
  }

  fn color(&mut self, key: String) -> String {
    let next = self.cache.len();
    let palette = self.palette;
    self
      .cache
      .entry(key)
      .or_insert_with(|| {
        palette
          .get(next % palette.len().max(1))
          .cloned()
          .unwrap_or_else(|| CATEGORY_COLORS[0].to_string())
      })
      .clone()
  }
}

/// Builds point features from independent latitude, longitude and legend columns.
///
/// The n-th latitude is paired with the n-th longitude; pairs with a non-numeric coordinate are
/// dropped. Returns `None` when the columns are not configured, missing, or no point survives.
#[must_use]
pub fn derive_scatter_feature_collection(
  element_data: &ElementData,
  columns: &ScatterColumns,
  style: &ScatterStyle,
) -> Option<FeatureCollection> {
  profile_scope!("derive_scatter_feature_collection");
  let latitudes = column_values(element_data, columns.latitude.as_deref()?)?;
  let longitudes = column_values(element_data, columns.longitude.as_deref()?)?;
  if latitudes.is_empty() || longitudes.is_empty() {
    return None;
  }
  let legends = columns
    .legend
    .as_deref()
    .and_then(|column| column_values(element_data, column))
    .unwrap_or_default();

  let mut colors = CategoryColors::new(&style.palette);
  let features: Vec<Feature> = latitudes
    .iter()
    .zip(&longitudes)
    .enumerate()
    .filter_map(|(index, (lat, lon))| {
      let latitude = to_number(lat)?;
      let longitude = to_number(lon)?;
      let legend = legends.get(index);
      let color = colors.color(category_key(legend));

      let mut properties = Map::new();
      properties.insert("legend".to_string(), legend.cloned().unwrap_or(Value::Null));
      properties.insert("circle-color".to_string(), json!(color));
      properties.insert("circle-radius".to_string(), json!(style.point_radius));
      properties.insert(
        "circle-stroke-width".to_string(),
        json!(style.point_stroke_width),
      );
      properties.insert(
        "circle-stroke-color".to_string(),
        json!(style.point_stroke_color),
      );
      properties.insert("circle-opacity".to_string(), json!(0.9));
      properties.insert("pin_type".to_string(), json!("User"));
      properties.insert("pin_color".to_string(), json!(color));

      Some(Feature::new(Geometry::point(longitude, latitude), properties))
    })
    .collect();

  if features.is_empty() {
    return None;
  }
  Some(FeatureCollection::new(features))
}

/// Legend rows of a derived collection, one per category in first-seen order.
#[must_use]
pub fn legend_entries(collection: &FeatureCollection) -> Vec<LegendEntry> {
  collection
    .features
    .iter()
    .map(|feature| {
      let label = match feature.properties.get("legend") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Null | Value::String(_)) | None => "Value".to_string(),
        Some(other) => other.to_string(),
      };
      let color = feature
        .properties
        .get("circle-color")
        .and_then(Value::as_str)
        .unwrap_or(CATEGORY_COLORS[0])
        .to_string();
      LegendEntry { label, color }
    })
    .unique_by(|entry| entry.label.clone())
    .collect()
}

/// Wraps a derived collection as element data for the synchronization engine.
#[must_use]
pub fn to_element_data(collection: Option<&FeatureCollection>) -> ElementData {
  let mut data = ElementData::new();
  if let Some(collection) = collection {
    data.insert(
      DERIVED_GEOMETRY_COLUMN.to_string(),
      vec![Value::String(collection.to_value().to_string())],
    );
  }
  data
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::{extract_features, test_utils::columns};
  use rstest::rstest;

  fn scatter_columns(legend: bool) -> ScatterColumns {
    ScatterColumns {
      latitude: Some("latitude".to_string()),
      longitude: Some("longitude".to_string()),
      legend: legend.then(|| "legend".to_string()),
    }
  }

  #[rstest]
  #[case(json!(null), vec![])]
  #[case(json!(4.5), vec![json!(4.5)])]
  #[case(json!(true), vec![json!(true)])]
  #[case(json!("  "), vec![])]
  #[case(json!("[1, 2]"), vec![json!(1), json!(2)])]
  #[case(json!("\"West\""), vec![json!("West")])]
  #[case(json!("null"), vec![])]
  #[case(json!(" abc "), vec![json!("abc")])]
  #[case(json!(["a", "b"]), vec![json!("a"), json!("b")])]
  fn normalizes_cells(#[case] cell: Value, #[case] expected: Vec<Value>) {
    assert_eq!(normalize_cell(&cell), expected);
  }

  #[test]
  fn drops_non_numeric_pairs_and_colors_by_first_seen() {
    let data = columns(&[
      ("latitude", vec![json!("1"), json!("2"), json!("x")]),
      ("longitude", vec![json!("10"), json!("20"), json!("30")]),
      ("legend", vec![json!("A"), json!("B"), json!("A")]),
    ]);
    let collection =
      derive_scatter_feature_collection(&data, &scatter_columns(true), &ScatterStyle::default())
        .unwrap();

    assert_eq!(collection.len(), 2);
    let first = &collection.features[0];
    let second = &collection.features[1];
    assert_eq!(first.properties["legend"], json!("A"));
    assert_eq!(first.properties["circle-color"], json!(CATEGORY_COLORS[0]));
    assert_eq!(second.properties["legend"], json!("B"));
    assert_eq!(second.properties["circle-color"], json!(CATEGORY_COLORS[1]));
    assert_eq!(first.point(), Some([10.0, 1.0]));

    let again =
      derive_scatter_feature_collection(&data, &scatter_columns(true), &ScatterStyle::default())
        .unwrap();
    assert_eq!(again, collection);
  }

  #[test]
  fn pairs_up_to_the_shorter_column() {
    let data = columns(&[
      ("latitude", vec![json!("[1, 2, 3]")]),
      ("longitude", vec![json!(10), json!(20)]),
    ]);
    let collection =
      derive_scatter_feature_collection(&data, &scatter_columns(false), &ScatterStyle::default())
        .unwrap();
    assert_eq!(collection.len(), 2);
    assert!(
      collection
        .features
        .iter()
        .all(|f| f.properties["legend"].is_null())
    );
  }

  #[test]
  fn palette_wraps_around() {
    let legends: Vec<Value> = (0..10).map(|i| json!(format!("c{i}"))).collect();
    let numbers: Vec<Value> = (0..10).map(|i| json!(i)).collect();
    let data = columns(&[
      ("latitude", numbers.clone()),
      ("longitude", numbers),
      ("legend", legends),
    ]);
    let collection =
      derive_scatter_feature_collection(&data, &scatter_columns(true), &ScatterStyle::default())
        .unwrap();
    assert_eq!(
      collection.features[8].properties["circle-color"],
      json!(CATEGORY_COLORS[0])
    );
  }

  #[rstest]
  #[case(columns(&[("latitude", vec![json!("x")]), ("longitude", vec![json!("1")])]))]
  #[case(columns(&[("latitude", vec![json!("1")])]))]
  #[case(columns(&[("latitude", vec![]), ("longitude", vec![json!("1")])]))]
  fn returns_none_without_points(#[case] data: ElementData) {
    assert!(
      derive_scatter_feature_collection(&data, &scatter_columns(false), &ScatterStyle::default())
        .is_none()
    );
  }

  #[test]
  fn legend_entries_are_unique_and_ordered() {
    let data = columns(&[
      ("latitude", vec![json!(1), json!(2), json!(3)]),
      ("longitude", vec![json!(1), json!(2), json!(3)]),
      ("legend", vec![json!("\"West\""), json!("\"East\""), json!("\"West\"")]),
    ]);
    let collection =
      derive_scatter_feature_collection(&data, &scatter_columns(true), &ScatterStyle::default())
        .unwrap();
    let entries = legend_entries(&collection);
    assert_eq!(
      entries.iter().map(|e| e.label.as_str()).collect::<Vec<_>>(),
      vec!["West", "East"]
    );
  }

  #[test]
  fn element_data_feeds_the_extractor() {
    let data = columns(&[("latitude", vec![json!(1)]), ("longitude", vec![json!(2)])]);
    let collection =
      derive_scatter_feature_collection(&data, &scatter_columns(false), &ScatterStyle::default());
    let extracted = extract_features(&to_element_data(collection.as_ref()));
    assert_eq!(extracted.point_features.len(), 1);
    assert!(to_element_data(None).is_empty());
  }
}
