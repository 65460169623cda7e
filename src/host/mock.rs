use std::{
  cell::{Cell, RefCell},
  collections::{BTreeMap, HashMap},
};

use log::debug;
use serde_json::{Value, json};

use super::{
  ConfigListener, EditorField, ElementListener, HostClient, HostSubscription, VariableListener,
};
use crate::{config::HostConfig, map::renderer::DEFAULT_BASEMAP, parser::ElementData};

fn sample_routes() -> Value {
  json!({
    "type": "FeatureCollection",
    "features": [
      {
        "type": "Feature",
        "properties": {"name": "Transcontinental", "line-color": "#ff6f61", "line-width": 4},
        "geometry": {
          "type": "LineString",
          "coordinates": [[-74.006, 40.7128], [-87.6298, 41.8781], [-118.2437, 34.0522]]
        }
      },
      {
        "type": "Feature",
        "properties": {"name": "European Loop", "line-color": "#26a69a", "line-width": 3},
        "geometry": {
          "type": "LineString",
          "coordinates": [[-0.1276, 51.5074], [2.3522, 48.8566], [13.405, 52.52]]
        }
      }
    ]
  })
}

fn branch(name: &str, pin_type: &str, color: &str, lon: f64, lat: f64) -> Value {
  json!({
    "type": "Feature",
    "properties": {
      "name": name,
      "circle-color": color,
      "circle-radius": 6,
      "pin_type": pin_type,
      "pin_color": color,
      "tooltip": name
    },
    "geometry": {"type": "Point", "coordinates": [lon, lat]}
  })
}

fn sample_branches() -> Value {
  json!({
    "type": "FeatureCollection",
    "features": [
      branch("Chicago Plant", "Factory", "#1e88e5", -87.6298, 41.8781),
      branch("Houston Port", "Ship", "#e53935", -95.3698, 29.7604),
      branch("San Francisco Harbor", "Anchor", "#8e24aa", -122.4194, 37.7749),
      branch("Los Angeles Office", "User", "#43a047", -118.2437, 34.0522)
    ]
  })
}

fn sample_regions() -> Value {
  json!({
    "type": "FeatureCollection",
    "features": [{
      "type": "Feature",
      "properties": {
        "name": "Northern Plains",
        "fill-color": "#f59a23",
        "fill-opacity": 0.35,
        "line-color": "#d47c00",
        "line-width": 2
      },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[
          [-104.05, 48.99], [-97.22, 48.98], [-96.58, 45.94], [-104.03, 45.94], [-104.05, 48.99]
        ]]
      }
    }]
  })
}

const SAMPLE_LEGEND: &str = "<div><strong>Map Legend</strong><ul>\
<li>Routes</li><li>Branches</li><li>Region</li></ul></div>";

fn sample_config() -> HostConfig {
  let config = json!({
    "basemapUrl": DEFAULT_BASEMAP,
    "clusterPoints": true,
    "layer1": "layer1Element",
    "layer1Geometry": "geometry",
    "layer1Title": "Global Routes",
    "animateLines1": true,
    "pointType1": "Circle",
    "layer2": "layer2Element",
    "layer2Geometry": "geometry",
    "layer2Title": "Branch Offices",
    "pointType2": "Icon",
    "layer3": "layer3Element",
    "layer3Geometry": "geometry",
    "layer3Title": "Coverage Regions",
    "fillPolygons3": true,
    "layer4": null,
    "layer4Title": "Layer 4",
    "scatterLayerEnabled": true,
    "scatterLayerTitle": "Scatter Points",
    "scatterSource": "scatterElement",
    "scatterLatitude": "latitude",
    "scatterLongitude": "longitude",
    "scatterLegend": "legend",
    "scatterPointType": "Circle",
    "filterLatitude": "mockFilterLatitude",
    "filterLongitude": "mockFilterLongitude",
    "legend": "legendElement",
    "legendHtml": "html",
    "menuBackgroundColor": "#3d293d",
    "menuTextColor": "#ffffff",
    "menuTextHoverColor": "#f59a23"
  });
  config.as_object().cloned().unwrap_or_default()
}

fn geometry_element(collection: &Value) -> ElementData {
  ElementData::from([(
    "geometry".to_string(),
    vec![Value::String(collection.to_string())],
  )])
}

fn sample_elements() -> BTreeMap<String, ElementData> {
  let strings = |cells: &[&str]| cells.iter().map(|c| json!(c)).collect::<Vec<_>>();
  // Legend cells arrive JSON encoded.
  let legend = ["West", "West", "East", "West"]
    .iter()
    .map(|label| json!(json!(label).to_string()))
    .collect();
  BTreeMap::from([
    ("layer1Element".to_string(), geometry_element(&sample_routes())),
    ("layer2Element".to_string(), geometry_element(&sample_branches())),
    ("layer3Element".to_string(), geometry_element(&sample_regions())),
    (
      "scatterElement".to_string(),
      ElementData::from([
        (
          "latitude".to_string(),
          strings(&["37.7749", "34.0522", "40.7128", "47.6062"]),
        ),
        (
          "longitude".to_string(),
          strings(&["-122.4194", "-118.2437", "-74.0060", "-122.3321"]),
        ),
        ("legend".to_string(), legend),
      ]),
    ),
    (
      "legendElement".to_string(),
      ElementData::from([("html".to_string(), vec![json!(SAMPLE_LEGEND)])]),
    ),
  ])
}

enum Listener {
  Config(ConfigListener),
  Element(String, ElementListener),
  Variable(String, VariableListener),
}

#[derive(Default)]
struct MockState {
  config: HostConfig,
  elements: BTreeMap<String, ElementData>,
  variables: HashMap<String, Option<Value>>,
  listeners: BTreeMap<HostSubscription, Listener>,
  editor_panel: Vec<EditorField>,
}

/// In-memory host runtime for local development and tests.
///
/// Configuration and element data are delivered synchronously on subscription and on every
/// change.
#[derive(Default)]
pub struct MockHost {
  state: RefCell<MockState>,
  next_subscription: Cell<u64>,
}

impl MockHost {
  /// A runtime seeded with sample routes, branches, regions, scatter points and a legend.
  #[must_use]
  pub fn new() -> Self {
    let host = Self::empty();
    {
      let mut state = host.state.borrow_mut();
      state.config = sample_config();
      state.elements = sample_elements();
    }
    host
  }

  /// A runtime without configuration or data.
  #[must_use]
  pub fn empty() -> Self {
    Self::default()
  }

  /// Replaces the data of an element and notifies its subscribers.
  pub fn set_element_data(&self, element_id: &str, data: ElementData) {
    self
      .state
      .borrow_mut()
      .elements
      .insert(element_id.to_string(), data.clone());
    for listener in self.element_listeners(element_id) {
      listener(&data);
    }
  }

  #[must_use]
  pub fn element_data(&self, element_id: &str) -> Option<ElementData> {
    self.state.borrow().elements.get(element_id).cloned()
  }

  /// The fields registered through [`HostClient::configure_editor_panel`].
  #[must_use]
  pub fn editor_panel(&self) -> Vec<EditorField> {
    self.state.borrow().editor_panel.clone()
  }

  #[must_use]
  pub fn subscription_count(&self) -> usize {
    self.state.borrow().listeners.len()
  }

  fn register(&self, listener: Listener) -> HostSubscription {
    let subscription = HostSubscription(self.next_subscription.get());
    self.next_subscription.set(subscription.0 + 1);
    self
      .state
      .borrow_mut()
      .listeners
      .insert(subscription, listener);
    subscription
  }

  fn element_listeners(&self, element_id: &str) -> Vec<ElementListener> {
    self
      .state
      .borrow()
      .listeners
      .values()
      .filter_map(|listener| match listener {
        Listener::Element(id, f) if id == element_id => Some(f.clone()),
        _ => None,
      })
      .collect()
  }

  fn notify_config(&self) {
    let (config, listeners): (HostConfig, Vec<ConfigListener>) = {
      let state = self.state.borrow();
      let listeners = state
        .listeners
        .values()
        .filter_map(|listener| match listener {
          Listener::Config(f) => Some(f.clone()),
          _ => None,
        })
        .collect();
      (state.config.clone(), listeners)
    };
    for listener in listeners {
      listener(&config);
    }
  }
}

impl HostClient for MockHost {
  fn is_mock(&self) -> bool {
    true
  }

  fn config(&self) -> HostConfig {
    self.state.borrow().config.clone()
  }

  fn subscribe_to_config(&self, listener: ConfigListener) -> HostSubscription {
    let subscription = self.register(Listener::Config(listener.clone()));
    let config = self.config();
    listener(&config);
    subscription
  }

  fn update_config(&self, partial: HostConfig) {
    {
      let mut state = self.state.borrow_mut();
      for (key, value) in partial {
        state.config.insert(key, value);
      }
    }
    self.notify_config();
  }

  fn subscribe_to_element_data(
    &self,
    element_id: Option<&str>,
    listener: ElementListener,
  ) -> HostSubscription {
    let Some(element_id) = element_id else {
      let subscription = HostSubscription(self.next_subscription.get());
      self.next_subscription.set(subscription.0 + 1);
      listener(&ElementData::new());
      return subscription;
    };
    let subscription = self.register(Listener::Element(element_id.to_string(), listener.clone()));
    if let Some(data) = self.element_data(element_id) {
      listener(&data);
    }
    subscription
  }

  fn variable(&self, id: &str) -> Option<Value> {
    self.state.borrow().variables.get(id).cloned().flatten()
  }

  fn set_variable(&self, id: &str, value: Option<Value>) {
    debug!("Setting variable {id} to {value:?}");
    self
      .state
      .borrow_mut()
      .variables
      .insert(id.to_string(), value.clone());
    let listeners: Vec<VariableListener> = self
      .state
      .borrow()
      .listeners
      .values()
      .filter_map(|listener| match listener {
        Listener::Variable(variable, f) if variable == id => Some(f.clone()),
        _ => None,
      })
      .collect();
    for listener in listeners {
      listener(value.as_ref());
    }
  }

  fn subscribe_to_variable(&self, id: &str, listener: VariableListener) -> HostSubscription {
    let subscription = self.register(Listener::Variable(id.to_string(), listener.clone()));
    listener(self.variable(id).as_ref());
    subscription
  }

  fn unsubscribe(&self, subscription: HostSubscription) -> bool {
    self
      .state
      .borrow_mut()
      .listeners
      .remove(&subscription)
      .is_some()
  }

  fn configure_editor_panel(&self, fields: Vec<EditorField>) {
    debug!("Editor panel configured with {} fields", fields.len());
    self.state.borrow_mut().editor_panel = fields;
  }
}
