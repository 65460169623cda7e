use std::{fmt::Display, sync::mpsc::Sender};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
  feature::{Feature, FeatureCollection, FeatureId},
  map_event::{EventKind, HandlerId, MapEvent, ScreenPoint},
};

/// Headless renderer that keeps its state in memory.
mod memory;
pub use memory::{DrawCall, MemoryHandle, MemoryRenderer, MemoryRendererFactory};

pub const DEFAULT_BASEMAP: &str = "mapbox://styles/psoral/cme3ei4xl000701rad5l8c6b4";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendererError {
  #[error("source `{0}` does not exist")]
  MissingSource(String),
  #[error("source `{0}` already exists")]
  DuplicateSource(String),
  #[error("layer `{0}` does not exist")]
  MissingLayer(String),
  #[error("layer `{0}` already exists")]
  DuplicateLayer(String),
  #[error("feature has no stable identifier")]
  FeatureWithoutId,
  #[error("source `{0}` is not clustered")]
  NotClustered(String),
  #[error("unknown cluster {0}")]
  UnknownCluster(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
  #[error("map initialization requires a container")]
  MissingContainer,
  #[error("renderer unavailable: {0}")]
  RendererUnavailable(String),
  #[error("draw extension unavailable: {0}")]
  DrawUnavailable(String),
  #[error("map is not initialized")]
  NotInitialized,
  #[error("initialization was superseded")]
  Superseded,
}

/// The element the map is mounted into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Container(String);

impl Container {
  #[must_use]
  pub fn new(id: &str) -> Self {
    Self(id.to_string())
  }

  #[must_use]
  pub fn id(&self) -> &str {
    &self.0
  }
}

impl Display for Container {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Initial camera of a new map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
  pub center: [f64; 2],
  pub zoom: f64,
}

impl Default for MapView {
  fn default() -> Self {
    Self {
      center: [-98.54818, 40.00811],
      zoom: 4.,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
  pub center: [f64; 2],
  pub zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterSpec {
  pub radius: u32,
  pub max_zoom: u32,
}

impl Default for ClusterSpec {
  fn default() -> Self {
    Self {
      radius: 50,
      max_zoom: 14,
    }
  }
}

/// A GeoJSON source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceSpec {
  pub data: FeatureCollection,
  /// Let the renderer assign feature ids, required for feature-state.
  pub generate_id: bool,
  pub line_metrics: bool,
  /// Clustering is fixed when the source is created.
  pub cluster: Option<ClusterSpec>,
}

impl SourceSpec {
  #[must_use]
  pub fn geojson(data: FeatureCollection) -> Self {
    Self {
      data,
      ..Self::default()
    }
  }

  #[must_use]
  pub fn with_generate_id(mut self) -> Self {
    self.generate_id = true;
    self
  }

  #[must_use]
  pub fn with_line_metrics(mut self) -> Self {
    self.line_metrics = true;
    self
  }

  #[must_use]
  pub fn with_cluster(mut self, cluster: Option<ClusterSpec>) -> Self {
    self.cluster = cluster;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
  Line,
  Fill,
  Circle,
  Symbol,
}

impl LayerKind {
  #[must_use]
  pub fn name(&self) -> &'static str {
    match self {
      LayerKind::Line => "line",
      LayerKind::Fill => "fill",
      LayerKind::Circle => "circle",
      LayerKind::Symbol => "symbol",
    }
  }
}

/// A sub-layer. Paint and layout values are expressions of the renderer's style language.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
  pub id: String,
  pub kind: LayerKind,
  pub source: String,
  pub paint: Map<String, Value>,
  pub layout: Map<String, Value>,
  pub filter: Option<Value>,
}

impl LayerSpec {
  #[must_use]
  pub fn new(id: &str, kind: LayerKind, source: &str) -> Self {
    Self {
      id: id.to_string(),
      kind,
      source: source.to_string(),
      paint: Map::new(),
      layout: Map::new(),
      filter: None,
    }
  }

  #[must_use]
  pub fn with_paint(mut self, name: &str, value: Value) -> Self {
    self.paint.insert(name.to_string(), value);
    self
  }

  #[must_use]
  pub fn with_layout(mut self, name: &str, value: Value) -> Self {
    self.layout.insert(name.to_string(), value);
    self
  }

  #[must_use]
  pub fn with_filter(mut self, filter: Value) -> Self {
    self.filter = Some(filter);
    self
  }
}

/// Restricts a rendered feature query to sub-layers and, optionally, a screen position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedQuery {
  pub layers: Vec<String>,
  pub point: Option<ScreenPoint>,
}

impl RenderedQuery {
  #[must_use]
  pub fn layer(layer: &str) -> Self {
    Self {
      layers: vec![layer.to_string()],
      point: None,
    }
  }

  #[must_use]
  pub fn at(mut self, point: ScreenPoint) -> Self {
    self.point = Some(point);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
  Navigation,
  Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPosition {
  TopLeft,
  TopRight,
}

/// Standard map interactions that are suspended while lassoing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
  DragPan,
  BoxZoom,
  DoubleClickZoom,
  Keyboard,
}

impl Gesture {
  #[must_use]
  pub fn all() -> &'static [Gesture] {
    &[
      Gesture::DragPan,
      Gesture::BoxZoom,
      Gesture::DoubleClickZoom,
      Gesture::Keyboard,
    ]
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
  #[default]
  Default,
  Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrawMode {
  #[serde(rename = "draw_polygon")]
  DrawPolygon,
  #[serde(rename = "simple_select")]
  SimpleSelect,
}

impl DrawMode {
  #[must_use]
  pub fn name(&self) -> &'static str {
    match self {
      DrawMode::DrawPolygon => "draw_polygon",
      DrawMode::SimpleSelect => "simple_select",
    }
  }
}

/// A pending next-frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameRequest(pub u64);

pub trait FrameScheduler {
  fn request_frame(&mut self) -> FrameRequest;
  fn cancel_frame(&mut self, request: FrameRequest);
}

/// The map rendering engine. Events of registered handlers are sent through the channel the
/// renderer was created with.
pub trait Renderer: FrameScheduler {
  fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), RendererError>;
  fn has_source(&self, id: &str) -> bool;
  fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), RendererError>;
  fn remove_source(&mut self, id: &str);
  /// Ids of every source in the style.
  fn source_ids(&self) -> Vec<String>;

  fn add_layer(&mut self, spec: LayerSpec) -> Result<(), RendererError>;
  fn has_layer(&self, id: &str) -> bool;
  fn remove_layer(&mut self, id: &str);
  /// Ids of every sub-layer in the style, in draw order.
  fn layer_ids(&self) -> Vec<String>;

  fn layout_property(&self, layer: &str, name: &str) -> Option<Value>;
  fn set_layout_property(&mut self, layer: &str, name: &str, value: Value)
  -> Result<(), RendererError>;
  fn set_paint_property(&mut self, layer: &str, name: &str, value: Value)
  -> Result<(), RendererError>;

  /// Features as rendered, tagged with the source they live in.
  fn query_rendered_features(&self, query: &RenderedQuery) -> Vec<Feature>;
  fn set_feature_state(&mut self, feature: &Feature, selected: bool) -> Result<(), RendererError>;

  /// Registers a handler, on a sub-layer or on the whole map when `layer` is `None`.
  fn on(&mut self, kind: EventKind, layer: Option<&str>) -> HandlerId;
  fn off(&mut self, handler: HandlerId);

  fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, RendererError>;
  fn ease_to(&mut self, camera: Camera);

  fn add_control(&mut self, control: Control, position: ControlPosition);
  fn remove_control(&mut self, control: Control);
  fn set_gesture_enabled(&mut self, gesture: Gesture, enabled: bool);
  fn set_cursor(&mut self, cursor: Cursor);

  /// Tears the map down. The renderer must not be used afterwards.
  fn destroy(&mut self);
}

/// The drawing extension used for lasso selection.
pub trait DrawControl {
  fn delete_all(&mut self);
  fn delete(&mut self, id: &FeatureId);
  fn change_mode(&mut self, mode: DrawMode);
}

/// Loads the rendering library and its drawing extension.
#[async_trait(?Send)]
pub trait RendererFactory {
  async fn create(
    &self,
    container: &Container,
    style: &str,
    view: MapView,
    events: Sender<MapEvent>,
  ) -> Result<Box<dyn Renderer>, MapError>;

  async fn load_draw(&self) -> Result<Box<dyn DrawControl>, MapError>;
}
