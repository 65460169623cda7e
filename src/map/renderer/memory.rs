use std::{
  cell::{Cell, RefCell},
  collections::{BTreeMap, BTreeSet, HashMap, HashSet},
  rc::Rc,
  sync::mpsc::Sender,
};

use async_trait::async_trait;
use serde_json::Value;

use super::{
  Camera, Container, Control, ControlPosition, Cursor, DrawControl, DrawMode, FrameRequest,
  FrameScheduler, Gesture, LayerSpec, MapError, MapView, RenderedQuery, Renderer, RendererError,
  RendererFactory, SourceSpec,
};
use crate::map::{
  feature::{Feature, FeatureCollection, FeatureId},
  map_event::{EventKind, EventPayload, HandlerId, MapEvent, ScreenPoint},
};

/// Distance in screen units within which a point feature counts as hit.
const HIT_TOLERANCE: f64 = 0.5;

struct MemoryState {
  container: Container,
  style: String,
  camera: Camera,
  sources: BTreeMap<String, SourceSpec>,
  /// Sub-layers in draw order.
  layers: Vec<LayerSpec>,
  feature_states: HashMap<(String, FeatureId), bool>,
  handlers: BTreeMap<HandlerId, (EventKind, Option<String>)>,
  next_handler: u64,
  controls: HashMap<Control, ControlPosition>,
  disabled_gestures: HashSet<Gesture>,
  cursor: Cursor,
  pending_frames: BTreeSet<FrameRequest>,
  next_frame: u64,
  cluster_zooms: HashMap<u64, f64>,
  mutations: usize,
  destroyed: bool,
  events: Sender<MapEvent>,
}

impl MemoryState {
  fn layer(&self, id: &str) -> Option<&LayerSpec> {
    self.layers.iter().find(|l| l.id == id)
  }

  fn layer_mut(&mut self, id: &str) -> Option<&mut LayerSpec> {
    self.layers.iter_mut().find(|l| l.id == id)
  }

  fn is_visible(layer: &LayerSpec) -> bool {
    layer.layout.get("visibility").and_then(Value::as_str) != Some("none")
  }

  /// Source features as the renderer would hand them out: with generated ids and their source.
  fn rendered_features(&self, layer: &LayerSpec) -> Vec<Feature> {
    let Some(source) = self.sources.get(&layer.source) else {
      return Vec::new();
    };
    source
      .data
      .features
      .iter()
      .enumerate()
      .map(|(index, feature)| {
        let mut feature = feature.clone().with_source(&layer.source);
        if feature.id.is_none() && source.generate_id {
          feature.id = Some(FeatureId::Number(index as u64));
        }
        feature
      })
      .filter(|feature| {
        layer
          .filter
          .as_ref()
          .is_none_or(|filter| matches_filter(filter, feature))
      })
      .collect()
  }

  fn send(&self, handler: HandlerId, kind: EventKind, payload: EventPayload) {
    let event = MapEvent {
      handler,
      kind,
      payload,
    };
    if let Err(e) = self.events.send(event) {
      log::debug!("Dropping event of {handler}: {e}");
    }
  }

  fn handlers_for(&self, kind: EventKind, layer: Option<&str>) -> Vec<HandlerId> {
    self
      .handlers
      .iter()
      .filter(|(_, (k, l))| *k == kind && l.as_deref() == layer)
      .map(|(id, _)| *id)
      .collect()
  }
}

/// Evaluates the subset of the filter language the engine uses.
fn matches_filter(filter: &Value, feature: &Feature) -> bool {
  let Some(expression) = filter.as_array() else {
    return true;
  };
  match expression.first().and_then(Value::as_str) {
    Some("has") => expression
      .get(1)
      .and_then(Value::as_str)
      .is_some_and(|key| feature.properties.contains_key(key)),
    Some("!") => expression
      .get(1)
      .is_some_and(|inner| !matches_filter(inner, feature)),
    Some("==") => {
      let key = expression
        .get(1)
        .and_then(Value::as_array)
        .and_then(|get| get.get(1))
        .and_then(Value::as_str);
      match (key, expression.get(2)) {
        (Some(key), Some(expected)) => feature.properties.get(key) == Some(expected),
        _ => false,
      }
    }
    _ => true,
  }
}

fn is_hit(feature: &Feature, point: ScreenPoint) -> bool {
  feature.point().is_some_and(|[x, y]| {
    let (dx, dy) = (x - point.x, y - point.y);
    (dx * dx + dy * dy).sqrt() <= HIT_TOLERANCE
  })
}

/// A headless [`Renderer`]. Screen coordinates equal longitude/latitude.
pub struct MemoryRenderer {
  state: Rc<RefCell<MemoryState>>,
}

impl MemoryRenderer {
  #[must_use]
  pub fn new(container: &Container, style: &str, view: MapView, events: Sender<MapEvent>) -> Self {
    let state = MemoryState {
      container: container.clone(),
      style: style.to_string(),
      camera: Camera {
        center: view.center,
        zoom: view.zoom,
      },
      sources: BTreeMap::new(),
      layers: Vec::new(),
      feature_states: HashMap::new(),
      handlers: BTreeMap::new(),
      next_handler: 0,
      controls: HashMap::new(),
      disabled_gestures: HashSet::new(),
      cursor: Cursor::Default,
      pending_frames: BTreeSet::new(),
      next_frame: 0,
      cluster_zooms: HashMap::new(),
      mutations: 0,
      destroyed: false,
      events,
    };
    Self {
      state: Rc::new(RefCell::new(state)),
    }
  }

  /// A handle to inspect the renderer and to simulate user input.
  #[must_use]
  pub fn handle(&self) -> MemoryHandle {
    MemoryHandle {
      state: self.state.clone(),
    }
  }
}

impl FrameScheduler for MemoryRenderer {
  fn request_frame(&mut self) -> FrameRequest {
    let mut state = self.state.borrow_mut();
    state.next_frame += 1;
    let request = FrameRequest(state.next_frame);
    state.pending_frames.insert(request);
    request
  }

  fn cancel_frame(&mut self, request: FrameRequest) {
    self.state.borrow_mut().pending_frames.remove(&request);
  }
}

impl Renderer for MemoryRenderer {
  fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), RendererError> {
    let mut state = self.state.borrow_mut();
    if state.sources.contains_key(id) {
      return Err(RendererError::DuplicateSource(id.to_string()));
    }
    state.sources.insert(id.to_string(), spec);
    state.mutations += 1;
    Ok(())
  }

  fn has_source(&self, id: &str) -> bool {
    self.state.borrow().sources.contains_key(id)
  }

  fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), RendererError> {
    let mut state = self.state.borrow_mut();
    let source = state
      .sources
      .get_mut(id)
      .ok_or_else(|| RendererError::MissingSource(id.to_string()))?;
    source.data = data;
    state.mutations += 1;
    Ok(())
  }

  fn remove_source(&mut self, id: &str) {
    let mut state = self.state.borrow_mut();
    if state.sources.remove(id).is_some() {
      state.feature_states.retain(|(source, _), _| source != id);
      state.mutations += 1;
    }
  }

  fn source_ids(&self) -> Vec<String> {
    self.state.borrow().sources.keys().cloned().collect()
  }

  fn add_layer(&mut self, spec: LayerSpec) -> Result<(), RendererError> {
    let mut state = self.state.borrow_mut();
    if state.layer(&spec.id).is_some() {
      return Err(RendererError::DuplicateLayer(spec.id));
    }
    if !state.sources.contains_key(&spec.source) {
      return Err(RendererError::MissingSource(spec.source));
    }
    state.layers.push(spec);
    state.mutations += 1;
    Ok(())
  }

  fn has_layer(&self, id: &str) -> bool {
    self.state.borrow().layer(id).is_some()
  }

  fn remove_layer(&mut self, id: &str) {
    let mut state = self.state.borrow_mut();
    let before = state.layers.len();
    state.layers.retain(|l| l.id != id);
    if state.layers.len() != before {
      state.mutations += 1;
    }
  }

  fn layer_ids(&self) -> Vec<String> {
    self.state.borrow().layers.iter().map(|l| l.id.clone()).collect()
  }

  fn layout_property(&self, layer: &str, name: &str) -> Option<Value> {
    self
      .state
      .borrow()
      .layer(layer)
      .and_then(|l| l.layout.get(name).cloned())
  }

  fn set_layout_property(
    &mut self,
    layer: &str,
    name: &str,
    value: Value,
  ) -> Result<(), RendererError> {
    let mut state = self.state.borrow_mut();
    let spec = state
      .layer_mut(layer)
      .ok_or_else(|| RendererError::MissingLayer(layer.to_string()))?;
    spec.layout.insert(name.to_string(), value);
    state.mutations += 1;
    Ok(())
  }

  fn set_paint_property(
    &mut self,
    layer: &str,
    name: &str,
    value: Value,
  ) -> Result<(), RendererError> {
    let mut state = self.state.borrow_mut();
    let spec = state
      .layer_mut(layer)
      .ok_or_else(|| RendererError::MissingLayer(layer.to_string()))?;
    spec.paint.insert(name.to_string(), value);
    state.mutations += 1;
    Ok(())
  }

  fn query_rendered_features(&self, query: &RenderedQuery) -> Vec<Feature> {
    let state = self.state.borrow();
    state
      .layers
      .iter()
      .filter(|l| query.layers.is_empty() || query.layers.contains(&l.id))
      .filter(|l| MemoryState::is_visible(l))
      .flat_map(|l| state.rendered_features(l))
      .filter(|f| query.point.is_none_or(|point| is_hit(f, point)))
      .collect()
  }

  fn set_feature_state(&mut self, feature: &Feature, selected: bool) -> Result<(), RendererError> {
    let id = feature.id.clone().ok_or(RendererError::FeatureWithoutId)?;
    let source = feature
      .source
      .clone()
      .ok_or(RendererError::FeatureWithoutId)?;
    let mut state = self.state.borrow_mut();
    if !state.sources.contains_key(&source) {
      return Err(RendererError::MissingSource(source));
    }
    state.feature_states.insert((source, id), selected);
    Ok(())
  }

  fn on(&mut self, kind: EventKind, layer: Option<&str>) -> HandlerId {
    let mut state = self.state.borrow_mut();
    state.next_handler += 1;
    let id = HandlerId(state.next_handler);
    state
      .handlers
      .insert(id, (kind, layer.map(ToString::to_string)));
    id
  }

  fn off(&mut self, handler: HandlerId) {
    self.state.borrow_mut().handlers.remove(&handler);
  }

  fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, RendererError> {
    let state = self.state.borrow();
    let spec = state
      .sources
      .get(source)
      .ok_or_else(|| RendererError::MissingSource(source.to_string()))?;
    if spec.cluster.is_none() {
      return Err(RendererError::NotClustered(source.to_string()));
    }
    state
      .cluster_zooms
      .get(&cluster_id)
      .copied()
      .ok_or(RendererError::UnknownCluster(cluster_id))
  }

  fn ease_to(&mut self, camera: Camera) {
    self.state.borrow_mut().camera = camera;
  }

  fn add_control(&mut self, control: Control, position: ControlPosition) {
    self.state.borrow_mut().controls.insert(control, position);
  }

  fn remove_control(&mut self, control: Control) {
    self.state.borrow_mut().controls.remove(&control);
  }

  fn set_gesture_enabled(&mut self, gesture: Gesture, enabled: bool) {
    let mut state = self.state.borrow_mut();
    if enabled {
      state.disabled_gestures.remove(&gesture);
    } else {
      state.disabled_gestures.insert(gesture);
    }
  }

  fn set_cursor(&mut self, cursor: Cursor) {
    self.state.borrow_mut().cursor = cursor;
  }

  fn destroy(&mut self) {
    let mut state = self.state.borrow_mut();
    state.destroyed = true;
    state.handlers.clear();
    state.pending_frames.clear();
    state.layers.clear();
    state.sources.clear();
    state.controls.clear();
  }
}

/// Shared view on a [`MemoryRenderer`] that outlives handing the renderer to the engine.
#[derive(Clone)]
pub struct MemoryHandle {
  state: Rc<RefCell<MemoryState>>,
}

impl MemoryHandle {
  #[must_use]
  pub fn container(&self) -> Container {
    self.state.borrow().container.clone()
  }

  #[must_use]
  pub fn style(&self) -> String {
    self.state.borrow().style.clone()
  }

  #[must_use]
  pub fn camera(&self) -> Camera {
    self.state.borrow().camera
  }

  /// Number of source, sub-layer and property mutations so far.
  #[must_use]
  pub fn mutations(&self) -> usize {
    self.state.borrow().mutations
  }

  #[must_use]
  pub fn source(&self, id: &str) -> Option<SourceSpec> {
    self.state.borrow().sources.get(id).cloned()
  }

  #[must_use]
  pub fn source_ids(&self) -> Vec<String> {
    self.state.borrow().sources.keys().cloned().collect()
  }

  #[must_use]
  pub fn layer(&self, id: &str) -> Option<LayerSpec> {
    self.state.borrow().layer(id).cloned()
  }

  #[must_use]
  pub fn layer_ids(&self) -> Vec<String> {
    self
      .state
      .borrow()
      .layers
      .iter()
      .map(|l| l.id.clone())
      .collect()
  }

  #[must_use]
  pub fn feature_state(&self, source: &str, id: &FeatureId) -> Option<bool> {
    self
      .state
      .borrow()
      .feature_states
      .get(&(source.to_string(), id.clone()))
      .copied()
  }

  #[must_use]
  pub fn handler_count(&self) -> usize {
    self.state.borrow().handlers.len()
  }

  #[must_use]
  pub fn has_handler(&self, kind: EventKind, layer: Option<&str>) -> bool {
    !self.state.borrow().handlers_for(kind, layer).is_empty()
  }

  #[must_use]
  pub fn has_control(&self, control: Control) -> bool {
    self.state.borrow().controls.contains_key(&control)
  }

  #[must_use]
  pub fn gesture_enabled(&self, gesture: Gesture) -> bool {
    !self.state.borrow().disabled_gestures.contains(&gesture)
  }

  #[must_use]
  pub fn cursor(&self) -> Cursor {
    self.state.borrow().cursor
  }

  #[must_use]
  pub fn pending_frames(&self) -> usize {
    self.state.borrow().pending_frames.len()
  }

  #[must_use]
  pub fn is_destroyed(&self) -> bool {
    self.state.borrow().destroyed
  }

  /// Takes the oldest pending frame request, as the display would when it is due.
  pub fn take_due_frame(&self) -> Option<FrameRequest> {
    self.state.borrow_mut().pending_frames.pop_first()
  }

  pub fn set_cluster_expansion_zoom(&self, cluster_id: u64, zoom: f64) {
    self.state.borrow_mut().cluster_zooms.insert(cluster_id, zoom);
  }

  /// Features of a sub-layer under a screen point.
  #[must_use]
  pub fn hits(&self, layer: &str, point: ScreenPoint) -> Vec<Feature> {
    let state = self.state.borrow();
    state
      .layer(layer)
      .filter(|l| MemoryState::is_visible(l))
      .map(|l| {
        state
          .rendered_features(l)
          .into_iter()
          .filter(|f| is_hit(f, point))
          .collect()
      })
      .unwrap_or_default()
  }

  /// Dispatches an event to every handler registered for `kind` on `layer`. Returns the number
  /// of handlers reached.
  pub fn fire(&self, kind: EventKind, layer: Option<&str>, payload: &EventPayload) -> usize {
    let state = self.state.borrow();
    let handlers = state.handlers_for(kind, layer);
    for handler in &handlers {
      state.send(*handler, kind, payload.clone());
    }
    handlers.len()
  }

  /// Moves the pointer onto a sub-layer at `point`.
  pub fn hover(&self, layer: &str, point: ScreenPoint) -> usize {
    let payload = EventPayload::at(point).with_features(self.hits(layer, point));
    self.fire(EventKind::MouseEnter, Some(layer), &payload)
  }

  /// Clicks at `point`: sub-layer handlers with a hit first, then the map handlers.
  pub fn click(&self, point: ScreenPoint, additive: bool) {
    let layered: Vec<String> = {
      let state = self.state.borrow();
      state
        .handlers
        .values()
        .filter(|(kind, layer)| *kind == EventKind::Click && layer.is_some())
        .filter_map(|(_, layer)| layer.clone())
        .collect()
    };
    let mut seen = HashSet::new();
    for layer in layered {
      if !seen.insert(layer.clone()) {
        continue;
      }
      let hits = self.hits(&layer, point);
      if hits.is_empty() {
        continue;
      }
      let payload = EventPayload::at(point)
        .with_features(hits)
        .with_additive(additive);
      self.fire(EventKind::Click, Some(&layer), &payload);
    }
    let mut payload = EventPayload::at(point).with_additive(additive);
    payload.lng_lat = Some([point.x, point.y]);
    self.fire(EventKind::Click, None, &payload);
  }
}

/// A recorded call on a [`MemoryDrawControl`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
  DeleteAll,
  Delete(FeatureId),
  ChangeMode(DrawMode),
}

struct MemoryDrawControl {
  calls: Rc<RefCell<Vec<DrawCall>>>,
}

impl DrawControl for MemoryDrawControl {
  fn delete_all(&mut self) {
    self.calls.borrow_mut().push(DrawCall::DeleteAll);
  }

  fn delete(&mut self, id: &FeatureId) {
    self.calls.borrow_mut().push(DrawCall::Delete(id.clone()));
  }

  fn change_mode(&mut self, mode: DrawMode) {
    self.calls.borrow_mut().push(DrawCall::ChangeMode(mode));
  }
}

/// Creates [`MemoryRenderer`]s. Both loads suspend once before completing.
#[derive(Default)]
pub struct MemoryRendererFactory {
  handles: RefCell<Vec<MemoryHandle>>,
  draw_calls: Rc<RefCell<Vec<DrawCall>>>,
  draw_loads: Cell<usize>,
  unavailable: Cell<bool>,
}

impl MemoryRendererFactory {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Makes subsequent loads fail, as if the rendering library could not be fetched.
  pub fn set_unavailable(&self, unavailable: bool) {
    self.unavailable.set(unavailable);
  }

  #[must_use]
  pub fn created(&self) -> usize {
    self.handles.borrow().len()
  }

  #[must_use]
  pub fn last_handle(&self) -> Option<MemoryHandle> {
    self.handles.borrow().last().cloned()
  }

  #[must_use]
  pub fn draw_loads(&self) -> usize {
    self.draw_loads.get()
  }

  #[must_use]
  pub fn draw_calls(&self) -> Vec<DrawCall> {
    self.draw_calls.borrow().clone()
  }
}

#[async_trait(?Send)]
impl RendererFactory for MemoryRendererFactory {
  async fn create(
    &self,
    container: &Container,
    style: &str,
    view: MapView,
    events: Sender<MapEvent>,
  ) -> Result<Box<dyn Renderer>, MapError> {
    tokio::task::yield_now().await;
    if self.unavailable.get() {
      return Err(MapError::RendererUnavailable(
        "memory renderer disabled".to_string(),
      ));
    }
    let renderer = MemoryRenderer::new(container, style, view, events);
    self.handles.borrow_mut().push(renderer.handle());
    Ok(Box::new(renderer))
  }

  async fn load_draw(&self) -> Result<Box<dyn DrawControl>, MapError> {
    tokio::task::yield_now().await;
    if self.unavailable.get() {
      return Err(MapError::DrawUnavailable("memory renderer disabled".to_string()));
    }
    self.draw_loads.set(self.draw_loads.get() + 1);
    Ok(Box::new(MemoryDrawControl {
      calls: self.draw_calls.clone(),
    }))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc::channel;

  use serde_json::json;

  use super::*;
  use crate::map::{feature::Properties, renderer::LayerKind};

  fn renderer() -> (MemoryRenderer, std::sync::mpsc::Receiver<MapEvent>) {
    let (tx, rx) = channel();
    let renderer = MemoryRenderer::new(&Container::new("map"), "style", MapView::default(), tx);
    (renderer, rx)
  }

  fn points() -> FeatureCollection {
    let mut cluster = Properties::new();
    cluster.insert("point_count".to_string(), json!(12));
    FeatureCollection::new(vec![
      Feature::new(crate::map::feature::Geometry::point(1., 1.), Properties::new()),
      Feature::new(crate::map::feature::Geometry::point(5., 5.), cluster),
    ])
  }

  #[test]
  fn layers_need_their_source() {
    let (mut renderer, _rx) = renderer();
    let spec = LayerSpec::new("l", LayerKind::Circle, "s");
    assert_eq!(
      renderer.add_layer(spec.clone()),
      Err(RendererError::MissingSource("s".to_string()))
    );
    renderer
      .add_source("s", SourceSpec::geojson(points()))
      .unwrap();
    assert!(renderer.add_layer(spec.clone()).is_ok());
    assert_eq!(
      renderer.add_layer(spec),
      Err(RendererError::DuplicateLayer("l".to_string()))
    );
    assert_eq!(renderer.handle().mutations(), 2);
  }

  #[test]
  fn query_applies_filters_and_generated_ids() {
    let (mut renderer, _rx) = renderer();
    renderer
      .add_source("s", SourceSpec::geojson(points()).with_generate_id())
      .unwrap();
    renderer
      .add_layer(
        LayerSpec::new("l", LayerKind::Circle, "s").with_filter(json!(["!", ["has", "point_count"]])),
      )
      .unwrap();
    let features = renderer.query_rendered_features(&RenderedQuery::layer("l"));
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].id, Some(FeatureId::Number(0)));
    assert_eq!(features[0].source.as_deref(), Some("s"));

    let hidden = renderer.set_layout_property("l", "visibility", json!("none"));
    assert!(hidden.is_ok());
    assert!(
      renderer
        .query_rendered_features(&RenderedQuery::layer("l"))
        .is_empty()
    );
  }

  #[test]
  fn fire_reaches_matching_handlers_only() {
    let (mut renderer, rx) = renderer();
    let on_layer = renderer.on(EventKind::Click, Some("l"));
    let _on_map = renderer.on(EventKind::Click, None);
    let handle = renderer.handle();

    assert_eq!(handle.fire(EventKind::Click, Some("l"), &EventPayload::default()), 1);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.handler, on_layer);

    renderer.off(on_layer);
    assert_eq!(handle.fire(EventKind::Click, Some("l"), &EventPayload::default()), 0);
  }

  #[test]
  fn frames_are_cancelable() {
    let (mut renderer, _rx) = renderer();
    let first = renderer.request_frame();
    let _second = renderer.request_frame();
    renderer.cancel_frame(first);
    let handle = renderer.handle();
    assert_eq!(handle.pending_frames(), 1);
    assert!(handle.take_due_frame().is_some());
    assert_eq!(handle.pending_frames(), 0);
  }
}
