use std::{
  collections::HashMap,
  sync::mpsc::{Receiver, Sender, channel},
};

use log::debug;
use serde_json::json;

use super::{
  feature::Feature,
  map_event::{EventKind, HandlerId, MapEvent, MapNotice},
  registry::{LayerListener, LayerRegistry, LayerSubscription, TrackedLayer},
  renderer::{Control, ControlPosition, LayerSpec, Renderer},
};
use crate::{
  config::{LayerConfig, PointType, is_layer_key},
  parser::{ElementData, ExtractedFeatureSet, extract_features},
  profile_scope,
};

mod animation;
pub use animation::{DASH_SEQUENCE, dash_step};
mod interaction;
pub use interaction::{
  FeatureSelectFn, HoverEnterFn, HoverLeaveFn, HoverMoveFn, LayerCallbacks,
};
mod lasso;
pub use lasso::{LassoCallback, lasso_polygons, point_in_polygon, point_in_ring, select_within};
mod styles;
pub use styles::{LAYER_PREFIXES, LayerIds, SOURCE_PREFIXES};

use animation::DashAnimation;
use interaction::HandlerBinding;
use lasso::LassoState;

/// What was last applied for a layer key. A sync with an equal state leaves the renderer alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LayerRenderState {
  content_hash: u64,
  cluster_points: bool,
  point_type: PointType,
  animate_lines: bool,
  fill_polygons: bool,
}

impl LayerRenderState {
  fn new(extracted: &ExtractedFeatureSet, config: &LayerConfig) -> Self {
    Self {
      content_hash: extracted.content_hash,
      cluster_points: config.cluster_points,
      point_type: config.point_type,
      animate_lines: config.animate_lines,
      fill_polygons: config.fill_polygons,
    }
  }
}

/// The only writer of renderer state for tracked layers.
///
/// Owns the renderer once it is attached, every source and sub-layer created for a layer key,
/// the handlers registered on them and the tracked layer registry. Renderer events are queued in
/// a channel and dispatched by [`MapEngine::process_pending_events`].
pub struct MapEngine {
  renderer: Option<Box<dyn Renderer>>,
  registry: LayerRegistry,
  render_state: HashMap<String, LayerRenderState>,
  handlers: HashMap<HandlerId, HandlerBinding>,
  layer_handlers: HashMap<String, Vec<HandlerId>>,
  map_handlers: Vec<HandlerId>,
  selected_features: HashMap<String, Feature>,
  animation: DashAnimation,
  lasso: LassoState,
  /// Set when a layer click handler consumed the current click.
  click_default_prevented: bool,
  events_tx: Sender<MapEvent>,
  events_rx: Receiver<MapEvent>,
  init_ticket: u64,
}

impl Default for MapEngine {
  fn default() -> Self {
    Self::new()
  }
}

impl MapEngine {
  #[must_use]
  pub fn new() -> Self {
    let (events_tx, events_rx) = channel();
    Self {
      renderer: None,
      registry: LayerRegistry::new(),
      render_state: HashMap::new(),
      handlers: HashMap::new(),
      layer_handlers: HashMap::new(),
      map_handlers: Vec::new(),
      selected_features: HashMap::new(),
      animation: DashAnimation::default(),
      lasso: LassoState::default(),
      click_default_prevented: false,
      events_tx,
      events_rx,
      init_ticket: 0,
    }
  }

  /// The channel renderers dispatch their events through.
  #[must_use]
  pub fn events_sender(&self) -> Sender<MapEvent> {
    self.events_tx.clone()
  }

  #[must_use]
  pub fn is_initialized(&self) -> bool {
    self.renderer.is_some()
  }

  /// Starts a new initialization. Every earlier ticket is superseded.
  pub(crate) fn begin_init(&mut self) -> u64 {
    self.init_ticket += 1;
    self.init_ticket
  }

  pub(crate) fn current_ticket(&self) -> u64 {
    self.init_ticket
  }

  pub(crate) fn is_current(&self, ticket: u64) -> bool {
    self.init_ticket == ticket
  }

  /// Takes ownership of a freshly created renderer: adds the navigation control and listens for
  /// the map level `load` and `click` events.
  pub fn attach(&mut self, mut renderer: Box<dyn Renderer>) {
    if self.renderer.is_some() {
      self.dispose();
    }
    renderer.add_control(Control::Navigation, ControlPosition::TopRight);
    self.renderer = Some(renderer);
    self.map_handlers = [
      self.bind(EventKind::Load, None, HandlerBinding::MapLoad),
      self.bind(EventKind::Click, None, HandlerBinding::MapClick),
    ]
    .into_iter()
    .flatten()
    .collect();
  }

  pub fn subscribe(&mut self, listener: LayerListener) -> LayerSubscription {
    self.registry.subscribe(listener)
  }

  pub fn unsubscribe(&mut self, subscription: LayerSubscription) -> bool {
    self.registry.unsubscribe(subscription)
  }

  #[must_use]
  pub fn tracked_layers(&self) -> &[TrackedLayer] {
    self.registry.layers()
  }

  /// Reconciles the renderer with the data and configuration of one layer key.
  ///
  /// Safe to call on every refresh: with the same data and styling flags as the last call nothing
  /// on the renderer changes.
  pub fn sync_layer(
    &mut self,
    layer_key: &str,
    element_data: Option<&ElementData>,
    config: &LayerConfig,
    callbacks: &LayerCallbacks,
  ) {
    profile_scope!("sync_layer");
    if self.renderer.is_none() || !is_layer_key(layer_key) {
      debug!("Ignoring sync of {layer_key}");
      return;
    }

    let Some(element_data) = element_data.filter(|data| !data.is_empty()) else {
      self.remove_layer_artifacts(layer_key);
      self.render_state.remove(layer_key);
      self.registry.notify();
      return;
    };

    if self.registry.get(layer_key).is_some() {
      self.registry.ensure(layer_key, &config.title);
    }

    let extracted = extract_features(element_data);
    let state = LayerRenderState::new(&extracted, config);
    if self.render_state.get(layer_key) == Some(&state) {
      return;
    }

    if extracted.is_empty() {
      self.remove_layer_artifacts(layer_key);
      self.render_state.insert(layer_key.to_string(), state);
      self.registry.notify();
      return;
    }

    let hidden = self
      .registry
      .get(layer_key)
      .is_some_and(|layer| !layer.visible && !layer.ids.is_empty());
    self.registry.ensure(layer_key, &config.title);

    let ids = LayerIds::new(layer_key);
    let animated_before = self.animation.layers.clone();

    if extracted.line_features.is_empty() {
      self.clear_line_artifacts(layer_key, &ids);
    } else {
      self.sync_lines(layer_key, &ids, &extracted, config, callbacks, hidden);
    }

    if extracted.point_features.is_empty() {
      self.clear_point_artifacts(layer_key, &ids);
    } else {
      self.sync_points(layer_key, &ids, &extracted, config, callbacks, hidden);
    }

    if self.animation.layers != animated_before {
      self.animate_dash_array();
    }

    self.render_state.insert(layer_key.to_string(), state);
    self.registry.notify();
  }

  /// Incremental: the source is updated in place and sub-layers are only added when missing.
  fn sync_lines(
    &mut self,
    layer_key: &str,
    ids: &LayerIds,
    extracted: &ExtractedFeatureSet,
    config: &LayerConfig,
    callbacks: &LayerCallbacks,
    hidden: bool,
  ) {
    let lines = extracted.lines();
    if let Some(renderer) = self.renderer.as_mut() {
      let result = if renderer.has_source(&ids.line_source) {
        renderer.set_source_data(&ids.line_source, lines)
      } else {
        renderer.add_source(&ids.line_source, styles::line_source(lines))
      };
      if let Err(e) = result {
        debug!("Failed to update {}: {e}", ids.line_source);
      }
    }

    if config.animate_lines {
      self.ensure_sub_layer(layer_key, styles::line_background(ids), hidden);
      self.ensure_sub_layer(layer_key, styles::line_foreground(ids, true), hidden);
      self.animation.track(&ids.line_dashed);
    } else {
      self.remove_sub_layer(layer_key, &ids.line_background);
      self.ensure_sub_layer(layer_key, styles::line_foreground(ids, false), hidden);
      self.animation.untrack(&ids.line_dashed);
    }

    if config.fill_polygons && extracted.has_polygons {
      self.ensure_sub_layer(layer_key, styles::polygon_fill(ids), hidden);
    } else {
      self.remove_sub_layer(layer_key, &ids.polygon_fill);
    }

    self.register_hover_handlers(&ids.line_dashed, callbacks);
  }

  /// Destructive: clustering is fixed when a source is created, so the point source and every
  /// point sub-layer are rebuilt.
  fn sync_points(
    &mut self,
    layer_key: &str,
    ids: &LayerIds,
    extracted: &ExtractedFeatureSet,
    config: &LayerConfig,
    callbacks: &LayerCallbacks,
    hidden: bool,
  ) {
    self.clear_point_artifacts(layer_key, ids);

    let source = styles::point_source(extracted.points(), config.cluster_points);
    if let Some(renderer) = self.renderer.as_mut()
      && let Err(e) = renderer.add_source(&ids.point_source, source)
    {
      debug!("Failed to add {}: {e}", ids.point_source);
      return;
    }

    self.ensure_sub_layer(
      layer_key,
      styles::point_layer(ids, config.point_type, config.cluster_points),
      hidden,
    );

    if config.cluster_points {
      self.ensure_sub_layer(layer_key, styles::cluster_bubbles(ids), hidden);
      self.ensure_sub_layer(layer_key, styles::cluster_count(ids), hidden);
      self.setup_cluster_interaction(
        &ids.point_source,
        [ids.point_cluster.as_str(), ids.point_cluster_count.as_str()],
        callbacks,
      );
    }

    self.register_hover_handlers(&ids.point_layer, callbacks);
  }

  /// Adds the sub-layer unless it exists, then tracks it. Sub-layers of a hidden layer are added
  /// hidden.
  fn ensure_sub_layer(&mut self, layer_key: &str, spec: LayerSpec, hidden: bool) {
    let Some(renderer) = self.renderer.as_mut() else {
      return;
    };
    let id = spec.id.clone();
    if !renderer.has_layer(&id) {
      let spec = if hidden {
        spec.with_layout("visibility", json!("none"))
      } else {
        spec
      };
      if let Err(e) = renderer.add_layer(spec) {
        debug!("Failed to add {id}: {e}");
        return;
      }
    }
    self.registry.track(layer_key, &id, hidden);
  }

  fn remove_sub_layer(&mut self, layer_key: &str, id: &str) {
    if let Some(renderer) = self.renderer.as_mut() {
      renderer.remove_layer(id);
    }
    self.detach_layer_handlers(id);
    self.registry.untrack(layer_key, id);
    self.animation.untrack(id);
  }

  fn remove_source(&mut self, id: &str) {
    if let Some(renderer) = self.renderer.as_mut() {
      renderer.remove_source(id);
    }
  }

  fn clear_line_artifacts(&mut self, layer_key: &str, ids: &LayerIds) {
    self.remove_sub_layer(layer_key, &ids.line_background);
    self.remove_sub_layer(layer_key, &ids.line_dashed);
    self.remove_sub_layer(layer_key, &ids.polygon_fill);
    self.remove_source(&ids.line_source);
  }

  fn clear_point_artifacts(&mut self, layer_key: &str, ids: &LayerIds) {
    self.remove_sub_layer(layer_key, &ids.point_layer);
    self.remove_sub_layer(layer_key, &ids.point_cluster);
    self.remove_sub_layer(layer_key, &ids.point_cluster_count);
    self.remove_source(&ids.point_source);
  }

  /// Removes every sub-layer and source of a layer key. A tracked layer left without sub-layers
  /// is reported hidden.
  fn remove_layer_artifacts(&mut self, layer_key: &str) {
    let ids = LayerIds::new(layer_key);
    let animated = self.animation.layers.len();
    self.clear_line_artifacts(layer_key, &ids);
    self.clear_point_artifacts(layer_key, &ids);
    if self.animation.layers.len() != animated {
      self.animate_dash_array();
    }
    if let Some(layer) = self.registry.get_mut(layer_key)
      && layer.ids.is_empty()
    {
      layer.visible = false;
    }
  }

  /// Removes every sub-layer and source the engine created, for all layer keys, and forgets
  /// everything tracked about them.
  pub fn clear_map_layers(&mut self) {
    if self.renderer.is_none() {
      return;
    }
    self.disable_lasso_selection(true);
    self.stop_dash_animation();
    self.clear_handlers();

    if let Some(renderer) = self.renderer.as_mut() {
      for id in renderer.layer_ids() {
        if LAYER_PREFIXES.iter().any(|prefix| id.starts_with(prefix)) {
          renderer.remove_layer(&id);
        }
      }
      for id in renderer.source_ids() {
        if SOURCE_PREFIXES.iter().any(|prefix| id.starts_with(prefix)) {
          renderer.remove_source(&id);
        }
      }
    }

    self.reset_tracking();
    self.registry.notify();
  }

  /// Flips the visibility of every sub-layer of `layer_key`. A sub-layer without a visibility
  /// layout property counts as visible.
  pub fn toggle_layer_visibility(&mut self, layer_key: &str) {
    let Some(renderer) = self.renderer.as_mut() else {
      return;
    };
    let Some(layer) = self.registry.get_mut(layer_key) else {
      return;
    };

    let mut visible = layer.visible;
    for id in &layer.ids {
      if !renderer.has_layer(id) {
        continue;
      }
      let is_visible = renderer
        .layout_property(id, "visibility")
        .is_none_or(|current| current == "visible");
      let target = if is_visible { "none" } else { "visible" };
      if let Err(e) = renderer.set_layout_property(id, "visibility", json!(target)) {
        debug!("Failed to toggle {id}: {e}");
        continue;
      }
      visible = !is_visible;
    }
    layer.visible = visible;

    self.registry.notify();
  }

  /// Dispatches every queued renderer event. Map level events are handed back to the caller.
  pub fn process_pending_events(&mut self) -> Vec<MapNotice> {
    let mut notices = Vec::new();
    self.dispatch_pending_events(&mut |notice: MapNotice| notices.push(notice));
    notices
  }

  /// Like [`MapEngine::process_pending_events`], but hands each map level event to `on_notice`
  /// in order with the layer callbacks of the same batch.
  pub fn dispatch_pending_events(&mut self, on_notice: &mut dyn FnMut(MapNotice)) {
    profile_scope!("dispatch_pending_events");
    let events: Vec<MapEvent> = self.events_rx.try_iter().collect();
    for event in events {
      let Some(binding) = self.handlers.get(&event.handler).cloned() else {
        debug!("Dropping {} event of detached {}", event.kind.name(), event.handler);
        continue;
      };
      match binding {
        HandlerBinding::MapLoad => on_notice(MapNotice::Loaded),
        HandlerBinding::MapClick => on_notice(MapNotice::Clicked {
          point: event.payload.point,
          lng_lat: event.payload.lng_lat,
          default_prevented: std::mem::take(&mut self.click_default_prevented),
        }),
        HandlerBinding::DrawCreate => self.handle_draw_create(&event.payload),
        HandlerBinding::DrawModeChange => self.handle_draw_mode_change(&event.payload),
        binding => {
          self.dispatch_interaction(binding, event.payload);
        }
      }
    }
  }

  /// Drops queued events without dispatching them.
  pub fn discard_pending_events(&mut self) {
    let dropped = self.events_rx.try_iter().count();
    if dropped > 0 {
      debug!("Discarded {dropped} pending map events");
    }
  }

  fn reset_tracking(&mut self) {
    self.registry.clear();
    self.render_state.clear();
    self.layer_handlers.clear();
    self.selected_features.clear();
    self.animation = DashAnimation::default();
    self.lasso.layer_key = None;
    self.lasso.callback = None;
    self.click_default_prevented = false;
  }

  /// Tears the map down: cancels the animation, leaves lasso mode, detaches every handler and
  /// destroys the renderer. Tracking is reset and any initialization in flight is superseded.
  pub fn dispose(&mut self) {
    self.stop_dash_animation();
    if self.renderer.is_some() {
      self.disable_lasso_selection(false);
      self.clear_handlers();
      for handler in std::mem::take(&mut self.map_handlers) {
        self.unbind(handler);
      }
    }
    if let Some(mut renderer) = self.renderer.take() {
      renderer.destroy();
    }
    self.handlers.clear();
    self.reset_tracking();
    self.lasso = LassoState::default();
    self.discard_pending_events();
    self.init_ticket += 1;
    self.registry.notify();
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, rc::Rc};

  use serde_json::{Value, json};

  use super::*;
  use crate::{
    map::{
      map_event::{EventPayload, ScreenPoint},
      renderer::{Container, DEFAULT_BASEMAP, MapView, MemoryHandle, MemoryRenderer},
    },
    parser::test_utils::{collection_cell, element_data, line_feature, point_feature, polygon_feature},
  };

  fn engine() -> (MapEngine, MemoryHandle) {
    let mut engine = MapEngine::new();
    let renderer = MemoryRenderer::new(
      &Container::new("map"),
      DEFAULT_BASEMAP,
      MapView::default(),
      engine.events_sender(),
    );
    let handle = renderer.handle();
    engine.attach(Box::new(renderer));
    (engine, handle)
  }

  fn data(features: Vec<Value>) -> ElementData {
    element_data("geometry", vec![collection_cell(features)])
  }

  #[test]
  fn attach_adds_navigation_and_map_handlers() {
    let (engine, handle) = engine();
    assert!(engine.is_initialized());
    assert!(handle.has_control(Control::Navigation));
    assert!(handle.has_handler(EventKind::Load, None));
    assert!(handle.has_handler(EventKind::Click, None));
  }

  #[test]
  fn unknown_keys_are_ignored() {
    let (mut engine, handle) = engine();
    let data = data(vec![point_feature(1., 1.)]);
    engine.sync_layer(
      "layer9",
      Some(&data),
      &LayerConfig::new("layer9", "Nine"),
      &LayerCallbacks::new(),
    );
    assert!(handle.source_ids().is_empty());
    assert!(engine.tracked_layers().is_empty());
  }

  #[test]
  fn sync_without_renderer_is_a_noop() {
    let mut engine = MapEngine::new();
    let data = data(vec![point_feature(1., 1.)]);
    engine.sync_layer(
      "layer1",
      Some(&data),
      &LayerConfig::new("layer1", "Routes"),
      &LayerCallbacks::new(),
    );
    assert!(engine.tracked_layers().is_empty());
  }

  #[test]
  fn repeated_sync_does_not_touch_the_renderer() {
    let (mut engine, handle) = engine();
    let config = LayerConfig::new("layer2", "Branches").with_cluster_points(true);
    let data = data(vec![point_feature(1., 1.), line_feature(&[(0., 0.), (1., 1.)])]);
    engine.sync_layer("layer2", Some(&data), &config, &LayerCallbacks::new());
    let mutations = handle.mutations();
    let handlers = handle.handler_count();
    engine.sync_layer("layer2", Some(&data), &config, &LayerCallbacks::new());
    assert_eq!(handle.mutations(), mutations);
    assert_eq!(handle.handler_count(), handlers);
  }

  #[test]
  fn empty_data_removes_everything_and_hides_the_layer() {
    let (mut engine, handle) = engine();
    let config = LayerConfig::new("layer1", "Routes").with_fill_polygons(true);
    let data = data(vec![
      polygon_feature(&[(0., 0.), (1., 0.), (1., 1.), (0., 0.)]),
      point_feature(3., 3.),
    ]);
    engine.sync_layer("layer1", Some(&data), &config, &LayerCallbacks::new());
    assert_eq!(
      engine.tracked_layers()[0].ids,
      vec!["line-dashed-layer1", "polygon-fill-layer-layer1", "point-layer-layer1"]
    );

    engine.sync_layer("layer1", Some(&ElementData::new()), &config, &LayerCallbacks::new());
    assert!(handle.layer_ids().is_empty());
    assert!(handle.source_ids().is_empty());
    let layer = &engine.tracked_layers()[0];
    assert!(layer.ids.is_empty());
    assert!(!layer.visible);

    engine.sync_layer("layer1", Some(&data), &config, &LayerCallbacks::new());
    assert!(engine.tracked_layers()[0].visible);
  }

  #[test]
  fn data_without_features_clears_the_layer() {
    let (mut engine, handle) = engine();
    let config = LayerConfig::new("layer3", "Regions");
    engine.sync_layer(
      "layer3",
      Some(&data(vec![point_feature(1., 1.)])),
      &config,
      &LayerCallbacks::new(),
    );
    engine.sync_layer(
      "layer3",
      Some(&element_data("geometry", vec![json!("not json")])),
      &config,
      &LayerCallbacks::new(),
    );
    assert!(handle.layer_ids().is_empty());
    assert!(engine.tracked_layers()[0].ids.is_empty());
  }

  #[test]
  fn hidden_layers_stay_hidden_across_syncs() {
    let (mut engine, handle) = engine();
    let config = LayerConfig::new("layer1", "Routes");
    engine.sync_layer(
      "layer1",
      Some(&data(vec![line_feature(&[(0., 0.), (1., 1.)])])),
      &config,
      &LayerCallbacks::new(),
    );
    engine.toggle_layer_visibility("layer1");
    assert!(!engine.tracked_layers()[0].visible);

    engine.sync_layer(
      "layer1",
      Some(&data(vec![line_feature(&[(0., 0.), (1., 1.)]), point_feature(2., 2.)])),
      &config,
      &LayerCallbacks::new(),
    );
    assert!(!engine.tracked_layers()[0].visible);
    let point_layer = handle.layer("point-layer-layer1").unwrap();
    assert_eq!(point_layer.layout.get("visibility"), Some(&json!("none")));
  }

  #[test]
  fn animated_lines_drive_the_frame_loop() {
    let (mut engine, handle) = engine();
    let config = LayerConfig::new("layer1", "Routes").with_animate_lines(true);
    let data = data(vec![line_feature(&[(0., 0.), (1., 1.)])]);
    engine.sync_layer("layer1", Some(&data), &config, &LayerCallbacks::new());
    assert_eq!(engine.animated_layers(), ["line-dashed-layer1"]);
    assert!(engine.has_pending_frame());

    let frame = handle.take_due_frame().unwrap();
    engine.on_animation_frame(frame, 120.);
    let dashed = handle.layer("line-dashed-layer1").unwrap();
    assert_eq!(dashed.paint["line-dasharray"], json!(DASH_SEQUENCE[2]));
    assert_eq!(handle.pending_frames(), 1);

    engine.sync_layer(
      "layer1",
      Some(&data),
      &config.clone().with_animate_lines(false),
      &LayerCallbacks::new(),
    );
    assert!(engine.animated_layers().is_empty());
    assert!(!engine.has_pending_frame());
    assert_eq!(handle.pending_frames(), 0);
  }

  #[test]
  fn hover_marks_one_feature_at_a_time() {
    let (mut engine, handle) = engine();
    let entered = Rc::new(RefCell::new(Vec::new()));
    let sink = entered.clone();
    let callbacks = LayerCallbacks::new().with_hover_enter(move |feature, _| {
      sink.borrow_mut().push(feature.point());
    });
    let data = data(vec![point_feature(1., 1.), point_feature(4., 4.)]);
    engine.sync_layer("layer4", Some(&data), &LayerConfig::new("layer4", "Sites"), &callbacks);

    handle.hover("point-layer-layer4", ScreenPoint::new(1., 1.));
    engine.process_pending_events();
    handle.hover("point-layer-layer4", ScreenPoint::new(4., 4.));
    engine.process_pending_events();

    assert_eq!(*entered.borrow(), vec![Some([1., 1.]), Some([4., 4.])]);
    let source = "point-layer4";
    assert_eq!(handle.feature_state(source, &crate::map::feature::FeatureId::Number(0)), Some(false));
    assert_eq!(handle.feature_state(source, &crate::map::feature::FeatureId::Number(1)), Some(true));
    assert_eq!(handle.cursor(), crate::map::renderer::Cursor::Pointer);

    handle.fire(EventKind::MouseLeave, Some("point-layer-layer4"), &EventPayload::default());
    engine.process_pending_events();
    assert_eq!(handle.cursor(), crate::map::renderer::Cursor::Default);
    assert_eq!(handle.feature_state(source, &crate::map::feature::FeatureId::Number(1)), Some(false));
  }

  #[test]
  fn layer_clicks_prevent_the_map_click_default() {
    let (mut engine, handle) = engine();
    let selected = Rc::new(RefCell::new(0));
    let sink = selected.clone();
    let callbacks = LayerCallbacks::new().with_feature_select(move |features, _| {
      *sink.borrow_mut() += features.len();
    });
    let data = data(vec![point_feature(1., 1.)]);
    engine.sync_layer(
      "scatterLayer",
      Some(&data),
      &LayerConfig::new("scatterLayer", "Scatter"),
      &callbacks,
    );

    handle.click(ScreenPoint::new(1., 1.), false);
    let notices = engine.process_pending_events();
    assert_eq!(*selected.borrow(), 1);
    assert!(matches!(
      notices.as_slice(),
      [MapNotice::Clicked { default_prevented: true, .. }]
    ));

    handle.click(ScreenPoint::new(8., 8.), false);
    let notices = engine.process_pending_events();
    assert!(matches!(
      notices.as_slice(),
      [MapNotice::Clicked { default_prevented: false, .. }]
    ));
  }

  #[test]
  fn cluster_click_eases_to_the_expansion_zoom() {
    let (mut engine, handle) = engine();
    let mut cluster = point_feature(2., 3.);
    cluster["properties"] = json!({"cluster": true, "cluster_id": 7, "point_count": 120});
    let data = data(vec![cluster, point_feature(9., 9.)]);
    engine.sync_layer(
      "layer2",
      Some(&data),
      &LayerConfig::new("layer2", "Branches").with_cluster_points(true),
      &LayerCallbacks::new(),
    );
    handle.set_cluster_expansion_zoom(7, 9.);

    handle.click(ScreenPoint::new(2., 3.), false);
    engine.process_pending_events();
    let camera = handle.camera();
    assert_eq!(camera.center, [2., 3.]);
    assert_approx_eq::assert_approx_eq!(camera.zoom, 9.);
  }

  #[test]
  fn clear_map_layers_removes_all_engine_artifacts() {
    let (mut engine, handle) = engine();
    let data = data(vec![point_feature(1., 1.), line_feature(&[(0., 0.), (1., 1.)])]);
    for key in ["layer1", "layer2"] {
      engine.sync_layer(key, Some(&data), &LayerConfig::new(key, key), &LayerCallbacks::new());
    }
    engine.clear_map_layers();
    assert!(handle.layer_ids().is_empty());
    assert!(handle.source_ids().is_empty());
    assert!(engine.tracked_layers().is_empty());
    assert_eq!(handle.handler_count(), 2);

    engine.sync_layer("layer1", Some(&data), &LayerConfig::new("layer1", "layer1"), &LayerCallbacks::new());
    assert_eq!(engine.tracked_layers().len(), 1);
  }

  #[test]
  fn dispose_destroys_the_renderer_and_resets_tracking() {
    let (mut engine, handle) = engine();
    let snapshots = Rc::new(RefCell::new(Vec::new()));
    let sink = snapshots.clone();
    engine.subscribe(Box::new(move |layers| sink.borrow_mut().push(layers.len())));
    let data = data(vec![line_feature(&[(0., 0.), (1., 1.)])]);
    engine.sync_layer(
      "layer1",
      Some(&data),
      &LayerConfig::new("layer1", "Routes").with_animate_lines(true),
      &LayerCallbacks::new(),
    );
    let ticket = engine.begin_init();

    engine.dispose();
    assert!(!engine.is_initialized());
    assert!(handle.is_destroyed());
    assert_eq!(handle.pending_frames(), 0);
    assert!(engine.tracked_layers().is_empty());
    assert!(!engine.is_current(ticket));
    assert_eq!(snapshots.borrow().last(), Some(&0));
  }
}
