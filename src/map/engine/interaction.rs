use std::{fmt::Debug, rc::Rc};

use serde_json::Value;

use super::MapEngine;
use crate::map::{
  feature::Feature,
  map_event::{EventKind, EventPayload, HandlerId, ScreenPoint},
  renderer::{Camera, Cursor, RenderedQuery},
};

pub type HoverEnterFn = Rc<dyn Fn(&Feature, ScreenPoint)>;
pub type HoverMoveFn = Rc<dyn Fn(ScreenPoint)>;
pub type HoverLeaveFn = Rc<dyn Fn()>;
/// Receives the clicked features and whether the click was additive.
pub type FeatureSelectFn = Rc<dyn Fn(&[Feature], bool)>;

/// Callbacks of one layer. Every member is optional.
///
/// Callbacks run while the engine is borrowed and must not call back into it.
#[derive(Clone, Default)]
pub struct LayerCallbacks {
  pub on_hover_enter: Option<HoverEnterFn>,
  pub on_hover_move: Option<HoverMoveFn>,
  pub on_hover_leave: Option<HoverLeaveFn>,
  pub on_feature_select: Option<FeatureSelectFn>,
}

impl LayerCallbacks {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn with_hover_enter(mut self, f: impl Fn(&Feature, ScreenPoint) + 'static) -> Self {
    self.on_hover_enter = Some(Rc::new(f));
    self
  }

  #[must_use]
  pub fn with_hover_move(mut self, f: impl Fn(ScreenPoint) + 'static) -> Self {
    self.on_hover_move = Some(Rc::new(f));
    self
  }

  #[must_use]
  pub fn with_hover_leave(mut self, f: impl Fn() + 'static) -> Self {
    self.on_hover_leave = Some(Rc::new(f));
    self
  }

  #[must_use]
  pub fn with_feature_select(mut self, f: impl Fn(&[Feature], bool) + 'static) -> Self {
    self.on_feature_select = Some(Rc::new(f));
    self
  }

  fn hover_leave(&self) {
    if let Some(f) = &self.on_hover_leave {
      f();
    }
  }
}

impl Debug for LayerCallbacks {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LayerCallbacks")
      .field("on_hover_enter", &self.on_hover_enter.is_some())
      .field("on_hover_move", &self.on_hover_move.is_some())
      .field("on_hover_leave", &self.on_hover_leave.is_some())
      .field("on_feature_select", &self.on_feature_select.is_some())
      .finish()
  }
}

/// What a registered handler does when its event arrives.
#[derive(Clone, Debug)]
pub(super) enum HandlerBinding {
  HoverEnter {
    layer_id: String,
    callbacks: LayerCallbacks,
  },
  HoverMove {
    callbacks: LayerCallbacks,
  },
  HoverLeave {
    layer_id: String,
    callbacks: LayerCallbacks,
  },
  Select {
    layer_id: String,
    callbacks: LayerCallbacks,
  },
  ClusterClick {
    layer_id: String,
    source_id: String,
  },
  ClusterEnter {
    callbacks: LayerCallbacks,
  },
  ClusterLeave,
  MapLoad,
  MapClick,
  DrawCreate,
  DrawModeChange,
}

impl MapEngine {
  pub(super) fn bind(
    &mut self,
    kind: EventKind,
    layer: Option<&str>,
    binding: HandlerBinding,
  ) -> Option<HandlerId> {
    let renderer = self.renderer.as_mut()?;
    let handler = renderer.on(kind, layer);
    self.handlers.insert(handler, binding);
    Some(handler)
  }

  pub(super) fn unbind(&mut self, handler: HandlerId) {
    if let Some(renderer) = self.renderer.as_mut() {
      renderer.off(handler);
    }
    self.handlers.remove(&handler);
  }

  /// Hover handlers on a sub-layer, plus a click handler when the callbacks select features.
  /// A sub-layer keeps the handlers it already has.
  pub(super) fn register_hover_handlers(&mut self, layer_id: &str, callbacks: &LayerCallbacks) {
    let exists = self
      .renderer
      .as_ref()
      .is_some_and(|r| r.has_layer(layer_id));
    if !exists || self.layer_handlers.contains_key(layer_id) {
      return;
    }

    let layer = Some(layer_id);
    let mut handlers = Vec::new();
    handlers.extend(self.bind(
      EventKind::MouseEnter,
      layer,
      HandlerBinding::HoverEnter {
        layer_id: layer_id.to_string(),
        callbacks: callbacks.clone(),
      },
    ));
    handlers.extend(self.bind(
      EventKind::MouseMove,
      layer,
      HandlerBinding::HoverMove {
        callbacks: callbacks.clone(),
      },
    ));
    handlers.extend(self.bind(
      EventKind::MouseLeave,
      layer,
      HandlerBinding::HoverLeave {
        layer_id: layer_id.to_string(),
        callbacks: callbacks.clone(),
      },
    ));
    if callbacks.on_feature_select.is_some() {
      handlers.extend(self.bind(
        EventKind::Click,
        layer,
        HandlerBinding::Select {
          layer_id: layer_id.to_string(),
          callbacks: callbacks.clone(),
        },
      ));
    }
    self.layer_handlers.insert(layer_id.to_string(), handlers);
  }

  /// Click-to-zoom and cursor handling on both cluster sub-layers.
  pub(super) fn setup_cluster_interaction(
    &mut self,
    source_id: &str,
    cluster_layers: [&str; 2],
    callbacks: &LayerCallbacks,
  ) {
    for layer_id in cluster_layers {
      let exists = self
        .renderer
        .as_ref()
        .is_some_and(|r| r.has_layer(layer_id));
      if !exists || self.layer_handlers.contains_key(layer_id) {
        continue;
      }
      let layer = Some(layer_id);
      let mut handlers = Vec::new();
      handlers.extend(self.bind(
        EventKind::Click,
        layer,
        HandlerBinding::ClusterClick {
          layer_id: layer_id.to_string(),
          source_id: source_id.to_string(),
        },
      ));
      handlers.extend(self.bind(
        EventKind::MouseEnter,
        layer,
        HandlerBinding::ClusterEnter {
          callbacks: callbacks.clone(),
        },
      ));
      handlers.extend(self.bind(EventKind::MouseLeave, layer, HandlerBinding::ClusterLeave));
      self.layer_handlers.insert(layer_id.to_string(), handlers);
    }
  }

  /// Removes the handlers of one sub-layer and its highlighted feature.
  pub(super) fn detach_layer_handlers(&mut self, layer_id: &str) {
    if let Some(handlers) = self.layer_handlers.remove(layer_id) {
      for handler in handlers {
        self.unbind(handler);
      }
    }
    self.update_selected_feature(layer_id, None);
  }

  /// Detaches every sub-layer handler. Map level handlers stay.
  pub fn clear_handlers(&mut self) {
    let layer_ids: Vec<String> = self.layer_handlers.keys().cloned().collect();
    for layer_id in layer_ids {
      if let Some(handlers) = self.layer_handlers.remove(&layer_id) {
        for handler in handlers {
          self.unbind(handler);
        }
      }
    }
  }

  /// Moves the `selected` feature-state of a sub-layer to `feature`. At most one feature per
  /// sub-layer carries it. Failures are ignored.
  pub(super) fn update_selected_feature(&mut self, layer_id: &str, feature: Option<&Feature>) {
    let previous = self.selected_features.remove(layer_id);
    let Some(renderer) = self.renderer.as_mut() else {
      return;
    };
    if let Some(previous) = previous {
      let _ = renderer
        .set_feature_state(&previous, false)
        .inspect_err(|e| log::debug!("Failed to clear feature state on {layer_id}: {e}"));
    }
    if let Some(feature) = feature {
      match renderer.set_feature_state(feature, true) {
        Ok(()) => {
          self
            .selected_features
            .insert(layer_id.to_string(), feature.clone());
        }
        Err(e) => log::debug!("Failed to set feature state on {layer_id}: {e}"),
      }
    }
  }

  /// Returns whether the binding was an interaction binding.
  pub(super) fn dispatch_interaction(
    &mut self,
    binding: HandlerBinding,
    payload: EventPayload,
  ) -> bool {
    match binding {
      HandlerBinding::HoverEnter {
        layer_id,
        callbacks,
      } => {
        self.set_cursor(Cursor::Pointer);
        if let Some(feature) = payload.features.first() {
          self.update_selected_feature(&layer_id, Some(feature));
          if let Some(f) = &callbacks.on_hover_enter {
            f(feature, payload.point);
          }
        }
      }
      HandlerBinding::HoverMove { callbacks } => {
        if let Some(f) = &callbacks.on_hover_move {
          f(payload.point);
        }
      }
      HandlerBinding::HoverLeave {
        layer_id,
        callbacks,
      } => {
        self.set_cursor(Cursor::Default);
        self.update_selected_feature(&layer_id, None);
        callbacks.hover_leave();
      }
      HandlerBinding::Select {
        layer_id,
        callbacks,
      } => {
        self.click_default_prevented = true;
        let features = if payload.features.is_empty() {
          self
            .renderer
            .as_ref()
            .map(|r| r.query_rendered_features(&RenderedQuery::layer(&layer_id).at(payload.point)))
            .unwrap_or_default()
        } else {
          payload.features
        };
        if let Some(f) = &callbacks.on_feature_select {
          f(&features, payload.additive);
        }
      }
      HandlerBinding::ClusterClick {
        layer_id,
        source_id,
      } => self.expand_cluster(&layer_id, &source_id, payload.point),
      HandlerBinding::ClusterEnter { callbacks } => {
        self.set_cursor(Cursor::Pointer);
        callbacks.hover_leave();
      }
      HandlerBinding::ClusterLeave => self.set_cursor(Cursor::Default),
      _ => return false,
    }
    true
  }

  fn set_cursor(&mut self, cursor: Cursor) {
    if let Some(renderer) = self.renderer.as_mut() {
      renderer.set_cursor(cursor);
    }
  }

  /// Eases to the clicked cluster at the zoom where it breaks apart.
  fn expand_cluster(&mut self, layer_id: &str, source_id: &str, point: ScreenPoint) {
    let Some(renderer) = self.renderer.as_mut() else {
      return;
    };
    let hits = renderer.query_rendered_features(&RenderedQuery::layer(layer_id).at(point));
    let Some(cluster) = hits.first() else {
      return;
    };
    let Some(cluster_id) = cluster.properties.get("cluster_id").and_then(Value::as_u64) else {
      return;
    };
    let Some(center) = cluster.point() else {
      return;
    };
    match renderer.cluster_expansion_zoom(source_id, cluster_id) {
      Ok(zoom) => renderer.ease_to(Camera { center, zoom }),
      Err(e) => log::debug!("No expansion zoom for cluster {cluster_id}: {e}"),
    }
  }
}
