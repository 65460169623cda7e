use std::rc::Rc;

use geo_types::{Coord, LineString, Polygon};
use serde_json::Value;

use super::{MapEngine, interaction::HandlerBinding, styles::LayerIds};
use crate::map::{
  feature::{Feature, Geometry, GeometryKind},
  map_event::{EventKind, EventPayload, HandlerId},
  renderer::{Control, ControlPosition, DrawControl, DrawMode, Gesture, RenderedQuery},
};

/// Receives the points inside a completed lasso.
pub type LassoCallback = Rc<dyn Fn(&[Feature])>;

#[derive(Default)]
pub(super) struct LassoState {
  pub draw: Option<Box<dyn DrawControl>>,
  pub control_added: bool,
  pub layer_key: Option<String>,
  pub callback: Option<LassoCallback>,
  pub handlers: Vec<HandlerId>,
}

/// Even-odd ray casting.
#[must_use]
pub fn point_in_ring(point: Coord<f64>, ring: &LineString<f64>) -> bool {
  let coords = &ring.0;
  let mut inside = false;
  let mut j = coords.len().wrapping_sub(1);
  for (i, current) in coords.iter().enumerate() {
    let previous = coords[j];
    if (current.y > point.y) != (previous.y > point.y)
      && point.x
        < (previous.x - current.x) * (point.y - current.y) / (previous.y - current.y) + current.x
    {
      inside = !inside;
    }
    j = i;
  }
  inside
}

/// Inside the exterior ring and outside every hole.
#[must_use]
pub fn point_in_polygon(point: Coord<f64>, polygon: &Polygon<f64>) -> bool {
  point_in_ring(point, polygon.exterior())
    && !polygon
      .interiors()
      .iter()
      .any(|hole| point_in_ring(point, hole))
}

fn ring(value: &Value) -> Option<LineString<f64>> {
  value
    .as_array()?
    .iter()
    .map(|position| {
      let position = position.as_array()?;
      Some(Coord {
        x: position.first()?.as_f64()?,
        y: position.get(1)?.as_f64()?,
      })
    })
    .collect::<Option<Vec<_>>>()
    .map(LineString::new)
}

fn polygon(rings: &Value) -> Option<Polygon<f64>> {
  let mut rings = rings.as_array()?.iter();
  let exterior = ring(rings.next()?)?;
  let interiors = rings.filter_map(ring).collect();
  Some(Polygon::new(exterior, interiors))
}

/// The polygons of a drawn lasso shape. Other geometries select nothing.
#[must_use]
pub fn lasso_polygons(geometry: &Geometry) -> Vec<Polygon<f64>> {
  match geometry.kind {
    GeometryKind::Polygon => polygon(&geometry.coordinates).into_iter().collect(),
    GeometryKind::MultiPolygon => geometry
      .coordinates
      .as_array()
      .map(|polygons| polygons.iter().filter_map(polygon).collect())
      .unwrap_or_default(),
    _ => Vec::new(),
  }
}

/// The features whose position lies in any of the polygons. Clusters are never selected.
#[must_use]
pub fn select_within(features: &[Feature], polygons: &[Polygon<f64>]) -> Vec<Feature> {
  features
    .iter()
    .filter(|f| !f.is_cluster())
    .filter(|f| {
      f.point().is_some_and(|[x, y]| {
        polygons
          .iter()
          .any(|polygon| point_in_polygon(Coord { x, y }, polygon))
      })
    })
    .cloned()
    .collect()
}

impl MapEngine {
  #[must_use]
  pub fn has_draw_control(&self) -> bool {
    self.lasso.draw.is_some()
  }

  pub(crate) fn install_draw_control(&mut self, draw: Box<dyn DrawControl>) {
    if self.lasso.draw.is_none() {
      self.lasso.draw = Some(draw);
    }
  }

  /// Enters lasso mode on the point sub-layer of `layer_key`. Needs a live map and a loaded draw
  /// control.
  pub fn activate_lasso(&mut self, layer_key: &str, callback: LassoCallback) -> bool {
    if self.renderer.is_none() || self.lasso.draw.is_none() {
      return false;
    }
    if !self.lasso.control_added
      && let Some(renderer) = self.renderer.as_mut()
    {
      renderer.add_control(Control::Draw, ControlPosition::TopLeft);
      self.lasso.control_added = true;
    }

    self.disable_lasso_selection(true);

    self.lasso.layer_key = Some(layer_key.to_string());
    self.lasso.callback = Some(callback);
    let handlers: Vec<_> = [
      self.bind(EventKind::DrawCreate, None, HandlerBinding::DrawCreate),
      self.bind(EventKind::DrawModeChange, None, HandlerBinding::DrawModeChange),
    ]
    .into_iter()
    .flatten()
    .collect();
    self.lasso.handlers = handlers;

    if let Some(draw) = self.lasso.draw.as_mut() {
      draw.delete_all();
      draw.change_mode(DrawMode::DrawPolygon);
    }
    if let Some(renderer) = self.renderer.as_mut() {
      for gesture in Gesture::all() {
        renderer.set_gesture_enabled(*gesture, false);
      }
    }
    true
  }

  /// Leaves lasso mode. The draw control is removed unless `preserve_control` is set, in which
  /// case it is only reset.
  pub fn disable_lasso_selection(&mut self, preserve_control: bool) {
    if self.renderer.is_none() {
      self.lasso.layer_key = None;
      self.lasso.callback = None;
      return;
    }

    let handlers = std::mem::take(&mut self.lasso.handlers);
    for handler in handlers {
      self.unbind(handler);
    }
    if let Some(draw) = self.lasso.draw.as_mut() {
      draw.delete_all();
      if !preserve_control && self.lasso.control_added {
        if let Some(renderer) = self.renderer.as_mut() {
          renderer.remove_control(Control::Draw);
        }
        self.lasso.control_added = false;
      } else {
        draw.change_mode(DrawMode::SimpleSelect);
      }
    }
    if let Some(renderer) = self.renderer.as_mut() {
      for gesture in Gesture::all() {
        renderer.set_gesture_enabled(*gesture, true);
      }
    }
    self.lasso.layer_key = None;
    self.lasso.callback = None;
  }

  #[must_use]
  pub fn is_lasso_active(&self) -> bool {
    self.renderer.is_some() && self.lasso.draw.is_some() && self.lasso.layer_key.is_some()
  }

  /// Keeps the draw control in polygon mode while lassoing.
  pub(super) fn handle_draw_mode_change(&mut self, payload: &EventPayload) {
    if !self.is_lasso_active() {
      return;
    }
    if payload.mode != Some(DrawMode::DrawPolygon)
      && let Some(draw) = self.lasso.draw.as_mut()
    {
      draw.change_mode(DrawMode::DrawPolygon);
    }
  }

  /// Selects the rendered points of the active layer inside the drawn shape, then clears the
  /// shape for the next lasso.
  pub(super) fn handle_draw_create(&mut self, payload: &EventPayload) {
    let (Some(layer_key), Some(renderer)) = (self.lasso.layer_key.as_ref(), self.renderer.as_ref())
    else {
      return;
    };
    let Some(shape) = payload.features.first() else {
      return;
    };
    let Some(geometry) = shape.geometry.as_ref() else {
      return;
    };

    let point_layer = LayerIds::new(layer_key).point_layer;
    let rendered = renderer.query_rendered_features(&RenderedQuery::layer(&point_layer));
    let selected = select_within(&rendered, &lasso_polygons(geometry));
    log::debug!(
      "Lasso selected {} of {} points on {point_layer}",
      selected.len(),
      rendered.len()
    );

    if let Some(callback) = self.lasso.callback.clone() {
      callback(&selected);
    }

    if let (Some(draw), Some(id)) = (self.lasso.draw.as_mut(), shape.id.as_ref()) {
      draw.delete(id);
      draw.change_mode(DrawMode::DrawPolygon);
    }
  }
}
