use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::{feature::Feature, renderer::DrawMode};

/// Identifies a handler registered on the renderer. Events carry the id of the handler they
/// were dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl Display for HandlerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "handler#{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
  Load,
  Click,
  MouseEnter,
  MouseMove,
  MouseLeave,
  DrawCreate,
  DrawModeChange,
}

impl EventKind {
  #[must_use]
  pub fn name(&self) -> &'static str {
    match self {
      EventKind::Load => "load",
      EventKind::Click => "click",
      EventKind::MouseEnter => "mouseenter",
      EventKind::MouseMove => "mousemove",
      EventKind::MouseLeave => "mouseleave",
      EventKind::DrawCreate => "draw.create",
      EventKind::DrawModeChange => "draw.modechange",
    }
  }

  #[must_use]
  pub fn all() -> &'static [EventKind] {
    &[
      EventKind::Load,
      EventKind::Click,
      EventKind::MouseEnter,
      EventKind::MouseMove,
      EventKind::MouseLeave,
      EventKind::DrawCreate,
      EventKind::DrawModeChange,
    ]
  }
}

/// Pointer position in screen coordinates of the map container.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
  pub x: f64,
  pub y: f64,
}

impl ScreenPoint {
  #[must_use]
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }
}

/// What the renderer knows about the user input that triggered an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventPayload {
  pub point: ScreenPoint,
  pub lng_lat: Option<[f64; 2]>,
  /// Features under the pointer, or the drawn shapes of a draw event.
  pub features: Vec<Feature>,
  /// Modifier for additive selection (shift) held.
  pub additive: bool,
  /// The new mode of a draw mode change.
  pub mode: Option<DrawMode>,
}

impl EventPayload {
  #[must_use]
  pub fn at(point: ScreenPoint) -> Self {
    Self {
      point,
      ..Self::default()
    }
  }

  #[must_use]
  pub fn with_features(mut self, features: Vec<Feature>) -> Self {
    self.features = features;
    self
  }

  #[must_use]
  pub fn with_additive(mut self, additive: bool) -> Self {
    self.additive = additive;
    self
  }

  #[must_use]
  pub fn with_mode(mut self, mode: DrawMode) -> Self {
    self.mode = Some(mode);
    self
  }
}

/// An event dispatched by the renderer to one registered handler.
///
/// Renderers send these through the channel handed to them on creation; the engine drains the
/// channel in `MapEngine::process_pending_events`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
  pub handler: HandlerId,
  pub kind: EventKind,
  pub payload: EventPayload,
}

/// Map level notifications handed back to the owner of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MapNotice {
  /// The renderer finished loading its style.
  Loaded,
  /// A click on the map. `default_prevented` is set when a layer handler consumed the click.
  Clicked {
    point: ScreenPoint,
    lng_lat: Option<[f64; 2]>,
    default_prevented: bool,
  },
}
