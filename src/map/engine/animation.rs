use serde_json::json;

use super::MapEngine;
use crate::{map::renderer::FrameRequest, profile_scope};

/// Dash patterns cycled through by animated lines.
pub const DASH_SEQUENCE: [&[f64]; 14] = [
  &[0., 4., 3.],
  &[0.5, 4., 2.5],
  &[1., 4., 2.],
  &[1.5, 4., 1.5],
  &[2., 4., 1.],
  &[2.5, 4., 0.5],
  &[3., 4., 0.],
  &[0., 0.5, 3., 3.5],
  &[0., 1., 3., 3.],
  &[0., 1.5, 3., 2.5],
  &[0., 2., 3., 2.],
  &[0., 2.5, 3., 1.5],
  &[0., 3., 3., 1.],
  &[0., 3.5, 3., 0.5],
];

/// Milliseconds each dash pattern is shown.
const STEP_MS: f64 = 50.;

/// Index into [`DASH_SEQUENCE`] for a frame timestamp.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn dash_step(timestamp_ms: f64) -> usize {
  if !timestamp_ms.is_finite() || timestamp_ms < 0. {
    return 0;
  }
  ((timestamp_ms / STEP_MS).floor() as u64 % DASH_SEQUENCE.len() as u64) as usize
}

/// State of the shared dash animation loop.
#[derive(Debug, Default)]
pub(super) struct DashAnimation {
  /// Foreground line sub-layers that are animated.
  pub layers: Vec<String>,
  pub step: usize,
  pub frame: Option<FrameRequest>,
}

impl DashAnimation {
  pub fn track(&mut self, layer_id: &str) {
    if !self.layers.iter().any(|id| id == layer_id) {
      self.layers.push(layer_id.to_string());
    }
  }

  pub fn untrack(&mut self, layer_id: &str) {
    self.layers.retain(|id| id != layer_id);
  }
}

impl MapEngine {
  /// (Re)starts the animation loop. Only requests a frame while animated lines exist.
  pub fn animate_dash_array(&mut self) {
    self.stop_dash_animation();
    if self.animation.layers.is_empty() {
      return;
    }
    if let Some(renderer) = self.renderer.as_mut() {
      self.animation.frame = Some(renderer.request_frame());
    }
  }

  pub fn stop_dash_animation(&mut self) {
    if let Some(frame) = self.animation.frame.take()
      && let Some(renderer) = self.renderer.as_mut()
    {
      renderer.cancel_frame(frame);
    }
  }

  /// Runs a due frame: applies the dash pattern of `timestamp_ms` if it changed and schedules
  /// the next frame. Frames other than the pending one are ignored.
  pub fn on_animation_frame(&mut self, frame: FrameRequest, timestamp_ms: f64) {
    profile_scope!("on_animation_frame");
    if self.animation.frame != Some(frame) {
      return;
    }
    self.animation.frame = None;
    let Some(renderer) = self.renderer.as_mut() else {
      return;
    };

    let step = dash_step(timestamp_ms);
    if step != self.animation.step {
      for layer_id in &self.animation.layers {
        if renderer.has_layer(layer_id) {
          let _ = renderer
            .set_paint_property(layer_id, "line-dasharray", json!(DASH_SEQUENCE[step]))
            .inspect_err(|e| log::debug!("Failed to animate {layer_id}: {e}"));
        }
      }
      self.animation.step = step;
    }
    self.animation.frame = Some(renderer.request_frame());
  }

  #[must_use]
  pub fn has_pending_frame(&self) -> bool {
    self.animation.frame.is_some()
  }

  #[must_use]
  pub fn animated_layers(&self) -> &[String] {
    &self.animation.layers
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rstest::rstest;

  #[rstest]
  #[case(0., 0)]
  #[case(49.9, 0)]
  #[case(50., 1)]
  #[case(699., 13)]
  #[case(700., 0)]
  #[case(1234., 10)]
  #[case(-5., 0)]
  fn steps_every_fifty_milliseconds(#[case] timestamp: f64, #[case] step: usize) {
    assert_eq!(dash_step(timestamp), step);
  }

  #[test]
  fn sequence_patterns_have_constant_length() {
    for pattern in DASH_SEQUENCE {
      let total: f64 = pattern.iter().sum();
      assert_approx_eq::assert_approx_eq!(total, 7.);
    }
  }

  #[test]
  fn tracking_is_deduplicated() {
    let mut animation = DashAnimation::default();
    animation.track("a");
    animation.track("a");
    animation.track("b");
    animation.untrack("a");
    assert_eq!(animation.layers, vec!["b"]);
  }
}
