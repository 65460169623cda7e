use itertools::Itertools;
use serde_json::Value;

use crate::{
  map::{feature::Feature, map_event::ScreenPoint},
  parser::{ElementData, LegendEntry},
};

pub const TOOLTIP_WIDTH: f64 = 260.;
pub const TOOLTIP_HEIGHT: f64 = 180.;
/// Distance of the tooltip from the pointer and from the container edges.
pub const TOOLTIP_MARGIN: f64 = 12.;

const LEGEND_DIVIDER: &str =
  r#"<hr style="border:none;border-top:1px solid rgba(15,23,42,0.12);margin:12px 0;">"#;

/// Size of the map container in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
  pub width: f64,
  pub height: f64,
}

/// Places a tooltip next to the pointer, moved inside the viewport when it would overflow.
#[must_use]
pub fn clamp_tooltip_position(point: ScreenPoint, viewport: Option<Viewport>) -> ScreenPoint {
  let mut position = ScreenPoint::new(point.x + TOOLTIP_MARGIN, point.y + TOOLTIP_MARGIN);
  let Some(viewport) = viewport else {
    return position;
  };
  if position.x + TOOLTIP_WIDTH > viewport.width {
    position.x = TOOLTIP_MARGIN.max(viewport.width - TOOLTIP_WIDTH - TOOLTIP_MARGIN);
  }
  if position.y + TOOLTIP_HEIGHT > viewport.height {
    position.y = TOOLTIP_MARGIN.max(viewport.height - TOOLTIP_HEIGHT - TOOLTIP_MARGIN);
  }
  position
}

/// The hovered feature and where its tooltip is shown.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tooltip {
  pub feature: Option<Feature>,
  pub position: ScreenPoint,
}

impl Tooltip {
  pub fn show(&mut self, feature: &Feature, position: ScreenPoint) {
    self.feature = Some(feature.clone());
    self.position = position;
  }

  /// Follows the pointer while shown.
  pub fn move_to(&mut self, position: ScreenPoint) {
    if self.feature.is_some() {
      self.position = position;
    }
  }

  pub fn hide(&mut self) {
    self.feature = None;
  }

  #[must_use]
  pub fn is_visible(&self) -> bool {
    self.content().is_some()
  }

  /// The `tooltip` property of the hovered feature: strings as they are, other values as
  /// indented JSON. Nothing is shown for features without one.
  #[must_use]
  pub fn content(&self) -> Option<String> {
    match self.feature.as_ref()?.properties.get("tooltip")? {
      Value::Null | Value::Bool(false) => None,
      Value::String(s) if s.is_empty() => None,
      Value::String(s) => Some(s.clone()),
      other => serde_json::to_string_pretty(other)
        .ok()
        .map(|json| json.replace('\n', "<br />")),
    }
  }
}

fn escape(text: &str) -> String {
  text
    .replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}

/// The first non-blank string of the legend column.
#[must_use]
pub fn element_legend_html(data: Option<&ElementData>, column: Option<&str>) -> Option<String> {
  data?
    .get(column?)?
    .iter()
    .filter_map(Value::as_str)
    .find(|html| !html.trim().is_empty())
    .map(ToString::to_string)
}

/// A titled list of color swatches.
#[must_use]
pub fn scatter_legend_html(title: &str, entries: &[LegendEntry]) -> Option<String> {
  if entries.is_empty() {
    return None;
  }
  let items = entries
    .iter()
    .map(|entry| {
      format!(
        concat!(
          r#"<li style="display:flex;align-items:center;gap:0.5rem;margin:0.25rem 0;">"#,
          r#"<span style="display:inline-block;width:12px;height:12px;border-radius:9999px;"#,
          r#"background:{};border:1px solid rgba(15,23,42,0.2);"></span>"#,
          "<span>{}</span></li>"
        ),
        escape(&entry.color),
        escape(&entry.label)
      )
    })
    .join("");
  Some(format!(
    concat!(
      r#"<div><h4 style="margin:0 0 8px;">{}</h4>"#,
      r#"<ul style="margin:0;padding-left:0;list-style:none;">{}</ul></div>"#
    ),
    escape(title),
    items
  ))
}

/// Joins the present legend sections with a divider.
#[must_use]
pub fn combine_legend_html(sections: &[Option<String>]) -> Option<String> {
  let sections: Vec<&String> = sections.iter().flatten().collect();
  if sections.is_empty() {
    return None;
  }
  Some(sections.into_iter().join(LEGEND_DIVIDER))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::map::feature::{Geometry, Properties};
  use rstest::rstest;
  use serde_json::json;

  fn feature(tooltip: Value) -> Feature {
    let mut properties = Properties::new();
    properties.insert("tooltip".to_string(), tooltip);
    Feature::new(Geometry::point(0., 0.), properties)
  }

  #[rstest]
  #[case(ScreenPoint::new(10., 20.), ScreenPoint::new(22., 32.))]
  #[case(ScreenPoint::new(700., 20.), ScreenPoint::new(528., 32.))]
  #[case(ScreenPoint::new(10., 500.), ScreenPoint::new(22., 408.))]
  fn tooltips_stay_inside_the_viewport(#[case] point: ScreenPoint, #[case] expected: ScreenPoint) {
    let viewport = Viewport {
      width: 800.,
      height: 600.,
    };
    let position = clamp_tooltip_position(point, Some(viewport));
    assert_approx_eq::assert_approx_eq!(position.x, expected.x);
    assert_approx_eq::assert_approx_eq!(position.y, expected.y);
  }

  #[test]
  fn narrow_viewports_keep_the_margin() {
    let viewport = Viewport {
      width: 100.,
      height: 100.,
    };
    let position = clamp_tooltip_position(ScreenPoint::new(50., 50.), Some(viewport));
    assert_eq!(position, ScreenPoint::new(TOOLTIP_MARGIN, TOOLTIP_MARGIN));
    assert_eq!(
      clamp_tooltip_position(ScreenPoint::new(5000., 5.), None),
      ScreenPoint::new(5012., 17.)
    );
  }

  #[test]
  fn tooltip_content_needs_a_tooltip_property() {
    let mut tooltip = Tooltip::default();
    tooltip.show(&Feature::new(Geometry::point(0., 0.), Properties::new()), ScreenPoint::default());
    assert!(!tooltip.is_visible());

    tooltip.show(&feature(json!("<b>Depot</b>")), ScreenPoint::default());
    assert_eq!(tooltip.content().as_deref(), Some("<b>Depot</b>"));

    tooltip.show(&feature(json!({"a": 1})), ScreenPoint::default());
    assert_eq!(tooltip.content().as_deref(), Some("{<br />  \"a\": 1<br />}"));

    tooltip.hide();
    tooltip.move_to(ScreenPoint::new(3., 3.));
    assert!(!tooltip.is_visible());
    assert_eq!(tooltip.position, ScreenPoint::default());
  }

  #[test]
  fn element_legend_takes_the_first_filled_cell() {
    let data = ElementData::from([("html".to_string(), vec![json!(" "), json!(3), json!("<p>x</p>")])]);
    assert_eq!(element_legend_html(Some(&data), Some("html")).as_deref(), Some("<p>x</p>"));
    assert_eq!(element_legend_html(Some(&data), None), None);
    assert_eq!(element_legend_html(Some(&data), Some("other")), None);
  }

  #[test]
  fn scatter_legend_lists_every_entry() {
    let entries = vec![
      LegendEntry {
        label: "West".to_string(),
        color: "#2563eb".to_string(),
      },
      LegendEntry {
        label: "<East>".to_string(),
        color: "#16a34a".to_string(),
      },
    ];
    let html = scatter_legend_html("Sites", &entries).unwrap();
    assert!(html.contains("<h4 style=\"margin:0 0 8px;\">Sites</h4>"));
    assert_eq!(html.matches("<li ").count(), 2);
    assert!(html.contains("background:#16a34a;"));
    assert!(html.contains("<span>&lt;East&gt;</span>"));
    assert_eq!(scatter_legend_html("Sites", &[]), None);
  }

  #[test]
  fn legend_sections_are_divided() {
    assert_eq!(combine_legend_html(&[None, None]), None);
    assert_eq!(
      combine_legend_html(&[None, Some("b".to_string())]).as_deref(),
      Some("b")
    );
    assert_eq!(
      combine_legend_html(&[Some("a".to_string()), Some("b".to_string())]),
      Some(format!("a{LEGEND_DIVIDER}b"))
    );
  }
}
