use itertools::Itertools;
use log::debug;

use crate::map::feature::Feature;

/// Host variable values mirroring a selection: comma joined latitudes and longitudes, absent
/// when nothing is selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionVariables {
  pub latitudes: Option<String>,
  pub longitudes: Option<String>,
}

/// Selected scatter points in selection order, keyed by [`Feature::selection_key`].
#[derive(Debug, Clone, Default)]
pub struct ScatterSelection {
  features: Vec<(String, Feature)>,
  /// Set by a feature click, which the map also reports as a plain click.
  skip_next_clear: bool,
}

impl ScatterSelection {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds `features`, replacing the selection unless `additive`. Reselecting a feature updates
  /// it in place. An empty pick clears the selection.
  pub fn select(&mut self, features: &[Feature], additive: bool) {
    if features.is_empty() {
      self.clear();
      return;
    }
    if !additive {
      self.features.clear();
    }
    for feature in features {
      let key = feature.selection_key();
      match self.features.iter_mut().find(|(k, _)| *k == key) {
        Some((_, selected)) => *selected = feature.clone(),
        None => self.features.push((key, feature.clone())),
      }
    }
    self.skip_next_clear = true;
    debug!("{} scatter points selected", self.features.len());
  }

  pub fn clear(&mut self) {
    self.features.clear();
  }

  /// A click on the map background clears the selection, except for the click that just
  /// selected a feature. Clicks are ignored while lassoing. Returns whether the selection was
  /// cleared.
  pub fn handle_map_click(&mut self, lasso_active: bool) -> bool {
    if lasso_active {
      return false;
    }
    if std::mem::take(&mut self.skip_next_clear) {
      return false;
    }
    self.clear();
    true
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.features.len()
  }

  pub fn features(&self) -> impl Iterator<Item = &Feature> {
    self.features.iter().map(|(_, feature)| feature)
  }

  /// Features without a point position are left out.
  #[must_use]
  pub fn variables(&self) -> SelectionVariables {
    let positions: Vec<[f64; 2]> = self.features().filter_map(Feature::point).collect();
    if positions.is_empty() {
      return SelectionVariables::default();
    }
    SelectionVariables {
      latitudes: Some(positions.iter().map(|[_, lat]| lat).join(",")),
      longitudes: Some(positions.iter().map(|[lon, _]| lon).join(",")),
    }
  }
}
