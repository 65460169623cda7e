use std::{
  cell::RefCell,
  collections::{BTreeMap, BTreeSet},
  rc::Rc,
  sync::mpsc::{Receiver, Sender, channel},
};

use log::{debug, info};
use serde_json::Value;

use crate::{
  config::{HostConfig, PluginConfig, SCATTER_LAYER_KEY},
  host::{HostClient, HostSubscription, editor_panel_definition},
  map::{
    engine::{LassoCallback, LayerCallbacks},
    feature::{Feature, FeatureCollection},
    map_event::MapNotice,
    registry::TrackedLayer,
    renderer::{Container, FrameRequest, MapError, RendererFactory},
    session::MapSession,
  },
  parser::{
    ElementData, ScatterStyle, derive_scatter_feature_collection, legend_entries, to_element_data,
  },
  profile_scope,
  selection::ScatterSelection,
};

pub mod overlay;

pub use overlay::{Tooltip, Viewport, clamp_tooltip_position};
use overlay::{combine_legend_html, element_legend_html, scatter_legend_html};

enum HostUpdate {
  Config(HostConfig),
  ElementData {
    element_id: String,
    data: ElementData,
  },
}

/// State the layer callbacks write to while the engine dispatches events.
struct Overlay {
  host: Rc<dyn HostClient>,
  selection: ScatterSelection,
  tooltip: Tooltip,
  viewport: Option<Viewport>,
  latitude_variable: Option<String>,
  longitude_variable: Option<String>,
  lasso_active: bool,
}

impl Overlay {
  fn select(&mut self, features: &[Feature], additive: bool) {
    self.selection.select(features, additive);
    self.publish_selection();
  }

  fn clear_selection(&mut self) {
    self.selection.clear();
    self.publish_selection();
  }

  /// Mirrors the selection into the bound host variables.
  fn publish_selection(&self) {
    let variables = self.selection.variables();
    if let Some(id) = &self.latitude_variable {
      self.host.set_variable(id, variables.latitudes.map(Value::String));
    }
    if let Some(id) = &self.longitude_variable {
      self.host.set_variable(id, variables.longitudes.map(Value::String));
    }
  }

  fn handle_map_click(&mut self, default_prevented: bool) {
    if self.lasso_active {
      return;
    }
    if self.selection.handle_map_click(false) {
      self.publish_selection();
    }
    if !default_prevented {
      self.tooltip.hide();
    }
  }
}

fn hover_callbacks(overlay: &Rc<RefCell<Overlay>>) -> LayerCallbacks {
  let (enter, moved, leave) = (overlay.clone(), overlay.clone(), overlay.clone());
  LayerCallbacks::new()
    .with_hover_enter(move |feature, point| {
      let mut overlay = enter.borrow_mut();
      let position = clamp_tooltip_position(point, overlay.viewport);
      overlay.tooltip.show(feature, position);
    })
    .with_hover_move(move |point| {
      let mut overlay = moved.borrow_mut();
      let position = clamp_tooltip_position(point, overlay.viewport);
      overlay.tooltip.move_to(position);
    })
    .with_hover_leave(move || leave.borrow_mut().tooltip.hide())
}

/// The map plugin: keeps the map in line with the host configuration and data, and reports the
/// scatter selection back to the host.
///
/// Host deliveries are queued and applied by [`MapPlugin::pump`], together with the events of the
/// map.
pub struct MapPlugin {
  host: Rc<dyn HostClient>,
  factory: Rc<dyn RendererFactory>,
  session: MapSession,
  container: Container,
  config: PluginConfig,
  overlay: Rc<RefCell<Overlay>>,
  hover_callbacks: LayerCallbacks,
  scatter_callbacks: LayerCallbacks,
  scatter_style: ScatterStyle,
  scatter: Option<FeatureCollection>,
  element_data: BTreeMap<String, ElementData>,
  element_subscriptions: BTreeMap<String, HostSubscription>,
  config_subscription: Option<HostSubscription>,
  updates_tx: Sender<HostUpdate>,
  updates_rx: Receiver<HostUpdate>,
  /// Signature of the layer configuration the map was last synced with.
  signature: Option<String>,
  /// Basemap of the current map, set once the map is requested.
  basemap: Option<String>,
  map_ready: bool,
  dirty: bool,
}

impl MapPlugin {
  #[must_use]
  pub fn new(
    host: Rc<dyn HostClient>,
    factory: Rc<dyn RendererFactory>,
    container: Container,
  ) -> Self {
    let overlay = Rc::new(RefCell::new(Overlay {
      host: host.clone(),
      selection: ScatterSelection::new(),
      tooltip: Tooltip::default(),
      viewport: None,
      latitude_variable: None,
      longitude_variable: None,
      lasso_active: false,
    }));
    let hover_callbacks = hover_callbacks(&overlay);
    let select = overlay.clone();
    let scatter_callbacks = hover_callbacks
      .clone()
      .with_feature_select(move |features, additive| select.borrow_mut().select(features, additive));
    let (updates_tx, updates_rx) = channel();
    Self {
      config: PluginConfig::from_host(&host.config()),
      host,
      factory,
      session: MapSession::new(),
      container,
      overlay,
      hover_callbacks,
      scatter_callbacks,
      scatter_style: ScatterStyle::default(),
      scatter: None,
      element_data: BTreeMap::new(),
      element_subscriptions: BTreeMap::new(),
      config_subscription: None,
      updates_tx,
      updates_rx,
      signature: None,
      basemap: None,
      map_ready: false,
      dirty: false,
    }
  }

  #[must_use]
  pub fn with_scatter_style(mut self, style: ScatterStyle) -> Self {
    self.scatter_style = style;
    self
  }

  /// Registers the editor panel, subscribes to the host and creates the map.
  ///
  /// # Errors
  /// When the map cannot be created.
  pub async fn mount(&mut self) -> Result<(), MapError> {
    self.host.configure_editor_panel(editor_panel_definition());
    let tx = self.updates_tx.clone();
    self.config_subscription = Some(self.host.subscribe_to_config(Rc::new(move |config: &HostConfig| {
      let _ = tx.send(HostUpdate::Config(config.clone()));
    })));
    self.apply_host_updates();
    info!("Mounting map plugin in {}", self.container);
    self.init_map().await
  }

  async fn init_map(&mut self) -> Result<(), MapError> {
    self.map_ready = false;
    self.signature = None;
    {
      let mut overlay = self.overlay.borrow_mut();
      overlay.tooltip.hide();
      overlay.lasso_active = false;
    }
    let basemap = self.config.basemap_url.clone();
    self.basemap = Some(basemap.clone());
    self
      .session
      .init_map(self.factory.as_ref(), Some(&self.container), Some(&basemap))
      .await
  }

  /// Applies pending host deliveries and map events, re-creating the map when the basemap
  /// changed, and syncs the layers if anything changed.
  ///
  /// # Errors
  /// When the map has to be re-created and that fails.
  pub async fn pump(&mut self) -> Result<(), MapError> {
    self.apply_host_updates();
    if self
      .basemap
      .as_ref()
      .is_some_and(|basemap| *basemap != self.config.basemap_url)
    {
      info!("Basemap changed to {}", self.config.basemap_url);
      self.init_map().await?;
    }
    self.process_map_events();
    if self.dirty {
      self.refresh();
    }
    Ok(())
  }

  fn apply_host_updates(&mut self) {
    loop {
      let updates: Vec<HostUpdate> = self.updates_rx.try_iter().collect();
      if updates.is_empty() {
        break;
      }
      for update in updates {
        match update {
          HostUpdate::Config(config) => self.apply_config(&config),
          HostUpdate::ElementData { element_id, data } => {
            if self.element_subscriptions.contains_key(&element_id) {
              self.element_data.insert(element_id, data);
              self.dirty = true;
            }
          }
        }
      }
    }
  }

  fn apply_config(&mut self, host_config: &HostConfig) {
    let config = PluginConfig::from_host(host_config);
    {
      let mut overlay = self.overlay.borrow_mut();
      overlay.latitude_variable.clone_from(&config.filter_latitude);
      overlay.longitude_variable.clone_from(&config.filter_longitude);
    }
    self.config = config;
    self.sync_element_subscriptions();
    self.dirty = true;
  }

  fn required_elements(&self) -> BTreeSet<String> {
    self
      .config
      .layer_configs()
      .into_iter()
      .filter_map(|layer| layer.source_element_id)
      .chain(self.config.legend.clone())
      .collect()
  }

  fn sync_element_subscriptions(&mut self) {
    let required = self.required_elements();
    let stale: Vec<String> = self
      .element_subscriptions
      .keys()
      .filter(|id| !required.contains(*id))
      .cloned()
      .collect();
    for element_id in stale {
      if let Some(subscription) = self.element_subscriptions.remove(&element_id) {
        self.host.unsubscribe(subscription);
      }
      self.element_data.remove(&element_id);
    }

    for element_id in required {
      if self.element_subscriptions.contains_key(&element_id) {
        continue;
      }
      debug!("Subscribing to element {element_id}");
      let tx = self.updates_tx.clone();
      let id = element_id.clone();
      let subscription = self.host.subscribe_to_element_data(
        Some(&element_id),
        Rc::new(move |data: &ElementData| {
          let _ = tx.send(HostUpdate::ElementData {
            element_id: id.clone(),
            data: data.clone(),
          });
        }),
      );
      self.element_subscriptions.insert(element_id, subscription);
    }
  }

  /// Dispatches queued map events: layer callbacks, map clicks and the load of the map.
  pub fn process_map_events(&mut self) {
    let overlay = self.overlay.clone();
    let mut loaded = false;
    self.session.dispatch_pending_events(&mut |notice: MapNotice| match notice {
      MapNotice::Loaded => loaded = true,
      MapNotice::Clicked {
        default_prevented, ..
      } => overlay.borrow_mut().handle_map_click(default_prevented),
    });
    if loaded {
      info!("Map loaded in {}", self.container);
      self.map_ready = true;
      self.dirty = true;
    }
  }

  /// Syncs every layer with the current configuration and data. Does nothing before the map
  /// has loaded.
  pub fn refresh(&mut self) {
    profile_scope!("refresh");
    if !self.map_ready {
      return;
    }
    self.dirty = false;
    self.update_scatter();

    let signature = self.config.signature();
    if self.signature.as_ref() != Some(&signature) {
      if self.signature.is_some() {
        debug!("Layer configuration changed, clearing map layers");
        self.session.engine_mut().clear_map_layers();
        let mut overlay = self.overlay.borrow_mut();
        overlay.lasso_active = false;
        overlay.tooltip.hide();
        overlay.clear_selection();
      }
      self.signature = Some(signature);
    }
    if !self.config.scatter_enabled {
      self.disable_lasso();
    }

    let mut engine = self.session.engine_mut();
    for layer in self.config.layer_configs() {
      let (data, callbacks) = if layer.key == SCATTER_LAYER_KEY {
        (
          Some(to_element_data(self.scatter.as_ref())),
          &self.scatter_callbacks,
        )
      } else {
        (
          layer
            .source_element_id
            .as_ref()
            .and_then(|id| self.element_data.get(id))
            .cloned(),
          &self.hover_callbacks,
        )
      };
      engine.sync_layer(&layer.key, data.as_ref(), &layer, callbacks);
    }
  }

  /// Re-derives the scatter points. A different derivation invalidates the selection.
  fn update_scatter(&mut self) {
    let scatter = self.config.scatter_layer().and_then(|layer| {
      let data = self.element_data.get(layer.source_element_id.as_ref()?)?;
      derive_scatter_feature_collection(data, layer.columns.as_ref()?, &self.scatter_style)
    });
    if scatter != self.scatter {
      debug!(
        "Scatter layer now has {} points",
        scatter.as_ref().map_or(0, FeatureCollection::len)
      );
      self.scatter = scatter;
      self.overlay.borrow_mut().clear_selection();
    }
  }

  fn disable_lasso(&mut self) {
    let was_active = std::mem::take(&mut self.overlay.borrow_mut().lasso_active);
    if was_active {
      self.session.disable_lasso_selection(false);
    }
  }

  /// Enters or leaves lasso selection on the scatter layer. Returns whether lasso mode is on.
  ///
  /// # Errors
  /// When the drawing extension cannot be loaded or the map was replaced meanwhile.
  pub async fn toggle_lasso(&mut self) -> Result<bool, MapError> {
    if !self.map_ready || !self.config.scatter_enabled {
      self.disable_lasso();
      return Ok(false);
    }
    if self.overlay.borrow().lasso_active {
      self.disable_lasso();
      return Ok(false);
    }

    let overlay = self.overlay.clone();
    let callback: LassoCallback =
      Rc::new(move |features: &[Feature]| overlay.borrow_mut().select(features, false));
    let active = self
      .session
      .enable_lasso_selection(self.factory.as_ref(), SCATTER_LAYER_KEY, callback)
      .await?;
    self.overlay.borrow_mut().lasso_active = active;
    Ok(active)
  }

  pub fn toggle_layer(&mut self, layer_key: &str) {
    self.session.toggle_layer_visibility(layer_key);
  }

  pub fn on_animation_frame(&mut self, frame: FrameRequest, timestamp_ms: f64) {
    self.session.on_animation_frame(frame, timestamp_ms);
  }

  /// Forwards a configuration change to the host. Only the development runtime applies it.
  pub fn update_config(&self, partial: HostConfig) {
    self.host.update_config(partial);
  }

  pub fn set_viewport(&mut self, viewport: Viewport) {
    self.overlay.borrow_mut().viewport = Some(viewport);
  }

  /// Legend of the legend element followed by the scatter categories.
  #[must_use]
  pub fn legend_html(&self) -> Option<String> {
    let element = element_legend_html(
      self
        .config
        .legend
        .as_ref()
        .and_then(|id| self.element_data.get(id)),
      self.config.legend_html.as_deref(),
    );
    let scatter = self
      .scatter
      .as_ref()
      .filter(|_| self.config.scatter_enabled && self.config.scatter_columns.legend.is_some())
      .and_then(|collection| {
        scatter_legend_html(&self.config.scatter_title, &legend_entries(collection))
      });
    combine_legend_html(&[element, scatter])
  }

  #[must_use]
  pub fn tooltip(&self) -> Tooltip {
    self.overlay.borrow().tooltip.clone()
  }

  #[must_use]
  pub fn selected_features(&self) -> Vec<Feature> {
    self.overlay.borrow().selection.features().cloned().collect()
  }

  #[must_use]
  pub fn is_lasso_active(&self) -> bool {
    self.overlay.borrow().lasso_active
  }

  #[must_use]
  pub fn is_map_ready(&self) -> bool {
    self.map_ready
  }

  #[must_use]
  pub fn is_mock(&self) -> bool {
    self.host.is_mock()
  }

  #[must_use]
  pub fn config(&self) -> &PluginConfig {
    &self.config
  }

  #[must_use]
  pub fn scatter(&self) -> Option<&FeatureCollection> {
    self.scatter.as_ref()
  }

  #[must_use]
  pub fn tracked_layers(&self) -> Vec<TrackedLayer> {
    self.session.tracked_layers()
  }

  #[must_use]
  pub fn session(&self) -> &MapSession {
    &self.session
  }

  /// Disposes the map and drops every host subscription.
  pub fn unmount(&mut self) {
    self.disable_lasso();
    self.session.dispose();
    if let Some(subscription) = self.config_subscription.take() {
      self.host.unsubscribe(subscription);
    }
    for (_, subscription) in std::mem::take(&mut self.element_subscriptions) {
      self.host.unsubscribe(subscription);
    }
    self.element_data.clear();
    self.map_ready = false;
    self.signature = None;
    self.basemap = None;
    info!("Unmounted map plugin from {}", self.container);
  }
}
