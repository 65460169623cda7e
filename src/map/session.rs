use std::{
  cell::{Ref, RefCell, RefMut},
  rc::Rc,
};

use log::{debug, info};

use super::{
  engine::{LassoCallback, MapEngine},
  map_event::MapNotice,
  registry::{LayerListener, LayerSubscription, TrackedLayer},
  renderer::{Container, DEFAULT_BASEMAP, FrameRequest, MapError, MapView, RendererFactory},
};

/// The map of one container: owns the engine and drives its asynchronous lifecycle.
///
/// Clones share the same engine. No borrow of the engine is held across an await, so a session
/// can be disposed or re-initialized while an initialization is in flight; the stale one then
/// fails with [`MapError::Superseded`].
#[derive(Clone, Default)]
pub struct MapSession {
  engine: Rc<RefCell<MapEngine>>,
}

impl MapSession {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates the map in `container`, disposing any previous one first.
  ///
  /// # Errors
  /// Fails without a container, when the renderer cannot be created, or when another
  /// initialization or a disposal happened while the renderer was loading.
  pub async fn init_map(
    &self,
    factory: &dyn RendererFactory,
    container: Option<&Container>,
    basemap: Option<&str>,
  ) -> Result<(), MapError> {
    let container = container.ok_or(MapError::MissingContainer)?;
    let (ticket, events) = {
      let mut engine = self.engine.borrow_mut();
      if engine.is_initialized() {
        engine.dispose();
      }
      (engine.begin_init(), engine.events_sender())
    };

    let style = basemap
      .filter(|url| !url.is_empty())
      .unwrap_or(DEFAULT_BASEMAP);
    let mut renderer = factory
      .create(container, style, MapView::default(), events)
      .await?;

    let mut engine = self.engine.borrow_mut();
    if !engine.is_current(ticket) {
      debug!("Discarding superseded map for {container}");
      renderer.destroy();
      return Err(MapError::Superseded);
    }
    engine.attach(renderer);
    info!("Map created in {container} with {style}");
    Ok(())
  }

  /// Enters lasso mode on `layer_key`, loading the drawing extension on first use.
  ///
  /// Returns whether lasso mode is active.
  ///
  /// # Errors
  /// Fails when there is no map, the drawing extension cannot be loaded, or the map was replaced
  /// while it was loading.
  pub async fn enable_lasso_selection(
    &self,
    factory: &dyn RendererFactory,
    layer_key: &str,
    callback: LassoCallback,
  ) -> Result<bool, MapError> {
    let ticket = {
      let engine = self.engine.borrow();
      if !engine.is_initialized() {
        return Err(MapError::NotInitialized);
      }
      (!engine.has_draw_control()).then(|| engine.current_ticket())
    };

    if let Some(ticket) = ticket {
      let draw = factory.load_draw().await?;
      let mut engine = self.engine.borrow_mut();
      if !engine.is_current(ticket) || !engine.is_initialized() {
        return Err(MapError::Superseded);
      }
      engine.install_draw_control(draw);
    }

    Ok(self.engine.borrow_mut().activate_lasso(layer_key, callback))
  }

  pub fn disable_lasso_selection(&self, preserve_control: bool) {
    self.engine.borrow_mut().disable_lasso_selection(preserve_control);
  }

  #[must_use]
  pub fn is_lasso_active(&self) -> bool {
    self.engine.borrow().is_lasso_active()
  }

  #[must_use]
  pub fn is_initialized(&self) -> bool {
    self.engine.borrow().is_initialized()
  }

  pub fn dispose(&self) {
    self.engine.borrow_mut().dispose();
  }

  /// Dispatches queued renderer events. See [`MapEngine::process_pending_events`].
  pub fn process_pending_events(&self) -> Vec<MapNotice> {
    self.engine.borrow_mut().process_pending_events()
  }

  /// Dispatches queued renderer events, handing map level events to `on_notice` in order.
  /// `on_notice` runs while the engine is borrowed.
  pub fn dispatch_pending_events(&self, on_notice: &mut dyn FnMut(MapNotice)) {
    self.engine.borrow_mut().dispatch_pending_events(on_notice);
  }

  pub fn on_animation_frame(&self, frame: FrameRequest, timestamp_ms: f64) {
    self.engine.borrow_mut().on_animation_frame(frame, timestamp_ms);
  }

  pub fn toggle_layer_visibility(&self, layer_key: &str) {
    self.engine.borrow_mut().toggle_layer_visibility(layer_key);
  }

  /// Listeners run while the engine is borrowed and must not call back into the session.
  pub fn subscribe(&self, listener: LayerListener) -> LayerSubscription {
    self.engine.borrow_mut().subscribe(listener)
  }

  pub fn unsubscribe(&self, subscription: LayerSubscription) -> bool {
    self.engine.borrow_mut().unsubscribe(subscription)
  }

  #[must_use]
  pub fn tracked_layers(&self) -> Vec<TrackedLayer> {
    self.engine.borrow().tracked_layers().to_vec()
  }

  /// # Panics
  /// When the engine is mutably borrowed, i.e. from inside an engine callback.
  #[must_use]
  pub fn engine(&self) -> Ref<'_, MapEngine> {
    self.engine.borrow()
  }

  /// # Panics
  /// When the engine is already borrowed, i.e. from inside an engine callback.
  #[must_use]
  pub fn engine_mut(&self) -> RefMut<'_, MapEngine> {
    self.engine.borrow_mut()
  }
}
