use serde::Serialize;

/// A configured layer slot and the renderer sub-layers currently materialized for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedLayer {
  pub key: String,
  pub title: String,
  pub visible: bool,
  /// Sub-layer ids in the order they were added. Only ids that exist on the renderer.
  pub ids: Vec<String>,
}

impl TrackedLayer {
  #[must_use]
  pub fn new(key: &str, title: &str) -> Self {
    Self {
      key: key.to_string(),
      title: title.to_string(),
      visible: true,
      ids: Vec::new(),
    }
  }
}

/// Receives a snapshot of all tracked layers after every change.
pub type LayerListener = Box<dyn FnMut(Vec<TrackedLayer>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerSubscription(u64);

/// The tracked layers and the subscribers that mirror them.
#[derive(Default)]
pub struct LayerRegistry {
  layers: Vec<TrackedLayer>,
  listeners: Vec<(LayerSubscription, LayerListener)>,
  next_subscription: u64,
}

impl LayerRegistry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `listener` and immediately hands it the current snapshot.
  pub fn subscribe(&mut self, mut listener: LayerListener) -> LayerSubscription {
    self.next_subscription += 1;
    let subscription = LayerSubscription(self.next_subscription);
    listener(self.snapshot());
    self.listeners.push((subscription, listener));
    subscription
  }

  pub fn unsubscribe(&mut self, subscription: LayerSubscription) -> bool {
    let before = self.listeners.len();
    self.listeners.retain(|(s, _)| *s != subscription);
    self.listeners.len() != before
  }

  /// Every listener gets its own deep copy.
  pub fn notify(&mut self) {
    for (_, listener) in &mut self.listeners {
      listener(self.layers.clone());
    }
  }

  #[must_use]
  pub fn snapshot(&self) -> Vec<TrackedLayer> {
    self.layers.clone()
  }

  #[must_use]
  pub fn layers(&self) -> &[TrackedLayer] {
    &self.layers
  }

  #[must_use]
  pub fn get(&self, key: &str) -> Option<&TrackedLayer> {
    self.layers.iter().find(|l| l.key == key)
  }

  pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut TrackedLayer> {
    self.layers.iter_mut().find(|l| l.key == key)
  }

  /// Returns the entry of `key`, creating a visible one if absent. A non-empty title replaces the
  /// current one.
  pub(crate) fn ensure(&mut self, key: &str, title: &str) -> &mut TrackedLayer {
    let index = match self.layers.iter().position(|l| l.key == key) {
      Some(index) => index,
      None => {
        self.layers.push(TrackedLayer::new(key, title));
        self.layers.len() - 1
      }
    };
    let layer = &mut self.layers[index];
    if !title.is_empty() && layer.title != title {
      layer.title = title.to_string();
    }
    layer
  }

  /// Records a materialized sub-layer. The entry becomes visible unless it stays hidden.
  pub(crate) fn track(&mut self, key: &str, id: &str, keep_hidden: bool) {
    if let Some(layer) = self.get_mut(key) {
      if !layer.ids.iter().any(|existing| existing == id) {
        layer.ids.push(id.to_string());
      }
      if !keep_hidden {
        layer.visible = true;
      }
    }
  }

  pub(crate) fn untrack(&mut self, key: &str, id: &str) {
    if let Some(layer) = self.get_mut(key) {
      layer.ids.retain(|existing| existing != id);
    }
  }

  pub(crate) fn clear(&mut self) {
    self.layers.clear();
  }
}
