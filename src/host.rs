use std::rc::Rc;

use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::{config::HostConfig, parser::ElementData};

pub mod editor_panel;
pub mod mock;

pub use editor_panel::{EditorField, FieldType, editor_panel_definition};
pub use mock::MockHost;

#[derive(Debug, Error)]
pub enum HostError {
  #[error("host runtime unavailable: {0}")]
  Unavailable(String),
}

/// Returned by every `subscribe_*` call, handed back to [`HostClient::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostSubscription(pub u64);

pub type ConfigListener = Rc<dyn Fn(&HostConfig)>;
pub type ElementListener = Rc<dyn Fn(&ElementData)>;
pub type VariableListener = Rc<dyn Fn(Option<&Value>)>;

/// The analytics application the plugin is embedded in.
///
/// Listeners may be called synchronously from inside the subscribing call and must not call
/// back into the host.
pub trait HostClient {
  /// Whether this is the local development runtime.
  fn is_mock(&self) -> bool {
    false
  }

  fn config(&self) -> HostConfig;

  fn subscribe_to_config(&self, listener: ConfigListener) -> HostSubscription;

  /// Merges `partial` into the configuration. Only the development runtime supports this.
  fn update_config(&self, partial: HostConfig) {
    warn!(
      "Ignoring configuration update of {} keys outside the development runtime",
      partial.len()
    );
  }

  /// Delivers the columns of an element. Without an element id the listener receives empty
  /// data once.
  fn subscribe_to_element_data(
    &self,
    element_id: Option<&str>,
    listener: ElementListener,
  ) -> HostSubscription;

  fn variable(&self, id: &str) -> Option<Value>;

  /// `None` unsets the variable.
  fn set_variable(&self, id: &str, value: Option<Value>);

  fn subscribe_to_variable(&self, id: &str, listener: VariableListener) -> HostSubscription;

  fn unsubscribe(&self, subscription: HostSubscription) -> bool;

  /// Registers the configuration form the host renders for the plugin.
  fn configure_editor_panel(&self, fields: Vec<EditorField>);
}

/// The runtime if there is one, otherwise a [`MockHost`] seeded with sample data.
#[must_use]
pub fn connect(runtime: Result<Rc<dyn HostClient>, HostError>) -> Rc<dyn HostClient> {
  match runtime {
    Ok(runtime) => runtime,
    Err(e) => {
      warn!("{e}, falling back to the mock runtime");
      Rc::new(MockHost::new())
    }
  }
}
