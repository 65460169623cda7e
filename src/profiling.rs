//! Puffin instrumentation of sync passes, event dispatch and animation frames.
#[cfg(feature = "profiling")]
pub use puffin;

/// Address the puffin server listens on unless `MAPSYNC_PUFFIN_ADDR` is set.
pub const DEFAULT_PUFFIN_ADDR: &str = "127.0.0.1:8585";

/// Turns scopes on and starts the puffin server. Without the `profiling` feature this only logs.
pub fn init_profiling() {
  #[cfg(feature = "profiling")]
  {
    puffin::set_scopes_on(true);
    let addr = std::env::var("MAPSYNC_PUFFIN_ADDR").unwrap_or_else(|_| DEFAULT_PUFFIN_ADDR.into());
    match puffin_http::Server::new(&addr) {
      Ok(server) => {
        log::info!("Serving sync profiles on {addr}, connect with puffin_viewer");
        // Lives until the process exits.
        std::mem::forget(server);
      }
      Err(e) => log::warn!("Cannot serve profiles on {addr}: {e}"),
    }
  }

  #[cfg(not(feature = "profiling"))]
  log::debug!("Built without the profiling feature, scopes are no-ops");
}

/// Opens a puffin scope when the `profiling` feature is on.
#[macro_export]
macro_rules! profile_scope {
  ($name:expr) => {
    #[cfg(feature = "profiling")]
    $crate::profiling::puffin::profile_scope!($name);
  };
  ($name:expr, $data:expr) => {
    #[cfg(feature = "profiling")]
    $crate::profiling::puffin::profile_scope!($name, $data);
  };
}

/// Closes the current profiler frame. The demo calls it after each animation frame.
pub fn new_frame() {
  #[cfg(feature = "profiling")]
  puffin::GlobalProfiler::lock().new_frame();
}
