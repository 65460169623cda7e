pub mod config;
pub mod host;
pub mod map;
pub mod parser;
pub mod plugin;
pub mod profiling;
pub mod selection;

pub use map::map_event::MapEvent;
pub use map::session::MapSession;
pub use plugin::MapPlugin;
