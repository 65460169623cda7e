/// Reconciles layer configuration with the renderer.
pub mod engine;
/// GeoJSON features as handed to and returned by the renderer.
pub mod feature;
/// Events dispatched by the renderer.
pub mod map_event;
/// Tracked layers and their subscribers.
pub mod registry;
/// The renderer collaborator.
pub mod renderer;
/// Map lifecycle: asynchronous initialization and disposal.
pub mod session;
