use std::rc::Rc;

use anyhow::{Context, bail};
use clap::Parser as CliParser;
use log::info;
use mapsync::{
  MapPlugin,
  config::{ConfigOverlay, SCATTER_LAYER_KEY},
  host::{HostClient, HostError, connect},
  map::{
    engine::LayerIds,
    feature::{Feature, FeatureId, Geometry, GeometryKind, Properties},
    map_event::{EventKind, EventPayload, ScreenPoint},
    renderer::{Container, MemoryHandle, MemoryRendererFactory, RendererFactory},
  },
  plugin::Viewport,
  profiling,
};
use serde_json::json;

#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Id of the element the map is mounted into.
  #[arg(short, long, default_value = "map")]
  container: String,

  /// Overrides the basemap style of the host configuration.
  #[arg(short, long)]
  basemap: Option<String>,

  /// Number of animation frames to run.
  #[arg(short, long, default_value_t = 20)]
  frames: u32,

  /// Milliseconds between animation frames.
  #[arg(long, default_value_t = 16.)]
  frame_interval: f64,

  /// Selects the scatter points with a lasso around all of them.
  #[arg(short, long)]
  lasso: bool,
}

fn handle(factory: &MemoryRendererFactory) -> anyhow::Result<MemoryHandle> {
  factory.last_handle().context("no map was created")
}

fn print_layers(plugin: &MapPlugin) {
  for layer in plugin.tracked_layers() {
    println!(
      "{:<14} {:<18} visible={:<5} {}",
      layer.key,
      layer.title,
      layer.visible,
      layer.ids.join(", ")
    );
  }
}

fn print_selection(host: &dyn HostClient, plugin: &MapPlugin) {
  let variable = |name: &Option<String>| {
    name
      .as_deref()
      .and_then(|id| host.variable(id))
      .map_or_else(|| "-".to_string(), |value| value.to_string())
  };
  println!(
    "{} selected, latitudes {}, longitudes {}",
    plugin.selected_features().len(),
    variable(&plugin.config().filter_latitude),
    variable(&plugin.config().filter_longitude)
  );
}

fn lasso_shape(points: &[[f64; 2]]) -> Feature {
  let (mut min, mut max) = ([f64::MAX; 2], [f64::MIN; 2]);
  for [x, y] in points {
    min = [min[0].min(*x), min[1].min(*y)];
    max = [max[0].max(*x), max[1].max(*y)];
  }
  let ring = json!([
    [min[0] - 1., min[1] - 1.],
    [max[0] + 1., min[1] - 1.],
    [max[0] + 1., max[1] + 1.],
    [min[0] - 1., max[1] + 1.],
    [min[0] - 1., min[1] - 1.]
  ]);
  Feature::new(
    Geometry {
      kind: GeometryKind::Polygon,
      coordinates: json!([ring]),
      geometries: Vec::new(),
    },
    Properties::new(),
  )
  .with_id(FeatureId::String("lasso".to_string()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
  env_logger::init();
  profiling::init_profiling();
  let args = Args::parse();

  let host = connect(Err(HostError::Unavailable(
    "running outside the analytics application".to_string(),
  )));
  let mut overlay = ConfigOverlay::new();
  if let Some(basemap) = &args.basemap {
    overlay
      .values
      .insert("basemapUrl".to_string(), json!(basemap));
  }
  if !overlay.is_empty() {
    host.update_config(overlay.apply(&host.config()));
  }

  let factory = Rc::new(MemoryRendererFactory::new());
  let renderer_factory: Rc<dyn RendererFactory> = factory.clone();
  let mut plugin = MapPlugin::new(host.clone(), renderer_factory, Container::new(&args.container));
  plugin.set_viewport(Viewport {
    width: 1280.,
    height: 800.,
  });
  plugin.mount().await?;

  handle(&factory)?.fire(EventKind::Load, None, &EventPayload::default());
  plugin.pump().await?;
  if !plugin.is_map_ready() {
    bail!("map did not load");
  }
  print_layers(&plugin);

  let map = handle(&factory)?;
  let mut timestamp = 0.;
  for _ in 0..args.frames {
    let Some(frame) = map.take_due_frame() else {
      break;
    };
    plugin.on_animation_frame(frame, timestamp);
    profiling::new_frame();
    timestamp += args.frame_interval;
  }
  info!("Animation reached {timestamp}ms");

  let scatter: Vec<[f64; 2]> = plugin
    .scatter()
    .map(|collection| collection.features.iter().filter_map(Feature::point).collect())
    .unwrap_or_default();
  let point_layer = LayerIds::new(SCATTER_LAYER_KEY).point_layer;
  if let Some([x, y]) = scatter.first().copied() {
    map.hover(&point_layer, ScreenPoint::new(x, y));
    map.click(ScreenPoint::new(x, y), false);
    plugin.pump().await?;
    print_selection(host.as_ref(), &plugin);
    if let Some(content) = plugin.tooltip().content() {
      println!("tooltip: {content}");
    }

    map.click(ScreenPoint::new(0., -80.), false);
    plugin.pump().await?;
    print_selection(host.as_ref(), &plugin);
  }

  if args.lasso {
    if plugin.toggle_lasso().await? {
      map.fire(
        EventKind::DrawCreate,
        None,
        &EventPayload::default().with_features(vec![lasso_shape(&scatter)]),
      );
      plugin.pump().await?;
      print_selection(host.as_ref(), &plugin);
      plugin.toggle_lasso().await?;
    } else {
      info!("Lasso selection is not available");
    }
  }

  if let Some(legend) = plugin.legend_html() {
    println!("legend: {legend}");
  }
  plugin.unmount();
  Ok(())
}
