use geo_types::{Coord, LineString, Polygon};
use mapsync::{
  config::{LayerConfig, PointType},
  map::{
    engine::{LayerCallbacks, LayerIds, MapEngine, point_in_polygon, select_within},
    feature::{Feature, Geometry, Properties},
    renderer::{Container, DEFAULT_BASEMAP, MapView, MemoryHandle, MemoryRenderer},
  },
  parser::{
    ElementData, ScatterColumns, ScatterStyle, derive_scatter_feature_collection, legend_entries,
  },
};
use rstest::rstest;
use serde_json::{Value, json};

fn engine() -> (MapEngine, MemoryHandle) {
  let mut engine = MapEngine::new();
  let renderer = MemoryRenderer::new(
    &Container::new("map"),
    DEFAULT_BASEMAP,
    MapView::default(),
    engine.events_sender(),
  );
  let handle = renderer.handle();
  engine.attach(Box::new(renderer));
  (engine, handle)
}

fn geometry_data(features: &[Value]) -> ElementData {
  let collection = json!({"type": "FeatureCollection", "features": features});
  ElementData::from([(
    "geometry".to_string(),
    vec![Value::String(collection.to_string())],
  )])
}

fn line(coords: &[[f64; 2]]) -> Value {
  json!({
    "type": "Feature",
    "properties": {},
    "geometry": {"type": "LineString", "coordinates": coords}
  })
}

fn point(lon: f64, lat: f64) -> Value {
  json!({
    "type": "Feature",
    "properties": {},
    "geometry": {"type": "Point", "coordinates": [lon, lat]}
  })
}

fn polygon() -> Value {
  json!({
    "type": "Feature",
    "properties": {},
    "geometry": {
      "type": "Polygon",
      "coordinates": [[[0., 0.], [4., 0.], [4., 4.], [0., 4.], [0., 0.]]]
    }
  })
}

fn mixed_features() -> Vec<Value> {
  vec![line(&[[0., 0.], [1., 1.]]), polygon(), point(2., 2.)]
}

fn visible(handle: &MemoryHandle, id: &str) -> bool {
  handle
    .layer(id)
    .and_then(|layer| layer.layout.get("visibility").cloned())
    .is_none_or(|visibility| visibility != json!("none"))
}

#[test]
fn animated_line_layer_materializes_background_and_dashed() {
  let (mut engine, handle) = engine();
  let config = LayerConfig::new("layer1", "Routes")
    .with_animate_lines(true)
    .with_point_type(PointType::Circle);
  let data = geometry_data(&[line(&[[0., 0.], [1., 1.], [2., 0.]])]);

  engine.sync_layer("layer1", Some(&data), &config, &LayerCallbacks::new());

  let ids = LayerIds::new("layer1");
  let tracked = engine.tracked_layers();
  assert_eq!(tracked.len(), 1);
  assert_eq!(tracked[0].key, "layer1");
  assert!(tracked[0].visible);
  assert_eq!(tracked[0].ids, vec![ids.line_background.clone(), ids.line_dashed.clone()]);
  assert_eq!(
    handle.layer_ids(),
    vec![ids.line_background.clone(), ids.line_dashed.clone()]
  );
  assert!(handle.layer(&ids.polygon_fill).is_none());
  assert!(handle.layer(&ids.point_layer).is_none());
  assert!(engine.has_pending_frame());
}

#[test]
fn syncing_twice_mutates_once() {
  let (mut engine, handle) = engine();
  let config = LayerConfig::new("layer2", "Mixed")
    .with_fill_polygons(true)
    .with_cluster_points(true);
  let data = geometry_data(&mixed_features());

  engine.sync_layer("layer2", Some(&data), &config, &LayerCallbacks::new());
  let (mutations, layers, handlers) = (handle.mutations(), handle.layer_ids(), handle.handler_count());

  engine.sync_layer("layer2", Some(&data.clone()), &config.clone(), &LayerCallbacks::new());
  assert_eq!(handle.mutations(), mutations);
  assert_eq!(handle.layer_ids(), layers);
  assert_eq!(handle.handler_count(), handlers);
}

#[rstest]
#[case::content(|_: &mut LayerConfig, data: &mut Vec<Value>| data.push(point(3., 3.)))]
#[case::clustering(|c: &mut LayerConfig, _: &mut Vec<Value>| c.cluster_points = true)]
#[case::point_type(|c: &mut LayerConfig, _: &mut Vec<Value>| c.point_type = PointType::Icon)]
#[case::animation(|c: &mut LayerConfig, _: &mut Vec<Value>| c.animate_lines = true)]
#[case::fill(|c: &mut LayerConfig, _: &mut Vec<Value>| c.fill_polygons = true)]
fn any_input_change_resyncs(#[case] change: fn(&mut LayerConfig, &mut Vec<Value>)) {
  let (mut engine, handle) = engine();
  let mut config = LayerConfig::new("layer3", "Mixed");
  let mut features = mixed_features();
  engine.sync_layer("layer3", Some(&geometry_data(&features)), &config, &LayerCallbacks::new());
  let mutations = handle.mutations();

  change(&mut config, &mut features);
  engine.sync_layer("layer3", Some(&geometry_data(&features)), &config, &LayerCallbacks::new());
  assert!(handle.mutations() > mutations);
}

#[test]
fn title_changes_do_not_resync() {
  let (mut engine, handle) = engine();
  let data = geometry_data(&mixed_features());
  engine.sync_layer("layer1", Some(&data), &LayerConfig::new("layer1", "Before"), &LayerCallbacks::new());
  let mutations = handle.mutations();

  engine.sync_layer("layer1", Some(&data), &LayerConfig::new("layer1", "After"), &LayerCallbacks::new());
  assert_eq!(handle.mutations(), mutations);
  assert_eq!(engine.tracked_layers()[0].title, "After");
}

#[test]
fn toggling_twice_restores_visibility() {
  let (mut engine, handle) = engine();
  let config = LayerConfig::new("layer2", "Points").with_cluster_points(true);
  engine.sync_layer("layer2", Some(&geometry_data(&[point(1., 1.)])), &config, &LayerCallbacks::new());
  let ids = engine.tracked_layers()[0].ids.clone();
  assert_eq!(ids.len(), 3);
  assert!(ids.iter().all(|id| visible(&handle, id)));

  engine.toggle_layer_visibility("layer2");
  assert!(ids.iter().all(|id| !visible(&handle, id)));
  assert!(!engine.tracked_layers()[0].visible);

  engine.toggle_layer_visibility("layer2");
  assert!(ids.iter().all(|id| visible(&handle, id)));
  assert!(engine.tracked_layers()[0].visible);
}

#[test]
fn clustering_can_be_switched_back_and_forth() {
  let (mut engine, handle) = engine();
  let ids = LayerIds::new("layer4");
  let data = geometry_data(&[point(1., 1.), point(5., 5.)]);
  let plain = LayerConfig::new("layer4", "Points");
  let clustered = plain.clone().with_cluster_points(true);

  engine.sync_layer("layer4", Some(&data), &plain, &LayerCallbacks::new());
  engine.sync_layer("layer4", Some(&data), &clustered, &LayerCallbacks::new());
  assert!(handle.source(&ids.point_source).unwrap().cluster.is_some());
  assert!(handle.layer(&ids.point_cluster).is_some());

  engine.sync_layer("layer4", Some(&data), &plain, &LayerCallbacks::new());
  assert!(handle.source(&ids.point_source).unwrap().cluster.is_none());
  assert!(handle.layer(&ids.point_cluster).is_none());
  assert!(handle.layer(&ids.point_cluster_count).is_none());
  assert_eq!(engine.tracked_layers()[0].ids, vec![ids.point_layer.clone()]);
}

#[test]
fn scatter_derivation_is_deterministic() {
  let data = ElementData::from([
    ("lat".to_string(), vec![json!("1"), json!("2"), json!("x")]),
    ("lon".to_string(), vec![json!("10"), json!("20"), json!("30")]),
    ("legend".to_string(), vec![json!("A"), json!("B"), json!("A")]),
  ]);
  let columns = ScatterColumns {
    latitude: Some("lat".to_string()),
    longitude: Some("lon".to_string()),
    legend: Some("legend".to_string()),
  };
  let first = derive_scatter_feature_collection(&data, &columns, &ScatterStyle::default()).unwrap();
  assert_eq!(first.features.len(), 2);
  let entries = legend_entries(&first);
  assert_eq!(
    entries.iter().map(|e| e.label.as_str()).collect::<Vec<_>>(),
    vec!["A", "B"]
  );
  assert_ne!(entries[0].color, entries[1].color);

  let second = derive_scatter_feature_collection(&data, &columns, &ScatterStyle::default()).unwrap();
  assert_eq!(legend_entries(&second), entries);
}

#[test]
fn lasso_excludes_points_in_holes() {
  let square = |min: f64, max: f64| {
    LineString::from(vec![(min, min), (max, min), (max, max), (min, max), (min, min)])
  };
  let polygon = Polygon::new(square(0., 10.), vec![square(4., 6.)]);
  assert!(!point_in_polygon(Coord { x: 5., y: 5. }, &polygon));
  assert!(point_in_polygon(Coord { x: 2., y: 8. }, &polygon));

  let features = vec![
    Feature::new(Geometry::point(5., 5.), Properties::new()),
    Feature::new(Geometry::point(2., 8.), Properties::new()),
  ];
  let selected = select_within(&features, &[polygon]);
  assert_eq!(selected, vec![features[1].clone()]);
}
