// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tile builds through the pager with in-memory feature and
//! terrain sources.

use skyline_core::{
    BuildingCatalog, BuildingStyle, BuildingSymbol, Feature, FeatureGeometry, ModelResource, NumericExpr,
    ResourceLibrary, SkinResource,
};
use skyline_geometry::{Bounds2, Footprint, Mesh, Point3, Vector3};
use skyline_processing::{
    BuildingCompiler, BuildingFactory, BuildingPager, CacheBin, CachePolicy, CacheUsage,
    CompilerSettings, DiskCacheBin, Drawable, ElevationSource, FeatureSource, HeightField, InMemoryModelLoader,
    MemoryCacheBin, ModelNode, PagerConfig, Progress, SceneNode, Session, TileKey, TilingProfile,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const CATALOG: &str = r#"{
    "buildings": [{
        "name": "block",
        "elevations": [{
            "skin": "facade",
            "roof": {"type": "flat", "model": "hvac"}
        }]
    }]
}"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn profile() -> TilingProfile {
    TilingProfile::new(Bounds2::new(0.0, 0.0, 1000.0, 1000.0), 1, 1)
}

/// Features whose bounds touch the requested extent
struct Features {
    features: Vec<Feature>,
    queries: AtomicUsize,
    cancel_on_query: Option<Arc<Progress>>,
}

impl Features {
    fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            queries: AtomicUsize::new(0),
            cancel_on_query: None,
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl FeatureSource for Features {
    fn features(&self, _key: &TileKey, extent: &Bounds2) -> Vec<Feature> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(progress) = &self.cancel_on_query {
            progress.cancel();
        }
        self.features
            .iter()
            .filter(|f| f.geometry.bounds().intersects(extent))
            .cloned()
            .collect()
    }
}

/// Flat ground at a fixed height
struct Plateau(TilingProfile, f32);

impl ElevationSource for Plateau {
    fn profile(&self) -> &TilingProfile {
        &self.0
    }

    fn populate_height_field(&self, hf: &mut HeightField, _key: &TileKey) -> bool {
        hf.fill(self.1);
        true
    }
}

fn rectangle(id: u64, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Feature {
    Feature::new(id, FeatureGeometry::Polygon(Footprint::rectangle(min_x, min_y, max_x, max_y)))
}

fn session() -> Arc<Session> {
    let mut mesh = Mesh::new();
    let up = Vector3::z();
    let a = mesh.add_vertex(Point3::new(-1.0, -1.0, 0.0), up);
    let b = mesh.add_vertex(Point3::new(1.0, -1.0, 0.0), up);
    let c = mesh.add_vertex(Point3::new(1.0, 1.0, 1.5), up);
    mesh.add_triangle(a, b, c);
    let loader = InMemoryModelLoader::new();
    loader.insert("hvac", ModelNode::new("hvac", vec![Drawable::new(mesh, [0.8, 0.8, 0.8, 1.0])]));

    let mut library = ResourceLibrary::new("city");
    let mut facade = SkinResource::new("facade").with_size(4.0, 3.0);
    facade.uri = "facade.png".into();
    library.add_skin(facade);
    library.add_model(ModelResource::new("hvac"));

    let mut session = Session::new(Arc::new(loader));
    session.add_library(library);
    Arc::new(session)
}

fn style(height: f64) -> BuildingStyle {
    BuildingStyle {
        symbol: Some(BuildingSymbol {
            height: Some(NumericExpr::literal(height)),
            ..Default::default()
        }),
        clamp_to_terrain: false,
    }
}

fn pager(features: Arc<Features>, bin: Option<Arc<dyn CacheBin>>) -> BuildingPager {
    let mut config = PagerConfig::from_env();
    config.lod = 1;
    config.collect_stats = false;
    config.worker_threads = 4;

    let session = session();
    let catalog = Arc::new(BuildingCatalog::from_json(CATALOG).unwrap());

    let mut pager = BuildingPager::new(profile(), config);
    pager.set_feature_source(features);
    pager.set_factory(Arc::new(BuildingFactory::new(session.clone()).with_catalog(catalog)));
    pager.set_compiler(Arc::new(BuildingCompiler::new(session, CompilerSettings::default())));
    pager.set_cache_bin(bin);
    pager.set_cache_policy(CachePolicy::default());
    pager.set_style(Some(style(12.0)));
    pager
}

fn triangles(node: &SceneNode) -> usize {
    node.geodes
        .iter()
        .flat_map(|b| &b.drawables)
        .map(|d| d.mesh.triangle_count())
        .sum()
}

#[test]
fn test_square_building_end_to_end() {
    init_tracing();
    let features = Arc::new(Features::new(vec![rectangle(11, 100.0, 600.0, 110.0, 610.0)]));
    let pager = pager(features, None);

    let key = profile().create_tile_key(105.0, 605.0, 1).unwrap();
    let node = pager.create_node(&key, None).unwrap();

    // 12 wall faces of two triangles each, plus the two-triangle roof
    let bucket = node.bucket("").unwrap();
    assert_eq!(bucket.drawables.len(), 2);
    assert_eq!(triangles(&node), 26);

    let walls = bucket.drawables.iter().find(|d| d.texture.is_some()).unwrap();
    assert_eq!(walls.texture.as_ref().unwrap().uri, "facade.png");
    assert_eq!(walls.mesh.triangle_count(), 24);

    // one roof prop, drawn as an instance
    assert_eq!(node.instance_count(), 1);
    assert!(node.bound.is_valid());
    assert!(node.is_post_processed());
}

#[test]
fn test_cache_round_trip_matches_fresh_build() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let bin: Arc<dyn CacheBin> = Arc::new(DiskCacheBin::open(dir.path(), "tiles").unwrap());

    let features = Arc::new(Features::new(vec![
        rectangle(1, 100.0, 600.0, 140.0, 620.0),
        rectangle(2, 200.0, 700.0, 210.0, 710.0),
    ]));
    let key = TileKey::new(1, 0, 0);

    let fresh = pager(features.clone(), Some(bin.clone())).create_node(&key, None).unwrap();
    assert_eq!(features.queries(), 1);
    assert_eq!(fresh.instances.len(), 1);
    assert_eq!(fresh.instance_count(), 2);

    let cached = pager(features.clone(), Some(bin)).create_node(&key, None).unwrap();
    assert_eq!(features.queries(), 1);

    assert_eq!(cached.geodes.len(), fresh.geodes.len());
    for (a, b) in cached.geodes.iter().zip(&fresh.geodes) {
        assert_eq!(a.tag, b.tag);
        assert_eq!(a.drawables.len(), b.drawables.len());
    }
    assert_eq!(cached.instance_count(), fresh.instance_count());
    assert_eq!(cached.instances[0].matrices.len(), fresh.instances[0].matrices.len());
    assert_eq!(cached.attachments, fresh.attachments);
}

#[test]
fn test_expired_entry_rebuilds() {
    let bin = Arc::new(MemoryCacheBin::new("tiles"));
    let features = Arc::new(Features::new(vec![rectangle(1, 100.0, 600.0, 110.0, 610.0)]));
    let mut pager = pager(features.clone(), Some(bin.clone()));
    pager.set_cache_policy(CachePolicy {
        usage: CacheUsage::ReadWrite,
        max_age: Some(Duration::from_secs(60)),
    });

    let key = TileKey::new(1, 0, 0);
    pager.create_node(&key, None).unwrap();
    pager.create_node(&key, None).unwrap();
    assert_eq!(features.queries(), 1);

    let cache_key = "1_0_0/1_0_0";
    let record = bin.read(cache_key).unwrap().unwrap();
    bin.write_at(cache_key, &record.data, SystemTime::now() - Duration::from_secs(3600));

    pager.create_node(&key, None).unwrap();
    assert_eq!(features.queries(), 2);
}

#[test]
fn test_canceled_build_returns_nothing() {
    init_tracing();
    let bin = Arc::new(MemoryCacheBin::new("tiles"));
    let progress = Arc::new(Progress::new());

    let mut features = Features::new(vec![rectangle(1, 100.0, 600.0, 110.0, 610.0)]);
    features.cancel_on_query = Some(progress.clone());
    let pager = pager(Arc::new(features), Some(bin.clone()));

    let key = TileKey::new(1, 0, 0);
    assert!(pager.create_node(&key, Some(progress.as_ref())).is_none());
    assert_eq!(progress.message(), "in BuildingFactory::create");
    assert!(bin.is_empty());

    // canceled up front, before the feature query
    let features = Arc::new(Features::new(Vec::new()));
    let pager = self::pager(features.clone(), None);
    assert!(pager.create_node(&key, Some(progress.as_ref())).is_none());
    assert_eq!(features.queries(), 0);
}

#[test]
fn test_empty_tile_is_not_cached() {
    let bin = Arc::new(MemoryCacheBin::new("tiles"));
    let features = Arc::new(Features::new(Vec::new()));
    let pager = pager(features, Some(bin.clone()));

    let node = pager.create_node(&TileKey::new(1, 1, 1), None).unwrap();
    assert!(node.is_empty());
    assert!(bin.is_empty());
}

#[test]
fn test_concurrent_tiles_on_clamped_terrain() {
    init_tracing();
    let features = Arc::new(Features::new(vec![
        rectangle(1, 100.0, 600.0, 110.0, 610.0),
        rectangle(2, 600.0, 600.0, 610.0, 610.0),
        rectangle(3, 100.0, 100.0, 110.0, 110.0),
        rectangle(4, 600.0, 100.0, 610.0, 110.0),
    ]));

    let mut pager = pager(features.clone(), None);
    let mut config = pager.config().clone();
    config.clamp_lod = 1;
    let catalog = Arc::new(BuildingCatalog::from_json(CATALOG).unwrap());
    let factory = Arc::new(
        BuildingFactory::new(session())
            .with_catalog(catalog)
            .with_terrain(Arc::new(Plateau(profile(), 250.0)), &config),
    );
    let clamper = factory.clamper().unwrap().clone();
    pager.set_factory(factory);
    let mut style = style(12.0);
    style.clamp_to_terrain = true;
    pager.set_style(Some(style));

    let keys = profile().intersecting_tiles(&Bounds2::new(0.0, 0.0, 1000.0, 1000.0), 1);
    assert_eq!(keys.len(), 4);

    let progress = Progress::new();
    let nodes = pager.create_nodes(&keys, Some(&progress));
    assert_eq!(nodes.len(), 4);
    for ((key, node), expected) in nodes.iter().zip(&keys) {
        assert_eq!(key, expected);
        let node = node.as_ref().unwrap();
        assert_eq!(triangles(node), 26);
        // buildings stand on the plateau
        assert!((node.local_to_world[(2, 3)] - 250.0).abs() < 1e-3);
    }
    assert_eq!(features.queries(), 4);
    assert!(clamper.fetch_count() <= 4);
}
