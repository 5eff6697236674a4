// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Benchmark of uncached tile builds over a synthetic block grid.
//!
//! Run with: cargo bench -p skyline-processing --bench pager

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use skyline_core::{BuildingStyle, BuildingSymbol, Feature, FeatureGeometry, NumericExpr};
use skyline_geometry::{Bounds2, Footprint};
use skyline_processing::{
    BuildingCompiler, BuildingFactory, BuildingPager, CompilerSettings, FeatureSource, PagerConfig, Session,
    TileKey, TilingProfile,
};
use std::sync::Arc;

/// `n` x `n` blocks of 20 m with 10 m streets in between
struct Blocks {
    features: Vec<Feature>,
}

impl Blocks {
    fn new(n: usize) -> Self {
        let mut features = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let x = 30.0 * i as f64;
                let y = 30.0 * j as f64;
                let id = (i * n + j) as u64;
                features.push(Feature::new(
                    id,
                    FeatureGeometry::Polygon(Footprint::rectangle(x, y, x + 20.0, y + 20.0)),
                ));
            }
        }
        Self { features }
    }
}

impl FeatureSource for Blocks {
    fn features(&self, _key: &TileKey, extent: &Bounds2) -> Vec<Feature> {
        self.features
            .iter()
            .filter(|f| f.geometry.bounds().intersects(extent))
            .cloned()
            .collect()
    }
}

fn pager(n: usize) -> BuildingPager {
    let size = 30.0 * n as f64;
    let profile = TilingProfile::new(Bounds2::new(0.0, 0.0, size, size), 1, 1);

    let mut config = PagerConfig::from_env();
    config.lod = 0;
    config.collect_stats = false;

    let session = Arc::new(Session::default());
    let mut pager = BuildingPager::new(profile, config);
    pager.set_feature_source(Arc::new(Blocks::new(n)));
    pager.set_factory(Arc::new(BuildingFactory::new(session.clone())));
    pager.set_compiler(Arc::new(BuildingCompiler::new(session, CompilerSettings::default())));
    pager.set_style(Some(BuildingStyle {
        symbol: Some(BuildingSymbol {
            height: Some(NumericExpr::literal(24.0)),
            ..Default::default()
        }),
        clamp_to_terrain: false,
    }));
    pager
}

fn bench_create_node(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_node");
    for n in [4, 16, 32] {
        let pager = pager(n);
        let key = TileKey::new(0, 0, 0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n * n), &key, |b, key| {
            b.iter(|| black_box(pager.create_node(key, None)))
        });
    }
    group.finish();
}

fn bench_create_nodes(c: &mut Criterion) {
    let pager = pager(32);
    let keys = pager
        .profile()
        .intersecting_tiles(&Bounds2::new(0.0, 0.0, 960.0, 960.0), 1);
    c.bench_function("create_nodes/4_tiles", |b| {
        b.iter(|| black_box(pager.create_nodes(&keys, None)))
    });
}

criterion_group!(benches, bench_create_node, bench_create_nodes);
criterion_main!(benches);
