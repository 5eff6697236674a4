// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tile pager: builds the building graph for one tile key at a time.
//!
//! A request first consults the cache bin. On a miss the pager queries the
//! feature source for the tile extent, runs the factory and the compiler,
//! assembles the scene graph, writes it back to the cache and finally
//! installs the render-time attachments. Cancellation at any stage yields
//! `None`, which callers treat as "retry later".

use crate::cache::{bin_id_for, CacheBin, CachePolicy, DiskCacheBin};
use crate::compiler::BuildingCompiler;
use crate::config::PagerConfig;
use crate::error::Result;
use crate::factory::BuildingFactory;
use crate::output::{CompilerOutput, FeatureIndex};
use crate::progress::{is_canceled, Progress};
use crate::scene::SceneNode;
use crate::settings::CompilerSettings;
use crate::stats::Analyzer;
use crate::terrain::{ElevationSource, TerrainClamper};
use crate::tile::{TileKey, TilingProfile};
use rayon::prelude::*;
use skyline_core::{BuildingStyle, Feature};
use skyline_geometry::{Bounds2, Matrix4};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Supplies the features intersecting a tile
pub trait FeatureSource: Send + Sync {
    fn features(&self, key: &TileKey, extent: &Bounds2) -> Vec<Feature>;
}

/// Creates a fresh feature index for each tile build
pub type FeatureIndexFactory = Arc<dyn Fn(&TileKey) -> Box<dyn FeatureIndex> + Send + Sync>;

/// Open the disk bin for `settings` under the configured cache directory.
/// The bin is named by `cache_id` when set, otherwise by a hash of the
/// settings and paging level.
pub fn open_cache_bin(config: &PagerConfig, settings: &CompilerSettings) -> Result<DiskCacheBin> {
    let id = match &config.cache_id {
        Some(id) => id.clone(),
        None => bin_id_for(&settings.to_json()?, config.lod),
    };
    DiskCacheBin::open(&config.cache_dir, &id)
}

/// Terrain clamper sized and timed from `config`
pub fn terrain_clamper(source: Arc<dyn ElevationSource>, config: &PagerConfig) -> TerrainClamper {
    TerrainClamper::new(source)
        .with_max_entries(config.terrain_cache_entries)
        .with_timeout(config.terrain_timeout())
}

pub struct BuildingPager {
    profile: TilingProfile,
    config: PagerConfig,
    features: Option<Arc<dyn FeatureSource>>,
    factory: Option<Arc<BuildingFactory>>,
    compiler: Option<Arc<BuildingCompiler>>,
    cache_bin: Option<Arc<dyn CacheBin>>,
    cache_policy: CachePolicy,
    style: Option<BuildingStyle>,
    feature_index: Option<FeatureIndexFactory>,
    pool: OnceLock<Option<rayon::ThreadPool>>,
}

impl BuildingPager {
    pub fn new(profile: TilingProfile, config: PagerConfig) -> Self {
        let cache_policy = config.cache_policy();
        Self {
            profile,
            config,
            features: None,
            factory: None,
            compiler: None,
            cache_bin: None,
            cache_policy,
            style: None,
            feature_index: None,
            pool: OnceLock::new(),
        }
    }

    pub fn set_feature_source(&mut self, features: Arc<dyn FeatureSource>) {
        self.features = Some(features);
    }

    pub fn set_factory(&mut self, factory: Arc<BuildingFactory>) {
        self.factory = Some(factory);
    }

    pub fn set_compiler(&mut self, compiler: Arc<BuildingCompiler>) {
        self.compiler = Some(compiler);
    }

    pub fn set_cache_bin(&mut self, bin: Option<Arc<dyn CacheBin>>) {
        self.cache_bin = bin;
    }

    pub fn set_cache_policy(&mut self, policy: CachePolicy) {
        self.cache_policy = policy;
    }

    pub fn set_style(&mut self, style: Option<BuildingStyle>) {
        self.style = style;
    }

    pub fn set_feature_index(&mut self, factory: Option<FeatureIndexFactory>) {
        self.feature_index = factory;
    }

    pub fn profile(&self) -> &TilingProfile {
        &self.profile
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn cache_policy(&self) -> &CachePolicy {
        &self.cache_policy
    }

    /// Build the node for `key`. Returns `None` when the pager is not fully
    /// configured or the build was canceled; an empty node when the tile
    /// has no features.
    pub fn create_node(&self, key: &TileKey, progress: Option<&Progress>) -> Option<SceneNode> {
        let (Some(features), Some(factory), Some(compiler)) =
            (&self.features, &self.factory, &self.compiler)
        else {
            tracing::warn!(tile = %key, "Misconfiguration error; something is not set");
            return None;
        };

        let owned;
        let progress = match progress {
            Some(p) => Some(p),
            None if self.config.collect_stats => {
                owned = Progress::with_stats();
                Some(&owned)
            }
            None => None,
        };

        let started = Instant::now();
        let bin = self.cache_bin.as_deref();

        let mut output = CompilerOutput::new();
        output.set_name(key.str());
        output.set_tile_key(*key, self.profile);
        output.set_range(self.profile.tile_radius(key.lod) * self.config.range_factor);

        if let Some(mut node) = output.read_from_cache(bin, &self.cache_policy) {
            output.post_process(&mut node, progress);
            return Some(node);
        }

        if canceled(progress, key) {
            return None;
        }

        let extent = self.profile.tile_extent(key);
        let phase = Instant::now();
        let input = features.features(key, &extent);
        if let Some(p) = progress {
            p.add_time("pager.query", phase.elapsed());
        }
        if input.is_empty() {
            tracing::debug!(tile = %key, "No features in tile");
            return Some(SceneNode::new(key.str(), Matrix4::identity()));
        }

        let mut buildings = Vec::new();
        let crop = self.profile.crop_extent(key);
        if !factory.create(&input, Some(&crop), self.style.as_ref(), &mut buildings, progress) {
            canceled(progress, key);
            return None;
        }
        tracing::debug!(tile = %key, buildings = buildings.len(), "Created buildings");

        if let Some(make_index) = &self.feature_index {
            output.set_feature_index(make_index(key));
        }

        let phase = Instant::now();
        if !compiler.compile(&buildings, &mut output, progress) || canceled(progress, key) {
            return None;
        }
        if let Some(p) = progress {
            p.add_time("compile", phase.elapsed());
        }

        let mut node = output.create_scene_graph(compiler.session(), compiler.settings(), progress);
        if canceled(progress, key) {
            return None;
        }

        output.write_to_cache(&node, bin, &self.cache_policy);
        output.post_process(&mut node, progress);

        if let Some(p) = progress.filter(|p| p.collect_stats()) {
            Analyzer::analyze(&node, p, input.len(), started.elapsed(), key);
        }
        Some(node)
    }

    /// Build several tiles concurrently on the pager's worker pool. Each
    /// tile gets a child of `progress`, so canceling it stops them all.
    pub fn create_nodes(&self, keys: &[TileKey], progress: Option<&Progress>) -> Vec<(TileKey, Option<SceneNode>)> {
        let build = |key: &TileKey| {
            let child = progress.map(Progress::child);
            (*key, self.create_node(key, child.as_ref()))
        };

        match self.pool() {
            Some(pool) => pool.install(|| keys.par_iter().map(build).collect()),
            None => keys.iter().map(build).collect(),
        }
    }

    fn pool(&self) -> Option<&rayon::ThreadPool> {
        self.pool
            .get_or_init(|| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.worker_threads.max(1))
                    .thread_name(|i| format!("building-pager-{i}"))
                    .build()
                    .map_err(|e| tracing::warn!(error = %e, "Failed to start pager threads, building serially"))
                    .ok()
            })
            .as_ref()
    }
}

/// True if canceled, logging where
fn canceled(progress: Option<&Progress>, key: &TileKey) -> bool {
    let canceled = is_canceled(progress);
    if canceled {
        let at = progress.map(|p| p.message()).unwrap_or_default();
        tracing::debug!(tile = %key, at = %at, "Tile build canceled");
    }
    canceled
}
