// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-tile accumulation of compiled building geometry.
//!
//! The compiler pushes tagged drawables, model placements and external
//! models into a [`CompilerOutput`]. Once a tile is complete,
//! [`CompilerOutput::create_scene_graph`] turns it into a [`SceneNode`]
//! which can be written to and read back from a [`CacheBin`].

use crate::cache::{CacheBin, CachePolicy};
use crate::progress::Progress;
use crate::scene::{
    Drawable, ExternalModel, InstanceGroup, LodBucket, Primitive, SceneNode, DEBUG_ROOT,
    EXTERNALS_ROOT, GEODES_ROOT, INSTANCES_ROOT,
};
use crate::session::{model_key, ModelKey, Session};
use crate::settings::CompilerSettings;
use crate::tile::{TileKey, TilingProfile};
use skyline_core::{FeatureId, ModelResource};
use skyline_geometry::transform::invert;
use skyline_geometry::Matrix4;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Upper bound on cache directory buckets per axis
const CACHE_KEY_BINS: u32 = 32;

/// Receives the feature id behind every drawable added to an output
pub trait FeatureIndex: Send {
    fn tag_drawable(&mut self, drawable_id: u64, fid: FeatureId);
}

pub struct CompilerOutput {
    name: String,
    key: Option<(TileKey, TilingProfile)>,
    local_to_world: Matrix4<f64>,
    world_to_local: Matrix4<f64>,
    range: f64,
    geodes: BTreeMap<String, Vec<Drawable>>,
    instances: BTreeMap<ModelKey, (Arc<ModelResource>, Vec<Matrix4<f64>>)>,
    externals: Vec<ExternalModel>,
    debug: Vec<Drawable>,
    feature_index: Option<Box<dyn FeatureIndex>>,
    current_feature: Option<FeatureId>,
    next_drawable_id: u64,
}

impl Default for CompilerOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompilerOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerOutput")
            .field("name", &self.name)
            .field("key", &self.key.map(|(k, _)| k))
            .field("drawables", &self.drawable_count())
            .field("instances", &self.instance_count())
            .field("externals", &self.externals.len())
            .finish()
    }
}

impl CompilerOutput {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            key: None,
            local_to_world: Matrix4::identity(),
            world_to_local: Matrix4::identity(),
            range: f64::MAX,
            geodes: BTreeMap::new(),
            instances: BTreeMap::new(),
            externals: Vec::new(),
            debug: Vec::new(),
            feature_index: None,
            current_feature: None,
            next_drawable_id: 0,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_tile_key(&mut self, key: TileKey, profile: TilingProfile) {
        self.key = Some((key, profile));
    }

    pub fn tile_key(&self) -> Option<TileKey> {
        self.key.map(|(k, _)| k)
    }

    /// Install the tile frame. A singular matrix leaves the frame unchanged.
    pub fn set_local_to_world(&mut self, m: Matrix4<f64>) {
        match invert(&m) {
            Ok(inverse) => {
                self.local_to_world = m;
                self.world_to_local = inverse;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring singular tile frame"),
        }
    }

    pub fn local_to_world(&self) -> &Matrix4<f64> {
        &self.local_to_world
    }

    pub fn world_to_local(&self) -> &Matrix4<f64> {
        &self.world_to_local
    }

    /// Visible range of the tile before per-tag scaling
    pub fn set_range(&mut self, range: f64) {
        self.range = range;
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn set_feature_index(&mut self, index: Box<dyn FeatureIndex>) {
        self.feature_index = Some(index);
    }

    /// Feature credited with drawables added from now on
    pub fn set_current_feature(&mut self, fid: Option<FeatureId>) {
        self.current_feature = fid;
    }

    pub fn add_drawable(&mut self, tag: &str, mut drawable: Drawable) {
        let id = self.next_drawable_id;
        self.next_drawable_id += 1;

        if let Some(fid) = self.current_feature {
            drawable.user_data = Some(fid);
            if let Some(index) = &mut self.feature_index {
                index.tag_drawable(id, fid);
            }
        }
        self.geodes.entry(tag.to_string()).or_default().push(drawable);
    }

    pub fn add_instance(&mut self, model: &Arc<ModelResource>, matrix: Matrix4<f64>) {
        self.instances
            .entry(model_key(model))
            .or_insert_with(|| (model.clone(), Vec::new()))
            .1
            .push(matrix);
    }

    pub fn add_external_model(&mut self, uri: impl Into<String>, matrix: Matrix4<f64>) {
        self.externals.push(ExternalModel {
            uri: uri.into(),
            matrix,
        });
    }

    pub fn add_debug(&mut self, drawable: Drawable) {
        self.debug.push(drawable);
    }

    pub fn drawables(&self, tag: &str) -> &[Drawable] {
        self.geodes.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn drawable_count(&self) -> usize {
        self.geodes.values().map(Vec::len).sum()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.values().map(|(_, m)| m.len()).sum()
    }

    pub fn external_count(&self) -> usize {
        self.externals.len()
    }

    pub fn debug_count(&self) -> usize {
        self.debug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geodes.is_empty() && self.instances.is_empty() && self.externals.is_empty()
    }

    /// Cache key for this output: `lod_xbin_ybin/lod_x_y` for tiles, the
    /// name otherwise, or empty when the output cannot be cached.
    pub fn create_cache_key(&self) -> String {
        if let Some((key, profile)) = &self.key {
            let (nx, ny) = profile.num_tiles(key.lod);
            let xbin = key.x / nx.clamp(1, CACHE_KEY_BINS);
            let ybin = key.y / ny.clamp(1, CACHE_KEY_BINS);
            format!("{}_{}_{}/{}_{}_{}", key.lod, xbin, ybin, key.lod, key.x, key.y)
        } else {
            self.name.clone()
        }
    }

    /// Cached graph for this output. Missing, expired and unreadable
    /// entries are all misses.
    pub fn read_from_cache(&self, bin: Option<&dyn CacheBin>, policy: &CachePolicy) -> Option<SceneNode> {
        let bin = bin?;
        if !policy.is_cache_readable() {
            return None;
        }
        let key = self.create_cache_key();
        if key.is_empty() {
            return None;
        }

        let record = match bin.read(&key) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };

        if policy.is_expired(record.last_modified) {
            tracing::debug!(name = %self.name, "Tile is cached but expired");
            return None;
        }

        match serde_json::from_slice::<SceneNode>(&record.data) {
            Ok(node) => {
                tracing::info!(name = %self.name, key = %key, "Loaded tile from the cache");
                Some(node)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    /// Store `node` under this output's key. Returns true when written.
    pub fn write_to_cache(&self, node: &SceneNode, bin: Option<&dyn CacheBin>, policy: &CachePolicy) -> bool {
        let Some(bin) = bin else {
            return false;
        };
        if !policy.is_cache_writeable() {
            return false;
        }
        let key = self.create_cache_key();
        if key.is_empty() {
            return false;
        }

        let mut node = node.clone();
        node.prepare_for_caching();

        let written = serde_json::to_vec(&node)
            .map_err(crate::error::Error::from)
            .and_then(|data| bin.write(&key, &data));
        match written {
            Ok(()) => {
                tracing::info!(name = %self.name, key = %key, "Wrote tile to cache");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Assemble the renderable graph: one LOD bucket per tag, the external
    /// models, a merge pass over the buckets, then one instance group per
    /// model resource.
    pub fn create_scene_graph(
        &self,
        session: &Session,
        settings: &CompilerSettings,
        progress: Option<&Progress>,
    ) -> SceneNode {
        let total = Instant::now();
        let mut root = SceneNode::new(self.name.clone(), self.local_to_world);

        for (tag, drawables) in &self.geodes {
            let max_range = settings
                .bin(tag)
                .map_or(f64::MAX, |bin| self.range * bin.lod_scale);
            root.geodes.push(LodBucket {
                tag: tag.clone(),
                min_range: 0.0,
                max_range,
                drawables: drawables.clone(),
            });
        }
        root.externals = self.externals.clone();

        let optimize = Instant::now();
        for bucket in &mut root.geodes {
            let drawables = std::mem::take(&mut bucket.drawables);
            bucket.drawables = merge_drawables(drawables, settings.max_merged_vertices);
        }
        let optimize_time = optimize.elapsed();

        let instances = Instant::now();
        let cache = session.resource_cache();
        for (resource, matrices) in self.instances.values() {
            let Some(model) = cache.clone_or_create_instance_node(resource, session.loader()) else {
                tracing::warn!(uri = %resource.uri, "Failed to materialize resource");
                continue;
            };

            let lod_scale = settings
                .bin_for_tags(&resource.tags)
                .map_or(1.0, |bin| bin.lod_scale);

            let mut group = InstanceGroup {
                model,
                matrices: matrices.clone(),
                max_range: 0.0,
            };
            let bounds = group.bounds();
            let radius = if bounds.is_valid() { bounds.radius() } else { 0.0 };
            group.max_range = (self.range * lod_scale).max(radius);
            root.instances.push(group);
        }
        let instance_time = instances.elapsed();

        root.debug = self.debug.clone();
        root.compute_bound();

        if let Some(p) = progress.filter(|p| p.collect_stats()) {
            p.set_stat("out.optimize", optimize_time.as_secs_f64());
            p.set_stat("out.instances", instance_time.as_secs_f64());
            p.set_stat("out.total", total.elapsed().as_secs_f64());
        }

        root
    }

    /// Install render-time state. Runs after caching because these
    /// attachments cannot be persisted.
    pub fn post_process(&self, node: &mut SceneNode, _progress: Option<&Progress>) {
        if !node.geodes.is_empty() {
            node.attachments.push(format!("{GEODES_ROOT}:shader"));
        }
        if !node.instances.is_empty() {
            node.attachments.push(format!("{INSTANCES_ROOT}:draw_instanced"));
            for group in &node.instances {
                node.attachments.push(format!("{INSTANCES_ROOT}:{}:shader", group.model.name));
            }
        }
        if !node.externals.is_empty() {
            node.attachments.push(format!("{EXTERNALS_ROOT}:paged"));
        }
        if !node.debug.is_empty() {
            node.attachments.push(format!("{DEBUG_ROOT}:lines"));
        }
    }
}

/// Combine drawables with the same appearance, keeping every batch within
/// `max_vertices`. Line primitives are left alone.
fn merge_drawables(drawables: Vec<Drawable>, max_vertices: usize) -> Vec<Drawable> {
    let mut merged: Vec<Drawable> = Vec::with_capacity(drawables.len());
    for d in drawables {
        if d.primitive != Primitive::Triangles {
            merged.push(d);
            continue;
        }
        let target = merged.iter_mut().find(|m| {
            m.primitive == Primitive::Triangles
                && m.same_state(&d)
                && m.mesh.vertex_count() + d.mesh.vertex_count() <= max_vertices
        });
        match target {
            Some(m) => {
                m.mesh.merge(&d.mesh);
                if m.user_data != d.user_data {
                    m.user_data = None;
                }
            }
            None => merged.push(d),
        }
    }
    merged
}
