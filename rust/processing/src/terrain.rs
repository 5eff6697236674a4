// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Terrain clamping: a shared cache of heightfield tiles and the envelopes
//! built from it.
//!
//! Each cached tile moves through `Empty -> InProgress -> Available | Fail`.
//! Only the caller that performs the `Empty -> InProgress` transition
//! fetches the heightfield, and it does so outside the cache lock. Other
//! callers see `Pending` and poll until the tile resolves or their timeout
//! runs out.

use crate::tile::{TileKey, TilingProfile};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use skyline_core::Feature;
use skyline_geometry::{Bounds2, Point2};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Marker for samples without elevation data
pub const NO_DATA_VALUE: f32 = -f32::MAX;

/// Samples per side of a fetched heightfield tile
pub const TILE_SIZE: usize = 33;

pub const DEFAULT_MAX_ENTRIES: usize = 200_000;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Square grid of heights, row 0 at the south edge
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    size: usize,
    heights: Vec<f32>,
}

impl HeightField {
    /// A `size` x `size` grid filled with [`NO_DATA_VALUE`]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            heights: vec![NO_DATA_VALUE; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.heights[row * self.size + col]
    }

    pub fn set(&mut self, col: usize, row: usize, height: f32) {
        self.heights[row * self.size + col] = height;
    }

    pub fn fill(&mut self, height: f32) {
        self.heights.fill(height);
    }

    pub fn has_data(&self) -> bool {
        self.heights.iter().any(|h| *h != NO_DATA_VALUE)
    }
}

/// A heightfield covering a map extent
#[derive(Debug, Clone, PartialEq)]
pub struct GeoHeightField {
    pub heightfield: HeightField,
    pub bounds: Bounds2,
}

impl GeoHeightField {
    pub fn new(heightfield: HeightField, bounds: Bounds2) -> Self {
        Self {
            heightfield,
            bounds,
        }
    }

    /// Bilinear sample at (x, y). `None` outside the bounds or when a
    /// contributing sample has no data.
    pub fn elevation(&self, x: f64, y: f64) -> Option<f32> {
        let hf = &self.heightfield;
        if hf.size < 2 || !self.bounds.contains(x, y) {
            return None;
        }
        let cells = (hf.size - 1) as f64;
        let u = (x - self.bounds.min_x) / self.bounds.width() * cells;
        let v = (y - self.bounds.min_y) / self.bounds.height() * cells;

        let c0 = (u.floor() as usize).min(hf.size - 2);
        let r0 = (v.floor() as usize).min(hf.size - 2);
        let (fu, fv) = (u - c0 as f64, v - r0 as f64);

        let samples = [
            hf.get(c0, r0),
            hf.get(c0 + 1, r0),
            hf.get(c0, r0 + 1),
            hf.get(c0 + 1, r0 + 1),
        ];
        if samples.iter().any(|s| *s == NO_DATA_VALUE) {
            return None;
        }
        let [h00, h10, h01, h11] = samples.map(|s| s as f64);
        let bottom = h00 + (h10 - h00) * fu;
        let top = h01 + (h11 - h01) * fu;
        Some((bottom + (top - bottom) * fv) as f32)
    }
}

/// Terrain height provider
pub trait ElevationSource: Send + Sync {
    fn profile(&self) -> &TilingProfile;

    /// Fill `hf` for the extent of `key`; false when there is no data at
    /// this level.
    fn populate_height_field(&self, hf: &mut HeightField, key: &TileKey) -> bool;

    /// Changes whenever the underlying data changes
    fn revision(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TileStatus {
    Empty = 0,
    InProgress = 1,
    Available = 2,
    Fail = 3,
}

impl TileStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TileStatus::InProgress,
            2 => TileStatus::Available,
            3 => TileStatus::Fail,
            _ => TileStatus::Empty,
        }
    }
}

/// Cache entry for one terrain tile
#[derive(Debug)]
pub struct TerrainTile {
    status: AtomicU8,
    hf: OnceLock<GeoHeightField>,
}

impl TerrainTile {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(TileStatus::Empty as u8),
            hf: OnceLock::new(),
        }
    }

    pub fn status(&self) -> TileStatus {
        TileStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: TileStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn heightfield(&self) -> Option<&GeoHeightField> {
        self.hf.get()
    }

    pub fn bounds(&self) -> Option<&Bounds2> {
        self.hf.get().map(|hf| &hf.bounds)
    }
}

/// Outcome of [`TerrainClamper::get_tile`]
#[derive(Debug, Clone)]
pub enum TileLookup {
    Ready(Arc<TerrainTile>),
    /// Another caller is fetching; check back later
    Pending,
    Failed,
}

#[derive(Debug)]
struct CacheEntry {
    tile: Arc<TerrainTile>,
    stamp: u64,
}

/// Tiles with their last access stamps. `recency` orders keys oldest
/// first, so touching and evicting are both logarithmic.
#[derive(Debug, Default)]
struct TileCache {
    tiles: FxHashMap<TileKey, CacheEntry>,
    recency: BTreeMap<u64, TileKey>,
    clock: u64,
}

impl TileCache {
    fn len(&self) -> usize {
        self.tiles.len()
    }

    fn get(&self, key: &TileKey) -> Option<&Arc<TerrainTile>> {
        self.tiles.get(key).map(|e| &e.tile)
    }

    fn insert(&mut self, key: TileKey, tile: Arc<TerrainTile>) {
        self.clock += 1;
        self.recency.insert(self.clock, key);
        if let Some(old) = self.tiles.insert(key, CacheEntry { tile, stamp: self.clock }) {
            self.recency.remove(&old.stamp);
        }
    }

    fn touch(&mut self, key: &TileKey) {
        let Some(entry) = self.tiles.get_mut(key) else {
            return;
        };
        self.clock += 1;
        self.recency.remove(&entry.stamp);
        entry.stamp = self.clock;
        self.recency.insert(self.clock, *key);
    }

    /// Drop least recently used tiles until at most `max_entries` remain
    fn evict(&mut self, max_entries: usize) {
        while self.tiles.len() > max_entries {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            self.tiles.remove(&key);
        }
    }

    fn clear(&mut self) {
        self.tiles.clear();
        self.recency.clear();
    }
}

pub struct TerrainClamper {
    source: Arc<dyn ElevationSource>,
    cache: Mutex<TileCache>,
    max_entries: usize,
    timeout: Duration,
    revision: AtomicU64,
    fetches: AtomicUsize,
}

impl std::fmt::Debug for TerrainClamper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainClamper")
            .field("max_entries", &self.max_entries)
            .field("timeout", &self.timeout)
            .field("entries", &self.len())
            .finish()
    }
}

impl TerrainClamper {
    pub fn new(source: Arc<dyn ElevationSource>) -> Self {
        let revision = source.revision();
        Self {
            source,
            cache: Mutex::new(TileCache::default()),
            max_entries: DEFAULT_MAX_ENTRIES,
            timeout: DEFAULT_TIMEOUT,
            revision: AtomicU64::new(revision),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn profile(&self) -> &TilingProfile {
        self.source.profile()
    }

    /// Number of cached tiles
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of heightfield fetches started so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Drop every cached tile. Fetches in flight finish into their own
    /// records, which are no longer reachable from the cache.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Look up a tile, fetching it on the calling thread if nobody has yet
    pub fn get_tile(&self, key: &TileKey) -> TileLookup {
        let mut cache = self.cache.lock();

        let tile = match cache.get(key) {
            Some(tile) => tile.clone(),
            None => {
                let tile = Arc::new(TerrainTile::new());
                cache.insert(*key, tile.clone());
                cache.evict(self.max_entries);
                tile
            }
        };

        match tile.status() {
            TileStatus::Empty => {
                tile.set_status(TileStatus::InProgress);
                drop(cache);

                let ok = self.fetch_tile(key, &tile);
                tile.set_status(if ok {
                    TileStatus::Available
                } else {
                    TileStatus::Fail
                });
                if ok {
                    TileLookup::Ready(tile)
                } else {
                    TileLookup::Failed
                }
            }
            TileStatus::Available => {
                cache.touch(key);
                TileLookup::Ready(tile)
            }
            TileStatus::Fail => TileLookup::Failed,
            TileStatus::InProgress => TileLookup::Pending,
        }
    }

    /// Populate a heightfield for `key`, walking up to coarser levels
    /// until one has data.
    fn fetch_tile(&self, key: &TileKey, tile: &TerrainTile) -> bool {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let mut hf = HeightField::new(TILE_SIZE);
        let mut key_to_use = Some(*key);

        while let Some(k) = key_to_use {
            if self.source.populate_height_field(&mut hf, &k) {
                let bounds = self.profile().tile_extent(&k);
                return tile.hf.set(GeoHeightField::new(hf, bounds)).is_ok();
            }
            key_to_use = k.parent();
        }
        false
    }

    /// Resolve the tiles at `lod` covering `extent`. Tiles that fail or time
    /// out are left out.
    pub fn build_query_set(&self, extent: &Bounds2, lod: u32) -> Vec<Arc<TerrainTile>> {
        let revision = self.source.revision();
        if self.revision.swap(revision, Ordering::AcqRel) != revision {
            tracing::debug!(revision, "Elevation source changed, clearing terrain cache");
            self.clear();
        }

        let keys = self.profile().intersecting_tiles(extent, lod);
        let mut output = Vec::with_capacity(keys.len());

        for key in &keys {
            let start = Instant::now();
            let tile = loop {
                match self.get_tile(key) {
                    TileLookup::Ready(tile) => break Some(tile),
                    TileLookup::Failed => break None,
                    TileLookup::Pending => {
                        if start.elapsed() >= self.timeout {
                            tracing::warn!(tile = %key, "Timeout fetching terrain tile");
                            break None;
                        }
                        std::thread::yield_now();
                    }
                }
            };

            if let Some(tile) = tile {
                if tile.heightfield().is_some() {
                    output.push(tile);
                } else {
                    tracing::warn!(tile = %key, "Got a terrain tile with an invalid heightfield");
                }
            }
        }
        output
    }

    pub fn create_envelope(&self, extent: &Bounds2, lod: u32) -> TerrainEnvelope {
        TerrainEnvelope {
            tiles: self.build_query_set(extent, lod),
        }
    }
}

/// Terrain tiles covering one query extent
#[derive(Debug, Default, Clone)]
pub struct TerrainEnvelope {
    tiles: Vec<Arc<TerrainTile>>,
}

impl TerrainEnvelope {
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Elevation at (x, y) from the first tile whose bounds contain it
    pub fn elevation(&self, x: f64, y: f64) -> Option<f32> {
        let hf = self
            .tiles
            .iter()
            .filter_map(|t| t.heightfield())
            .find(|hf| hf.bounds.contains(x, y))?;
        hf.elevation(x, y)
    }

    fn expand(&self, p: &Point2<f64>, range: &mut Option<(f64, f64)>) {
        if let Some(e) = self.elevation(p.x, p.y) {
            let e = e as f64;
            *range = Some(match *range {
                Some((lo, hi)) => (lo.min(e), hi.max(e)),
                None => (e, e),
            });
        }
    }

    /// Lowest and highest terrain under the feature's vertices, falling
    /// back to its centroid when no vertex can be sampled
    pub fn elevation_extrema(&self, feature: &Feature) -> Option<(f64, f64)> {
        let mut range = None;
        if let Some(parts) = feature.geometry.polygons() {
            for part in parts {
                for p in part.rings().flatten() {
                    self.expand(p, &mut range);
                }
            }
        }
        if range.is_none() {
            self.expand(&feature.centroid(), &mut range);
        }
        range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyline_core::FeatureGeometry;
    use skyline_geometry::Footprint;
    use std::sync::Barrier;

    /// Slope rising 1 m per meter eastward, with data only at `data_lod`
    struct Slope {
        profile: TilingProfile,
        data_lod: u32,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Slope {
        fn new(data_lod: u32) -> Self {
            Self {
                profile: TilingProfile::new(Bounds2::new(0.0, 0.0, 1024.0, 1024.0), 1, 1),
                data_lod,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ElevationSource for Slope {
        fn profile(&self) -> &TilingProfile {
            &self.profile
        }

        fn populate_height_field(&self, hf: &mut HeightField, key: &TileKey) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if key.lod > self.data_lod {
                return false;
            }
            let bounds = self.profile.tile_extent(key);
            let n = hf.size();
            for row in 0..n {
                for col in 0..n {
                    let x = bounds.min_x + bounds.width() * col as f64 / (n - 1) as f64;
                    hf.set(col, row, x as f32);
                }
            }
            true
        }
    }

    #[test]
    fn test_bilinear_sampling() {
        let mut hf = HeightField::new(2);
        hf.set(0, 0, 0.0);
        hf.set(1, 0, 10.0);
        hf.set(0, 1, 20.0);
        hf.set(1, 1, 30.0);
        let g = GeoHeightField::new(hf, Bounds2::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(g.elevation(0.5, 0.5), Some(15.0));
        assert_eq!(g.elevation(1.0, 0.0), Some(10.0));
        assert_eq!(g.elevation(2.0, 0.0), None);
    }

    #[test]
    fn test_no_data_is_not_sampled() {
        let g = GeoHeightField::new(HeightField::new(3), Bounds2::new(0.0, 0.0, 1.0, 1.0));
        assert!(!g.heightfield.has_data());
        assert_eq!(g.elevation(0.5, 0.5), None);
    }

    #[test]
    fn test_falls_back_to_parent() {
        let source = Arc::new(Slope::new(1));
        let clamper = TerrainClamper::new(source.clone());
        let TileLookup::Ready(tile) = clamper.get_tile(&TileKey::new(3, 2, 2)) else {
            panic!("tile should resolve from a coarser level");
        };
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(tile.bounds().unwrap().width(), 512.0);
        assert_eq!(tile.status(), TileStatus::Available);
    }

    #[test]
    fn test_failed_tile_stays_failed() {
        let profile = Slope::new(0).profile;
        let clamper = TerrainClamper::new(Arc::new(NoData(profile)));
        assert!(matches!(clamper.get_tile(&TileKey::new(2, 0, 0)), TileLookup::Failed));
        assert!(matches!(clamper.get_tile(&TileKey::new(2, 0, 0)), TileLookup::Failed));
        assert_eq!(clamper.fetch_count(), 1);
    }

    struct NoData(TilingProfile);

    impl ElevationSource for NoData {
        fn profile(&self) -> &TilingProfile {
            &self.0
        }

        fn populate_height_field(&self, _: &mut HeightField, _: &TileKey) -> bool {
            false
        }
    }

    #[test]
    fn test_concurrent_requests_fetch_once() {
        let mut slope = Slope::new(4);
        slope.delay = Duration::from_millis(50);
        let source = Arc::new(slope);
        let clamper = Arc::new(TerrainClamper::new(source.clone()));
        let barrier = Arc::new(Barrier::new(8));
        let extent = Bounds2::new(10.0, 10.0, 20.0, 20.0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clamper = clamper.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    clamper.build_query_set(&extent, 4).len()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
        assert_eq!(clamper.fetch_count(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lru_eviction_and_clear() {
        let clamper = TerrainClamper::new(Arc::new(Slope::new(4))).with_max_entries(2);
        for x in 0..3 {
            clamper.get_tile(&TileKey::new(4, x, 0));
        }
        assert_eq!(clamper.len(), 2);
        // the oldest key was evicted and is fetched again
        clamper.get_tile(&TileKey::new(4, 0, 0));
        assert_eq!(clamper.fetch_count(), 4);
        clamper.clear();
        assert!(clamper.is_empty());
    }

    #[test]
    fn test_envelope_extrema() {
        let clamper = TerrainClamper::new(Arc::new(Slope::new(6)));
        let extent = Bounds2::new(100.0, 100.0, 140.0, 120.0);
        let envelope = clamper.create_envelope(&extent, 6);
        assert!(envelope.tile_count() >= 1);

        let feature = Feature::new(
            1,
            FeatureGeometry::Polygon(Footprint::rectangle(100.0, 100.0, 140.0, 120.0)),
        );
        let (lo, hi) = envelope.elevation_extrema(&feature).unwrap();
        assert!((lo - 100.0).abs() < 1e-3);
        assert!((hi - 140.0).abs() < 1e-3);

        let outside = Feature::new(
            2,
            FeatureGeometry::Polygon(Footprint::rectangle(900.0, 900.0, 910.0, 910.0)),
        );
        assert!(envelope.elevation_extrema(&outside).is_none());
    }

    #[test]
    fn test_recency_at_default_capacity() {
        let mut cache = TileCache::default();
        let keys: Vec<TileKey> = (0..DEFAULT_MAX_ENTRIES as u32)
            .map(|i| TileKey::new(18, i % 1000, i / 1000))
            .collect();
        for key in &keys {
            cache.insert(*key, Arc::new(TerrainTile::new()));
        }
        assert_eq!(cache.len(), DEFAULT_MAX_ENTRIES);

        // touching the coldest entries must not scan the whole cache
        let started = Instant::now();
        for round in 0..10 {
            for key in &keys[round * 1000..(round + 1) * 1000] {
                cache.touch(key);
            }
        }
        assert!(started.elapsed() < Duration::from_secs(2));

        // the touched keys are now the newest, so the next 1000 go first
        cache.insert(TileKey::new(19, 0, 0), Arc::new(TerrainTile::new()));
        cache.evict(DEFAULT_MAX_ENTRIES);
        assert_eq!(cache.len(), DEFAULT_MAX_ENTRIES);
        assert!(cache.get(&keys[0]).is_some());
        assert!(cache.get(&keys[10_000]).is_none());
        assert!(cache.get(&keys[10_001]).is_some());
        assert_eq!(cache.recency.len(), cache.len());
    }
}
