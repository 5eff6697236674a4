// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tile keys and the quadtree tiling profile.
//!
//! Tile rows count from the top (north) edge of the profile extent. Each
//! level doubles the number of tiles along both axes.

use serde::{Deserialize, Serialize};
use skyline_geometry::{Bounds2, Point2};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub lod: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(lod: u32, x: u32, y: u32) -> Self {
        Self { lod, x, y }
    }

    /// Key one level up; `None` at level 0
    pub fn parent(&self) -> Option<TileKey> {
        if self.lod == 0 {
            None
        } else {
            Some(TileKey::new(self.lod - 1, self.x / 2, self.y / 2))
        }
    }

    /// `"lod/x/y"`
    pub fn str(&self) -> String {
        format!("{}/{}/{}", self.lod, self.x, self.y)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.lod, self.x, self.y)
    }
}

/// Half-open containment used to assign a point to exactly one tile.
///
/// Minimum edges are inclusive and maximum edges exclusive, except where a
/// maximum edge lies on `outer`, the extent of the whole tiling.
pub fn crop_contains(extent: &Bounds2, outer: &Bounds2, p: &Point2<f64>) -> bool {
    let below = |v: f64, max: f64, outer_max: f64| v < max || (v == max && max >= outer_max);
    p.x >= extent.min_x
        && p.y >= extent.min_y
        && below(p.x, extent.max_x, outer.max_x)
        && below(p.y, extent.max_y, outer.max_y)
}

/// Region a feature's centroid must fall in for the feature to be built
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropExtent {
    pub extent: Bounds2,
    pub outer: Bounds2,
}

impl CropExtent {
    /// Crop to `extent` on its own; all of its edges are inclusive
    pub fn new(extent: Bounds2) -> Self {
        Self { extent, outer: extent }
    }

    pub fn contains(&self, p: &Point2<f64>) -> bool {
        crop_contains(&self.extent, &self.outer, p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TilingProfile {
    pub extent: Bounds2,
    pub tiles_wide_lod0: u32,
    pub tiles_high_lod0: u32,
}

impl TilingProfile {
    pub fn new(extent: Bounds2, tiles_wide_lod0: u32, tiles_high_lod0: u32) -> Self {
        Self {
            extent,
            tiles_wide_lod0: tiles_wide_lod0.max(1),
            tiles_high_lod0: tiles_high_lod0.max(1),
        }
    }

    /// Number of tiles (wide, high) at `lod`
    pub fn num_tiles(&self, lod: u32) -> (u32, u32) {
        let factor = 1u32.checked_shl(lod).unwrap_or(u32::MAX);
        (
            self.tiles_wide_lod0.saturating_mul(factor),
            self.tiles_high_lod0.saturating_mul(factor),
        )
    }

    pub fn tile_size(&self, lod: u32) -> (f64, f64) {
        let (w, h) = self.num_tiles(lod);
        (self.extent.width() / w as f64, self.extent.height() / h as f64)
    }

    /// Neighbouring tiles share their edge coordinates exactly, and the
    /// last row and column end on the profile extent.
    pub fn tile_extent(&self, key: &TileKey) -> Bounds2 {
        let (w, h) = self.num_tiles(key.lod);
        let (tw, th) = self.tile_size(key.lod);
        let x_edge = |i: u32| {
            if i >= w {
                self.extent.max_x
            } else {
                self.extent.min_x + i as f64 * tw
            }
        };
        let y_edge = |j: u32| {
            if j >= h {
                self.extent.min_y
            } else {
                self.extent.max_y - j as f64 * th
            }
        };
        Bounds2::new(
            x_edge(key.x),
            y_edge(key.y.saturating_add(1)),
            x_edge(key.x.saturating_add(1)),
            y_edge(key.y),
        )
    }

    /// Crop region of `key`: its extent, closed only along the profile's
    /// far edges
    pub fn crop_extent(&self, key: &TileKey) -> CropExtent {
        CropExtent {
            extent: self.tile_extent(key),
            outer: self.extent,
        }
    }

    /// Radius of the circle enclosing a tile at `lod`
    pub fn tile_radius(&self, lod: u32) -> f64 {
        let (tw, th) = self.tile_size(lod);
        0.5 * (tw * tw + th * th).sqrt()
    }

    /// Key of the tile containing (x, y), or `None` outside the profile
    pub fn create_tile_key(&self, x: f64, y: f64, lod: u32) -> Option<TileKey> {
        if !self.extent.contains(x, y) {
            return None;
        }
        let (w, h) = self.num_tiles(lod);
        let (tw, th) = self.tile_size(lod);
        let col = (((x - self.extent.min_x) / tw) as u32).min(w - 1);
        let row = (((self.extent.max_y - y) / th) as u32).min(h - 1);
        Some(TileKey::new(lod, col, row))
    }

    /// Every tile at `lod` overlapping `extent`, row by row
    pub fn intersecting_tiles(&self, extent: &Bounds2, lod: u32) -> Vec<TileKey> {
        if !extent.is_valid() || !extent.intersects(&self.extent) {
            return Vec::new();
        }
        let (w, h) = self.num_tiles(lod);
        let (tw, th) = self.tile_size(lod);

        let col = |x: f64| (((x - self.extent.min_x) / tw).floor().max(0.0) as u32).min(w - 1);
        let row = |y: f64| (((self.extent.max_y - y) / th).floor().max(0.0) as u32).min(h - 1);

        let (x0, x1) = (col(extent.min_x), col(extent.max_x));
        let (y0, y1) = (row(extent.max_y), row(extent.min_y));

        let mut keys = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
        for y in y0..=y1 {
            for x in x0..=x1 {
                keys.push(TileKey::new(lod, x, y));
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn profile() -> TilingProfile {
        TilingProfile::new(Bounds2::new(0.0, 0.0, 1024.0, 1024.0), 1, 1)
    }

    #[test]
    fn test_parent_chain() {
        let key = TileKey::new(3, 5, 6);
        assert_eq!(key.parent(), Some(TileKey::new(2, 2, 3)));
        assert_eq!(TileKey::new(0, 0, 0).parent(), None);
        assert_eq!(key.str(), "3/5/6");
    }

    #[test]
    fn test_tile_extent_rows_from_top() {
        let p = profile();
        let e = p.tile_extent(&TileKey::new(1, 1, 0));
        assert_relative_eq!(e.min_x, 512.0);
        assert_relative_eq!(e.min_y, 512.0);
        assert_relative_eq!(e.max_y, 1024.0);
        assert_eq!(p.create_tile_key(600.0, 900.0, 1), Some(TileKey::new(1, 1, 0)));
        assert_eq!(p.create_tile_key(-1.0, 0.0, 1), None);
    }

    #[test]
    fn test_intersecting_tiles() {
        let p = profile();
        let keys = p.intersecting_tiles(&Bounds2::new(100.0, 100.0, 300.0, 140.0), 2);
        assert_eq!(keys, vec![TileKey::new(2, 0, 3), TileKey::new(2, 1, 3)]);
        assert!(p
            .intersecting_tiles(&Bounds2::new(2000.0, 2000.0, 2100.0, 2100.0), 2)
            .is_empty());
    }

    #[test]
    fn test_shared_edge_belongs_to_one_tile() {
        let p = TilingProfile::new(Bounds2::new(0.0, 0.0, 1000.0, 1000.0), 1, 1);
        let west = p.crop_extent(&TileKey::new(1, 0, 0));
        let east = p.crop_extent(&TileKey::new(1, 1, 0));
        assert_eq!(west.extent.max_x, east.extent.min_x);

        let on_edge = Point2::new(500.0, 705.0);
        assert!(!west.contains(&on_edge));
        assert!(east.contains(&on_edge));

        // the profile's far corner is still inside its tile
        assert!(east.contains(&Point2::new(1000.0, 1000.0)));
        let south_east = p.crop_extent(&TileKey::new(1, 1, 1));
        assert!(south_east.contains(&Point2::new(1000.0, 0.0)));
        assert!(!south_east.contains(&Point2::new(1000.0, 500.0)));

        assert!(CropExtent::new(Bounds2::new(0.0, 0.0, 10.0, 10.0)).contains(&Point2::new(10.0, 10.0)));
    }
}
