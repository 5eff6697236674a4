// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Roofs capping an elevation.
//!
//! A roof only stores parameters; the geometry is generated by the roof
//! compilers in `skyline-processing`. The one thing built here is the
//! model box: an inscribed rectangle, aligned with the elevation's long
//! edge, where a decorative prop can be placed.

use crate::elevation::Orientation;
use crate::resource::{Color, ModelResource, SkinResource};
use serde::{Deserialize, Serialize};
use skyline_geometry::{Footprint, Point2, Vector2};
use std::sync::Arc;

/// Number of shrink steps tried when fitting the model box
const MODEL_BOX_ITERATIONS: usize = 24;

/// Shrink factor applied per fitting step
const MODEL_BOX_SHRINK: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoofKind {
    #[default]
    Flat,
    Gable,
    Instanced,
    Custom,
}

#[derive(Debug, Clone, Default)]
pub struct Roof {
    pub kind: RoofKind,
    /// Library name of the skin, resolved into `skin`
    pub skin_name: Option<String>,
    /// Library name of the model, resolved into `model`
    pub model_name: Option<String>,
    pub skin: Option<Arc<SkinResource>>,
    pub model: Option<Arc<ModelResource>>,
    pub color: Option<Color>,
    model_box: Option<[Point2<f64>; 4]>,
}

impl Roof {
    pub fn new(kind: RoofKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn flat() -> Self {
        Self::new(RoofKind::Flat)
    }

    /// Fit the model box to `footprint`. Returns true when a box was found.
    pub fn build(&mut self, footprint: &Footprint, orientation: &Orientation) -> bool {
        self.model_box = find_rectangle(footprint, orientation);
        self.model_box.is_some()
    }

    pub fn has_model_box(&self) -> bool {
        self.model_box.is_some()
    }

    /// Corners of the model box in footprint coordinates, counter-clockwise
    pub fn model_box(&self) -> Option<&[Point2<f64>; 4]> {
        self.model_box.as_ref()
    }
}

/// Search for a rectangle inside `footprint` whose sides run along and
/// across the long edge. Starts from the long-edge midpoint, marches
/// inward to the opposite boundary, then shrinks the candidate until it
/// fits.
fn find_rectangle(footprint: &Footprint, orientation: &Orientation) -> Option<[Point2<f64>; 4]> {
    let n = orientation.long_edge_inside_normal;
    if n.norm_squared() < 1e-12 {
        return None;
    }
    let along = Vector2::new(-n.y, n.x);

    let y0 = orientation.long_edge_midpoint;
    let depth = ray_distance(footprint, &(y0 + n * 1e-6), &n)?;
    let center = y0 + n * (depth * 0.5);

    let reach_a = ray_distance(footprint, &center, &along)?;
    let reach_b = ray_distance(footprint, &center, &(-along))?;

    let half_depth = depth * 0.5;
    let half_len = reach_a.min(reach_b);

    let mut scale = 0.95;
    for _ in 0..MODEL_BOX_ITERATIONS {
        let hd = half_depth * scale;
        let hl = half_len * scale;
        if hd * hl < 1e-6 {
            return None;
        }
        let corners = [
            center - n * hd - along * hl,
            center - n * hd + along * hl,
            center + n * hd + along * hl,
            center + n * hd - along * hl,
        ];
        if fits(footprint, &corners, &center, &n, &along, hd, hl) {
            let mut ring = corners.to_vec();
            skyline_geometry::footprint::rewind_ccw(&mut ring);
            return Some([ring[0], ring[1], ring[2], ring[3]]);
        }
        scale *= MODEL_BOX_SHRINK;
    }
    None
}

fn fits(
    footprint: &Footprint,
    corners: &[Point2<f64>; 4],
    center: &Point2<f64>,
    n: &Vector2<f64>,
    along: &Vector2<f64>,
    hd: f64,
    hl: f64,
) -> bool {
    if !corners.iter().all(|c| footprint.contains_point(c)) {
        return false;
    }
    // No footprint vertex may poke into the rectangle
    footprint.rings().flatten().all(|p| {
        let d = p - center;
        d.dot(n).abs() >= hd || d.dot(along).abs() >= hl
    })
}

/// Distance from `origin` along `dir` to the nearest boundary segment
fn ray_distance(footprint: &Footprint, origin: &Point2<f64>, dir: &Vector2<f64>) -> Option<f64> {
    let mut best: Option<f64> = None;
    for ring in footprint.rings() {
        for (a, b) in skyline_geometry::footprint::ring_segments(ring) {
            let e = b - a;
            let det = dir.x * e.y - dir.y * e.x;
            if det.abs() < 1e-12 {
                continue;
            }
            let w = a - origin;
            let t = (w.x * e.y - w.y * e.x) / det;
            let u = (w.x * dir.y - w.y * dir.x) / det;
            if t > 1e-9 && (-1e-9..=1.0 + 1e-9).contains(&u) {
                best = Some(best.map_or(t, |bt: f64| bt.min(t)));
            }
        }
    }
    best
}
