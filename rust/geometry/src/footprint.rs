// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building footprints: a polygon with an outer ring and optional holes
//!
//! Rings are stored open (the closing vertex is not repeated). After
//! [`Footprint::clean`] the outer ring winds counter-clockwise and holes
//! wind clockwise.

use crate::bounds::Bounds2;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Points closer than this are treated as duplicates
const DUPLICATE_EPSILON: f64 = 1e-9;

/// Minimum area for a ring to count as non-degenerate
const MIN_AREA_THRESHOLD: f64 = 1e-10;

/// Cross-product tolerance for collinearity, relative to edge lengths
const COLLINEAR_EPSILON: f64 = 1e-9;

/// A 2D segment between two ring vertices
pub type Segment = (Point2<f64>, Point2<f64>);

/// Polygon footprint in a planar frame (meters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Outer boundary (counter-clockwise once cleaned)
    pub outer: Vec<Point2<f64>>,
    /// Holes (clockwise once cleaned)
    pub holes: Vec<Vec<Point2<f64>>>,
}

impl Footprint {
    /// Create a footprint with no holes
    pub fn new(outer: Vec<Point2<f64>>) -> Self {
        Self {
            outer,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(outer: Vec<Point2<f64>>, holes: Vec<Vec<Point2<f64>>>) -> Self {
        Self { outer, holes }
    }

    /// Axis-aligned rectangle footprint, counter-clockwise from (min_x, min_y)
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(vec![
            Point2::new(min_x, min_y),
            Point2::new(max_x, min_y),
            Point2::new(max_x, max_y),
            Point2::new(min_x, max_y),
        ])
    }

    pub fn add_hole(&mut self, hole: Vec<Point2<f64>>) {
        self.holes.push(hole);
    }

    /// Outer ring followed by every hole
    pub fn rings(&self) -> impl Iterator<Item = &Vec<Point2<f64>>> {
        std::iter::once(&self.outer).chain(self.holes.iter())
    }

    /// A footprint is valid when its outer ring encloses a non-zero area
    pub fn is_valid(&self) -> bool {
        distinct_count(&self.outer) >= 3 && signed_area(&self.outer).abs() > MIN_AREA_THRESHOLD
    }

    /// Bounds of the outer ring
    pub fn bounds(&self) -> Bounds2 {
        Bounds2::from_points(self.outer.iter())
    }

    /// Center of the bounding rectangle
    pub fn centroid(&self) -> Point2<f64> {
        self.bounds().center()
    }

    /// Area of the outer ring minus the holes
    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| signed_area(h).abs()).sum();
        (signed_area(&self.outer).abs() - holes).max(0.0)
    }

    /// Even-odd containment over all rings
    pub fn contains_point(&self, p: &Point2<f64>) -> bool {
        point_in_ring(p, &self.outer) && !self.holes.iter().any(|h| point_in_ring(p, h))
    }

    /// Copy of this footprint shifted by `offset`
    pub fn translated(&self, offset: &Vector2<f64>) -> Self {
        let shift = |ring: &Vec<Point2<f64>>| ring.iter().map(|p| p + offset).collect();
        Self {
            outer: shift(&self.outer),
            holes: self.holes.iter().map(shift).collect(),
        }
    }

    /// Closed segment iteration over the outer ring
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        ring_segments(&self.outer)
    }

    /// Longest outer-ring edge by squared length
    pub fn longest_edge(&self) -> Option<Segment> {
        let mut best: Option<Segment> = None;
        let mut max_len2 = 0.0;
        for s in self.segments() {
            let len2 = (s.1 - s.0).norm_squared();
            if len2 > max_len2 {
                max_len2 = len2;
                best = Some(s);
            }
        }
        best
    }

    /// Normalize rings in place: open them, drop duplicate vertices, and
    /// rewind the outer ring CCW and holes CW. Degenerate holes are removed.
    pub fn clean(&mut self) {
        open_ring(&mut self.outer);
        remove_duplicates(&mut self.outer);
        rewind_ccw(&mut self.outer);

        for hole in &mut self.holes {
            open_ring(hole);
            remove_duplicates(hole);
            rewind_cw(hole);
        }
        self.holes
            .retain(|h| distinct_count(h) >= 3 && signed_area(h).abs() > MIN_AREA_THRESHOLD);
    }

    /// Drop vertices that lie on the line through their neighbours
    pub fn remove_collinear_points(&mut self) {
        remove_collinear(&mut self.outer);
        for hole in &mut self.holes {
            remove_collinear(hole);
        }
    }
}

/// Closed segment iteration over one ring
pub fn ring_segments(ring: &[Point2<f64>]) -> impl Iterator<Item = Segment> + '_ {
    let n = ring.len();
    (0..if n >= 2 { n } else { 0 }).map(move |i| (ring[i], ring[(i + 1) % n]))
}

/// Compute the signed area of a ring.
/// Positive = counter-clockwise, Negative = clockwise
pub fn signed_area(ring: &[Point2<f64>]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let n = ring.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += ring[i].x * ring[j].y;
        area -= ring[j].x * ring[i].y;
    }

    area * 0.5
}

/// Reverse a ring if it winds clockwise
pub fn rewind_ccw(ring: &mut [Point2<f64>]) {
    if signed_area(ring) < 0.0 {
        ring.reverse();
    }
}

/// Reverse a ring if it winds counter-clockwise
pub fn rewind_cw(ring: &mut [Point2<f64>]) {
    if signed_area(ring) > 0.0 {
        ring.reverse();
    }
}

/// Ray-casting point containment for a single ring
pub fn point_in_ring(point: &Point2<f64>, ring: &[Point2<f64>]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let pi = &ring[i];
        let pj = &ring[j];
        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn open_ring(ring: &mut Vec<Point2<f64>>) {
    while ring.len() > 1 {
        let first = ring[0];
        let last = ring[ring.len() - 1];
        if (first - last).norm() < DUPLICATE_EPSILON {
            ring.pop();
        } else {
            break;
        }
    }
}

fn remove_duplicates(ring: &mut Vec<Point2<f64>>) {
    ring.dedup_by(|a, b| (*a - *b).norm() < DUPLICATE_EPSILON);
    open_ring(ring);
}

fn distinct_count(ring: &[Point2<f64>]) -> usize {
    let mut copy = ring.to_vec();
    remove_duplicates(&mut copy);
    copy.len()
}

fn remove_collinear(ring: &mut Vec<Point2<f64>>) {
    if ring.len() <= 3 {
        return;
    }

    // Repeat until stable; removing one vertex can expose another.
    loop {
        let n = ring.len();
        if n <= 3 {
            return;
        }
        let victim = (0..n).find(|&i| {
            let prev = ring[(i + n - 1) % n];
            let curr = ring[i];
            let next = ring[(i + 1) % n];
            let a = curr - prev;
            let b = next - curr;
            let cross = a.x * b.y - a.y * b.x;
            cross.abs() <= COLLINEAR_EPSILON * (a.norm() * b.norm()).max(1.0) && a.dot(&b) >= 0.0
        });
        match victim {
            Some(i) => {
                ring.remove(i);
            }
            None => return,
        }
    }
}
