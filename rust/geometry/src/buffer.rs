// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mitred polygon buffering
//!
//! Each ring is offset edge by edge and consecutive offset edges are joined
//! at their intersection (a mitre). Insetting a concave ring this way
//! produces small inverted loops; those are removed by re-filling the raw
//! rings with i_overlay using the winding sign of a counter-clockwise ring.

use crate::error::{Error, Result};
use crate::footprint::{rewind_ccw, rewind_cw, signed_area, Footprint};
use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use nalgebra::{Point2, Vector2};
use std::sync::OnceLock;

/// Maximum mitre length as a multiple of the buffer distance
pub const MITRE_LIMIT: f64 = 5.0;

/// Minimum area of a shape kept from the overlay result
const MIN_AREA_THRESHOLD: f64 = 1e-10;

/// Buffer a footprint with mitred joins.
///
/// Positive `distance` grows the polygon, negative shrinks it. Holes move
/// the opposite way to the outer ring, so an inset widens them. When the
/// result splits into several pieces only the largest is returned; an
/// inset that consumes the whole polygon is an error.
pub fn buffer(footprint: &Footprint, distance: f64) -> Result<Footprint> {
    if !footprint.is_valid() {
        return Err(Error::InvalidFootprint(
            "cannot buffer a degenerate footprint".to_string(),
        ));
    }
    if distance == 0.0 {
        return Ok(footprint.clone());
    }

    let mut outer = footprint.outer.clone();
    rewind_ccw(&mut outer);

    let mut subject: Vec<Vec<[f64; 2]>> = Vec::with_capacity(1 + footprint.holes.len());
    subject.push(to_path(&offset_ring(&outer, distance)));
    for hole in &footprint.holes {
        if hole.len() < 3 {
            continue;
        }
        let mut hole = hole.clone();
        rewind_cw(&mut hole);
        subject.push(to_path(&offset_ring(&hole, distance)));
    }

    let empty: Vec<Vec<[f64; 2]>> = Vec::new();
    let shapes = subject.overlay(&empty, OverlayRule::Subject, ccw_fill_rule());

    largest_shape(&shapes).ok_or_else(|| {
        Error::BufferFailed(format!("buffer by {distance} left no area"))
    })
}

/// Offset one ring. Material lies to the left of each edge, so a positive
/// distance moves edges to the right.
fn offset_ring(ring: &[Point2<f64>], distance: f64) -> Vec<Point2<f64>> {
    let n = ring.len();
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let curr = ring[i];
        let next = ring[(i + 1) % n];

        let n0 = right_normal(&(curr - prev));
        let n1 = right_normal(&(next - curr));

        // Mitre direction: the sum of the two edge normals, scaled so its
        // projection onto each normal equals `distance`.
        let bisector = n0 + n1;
        let denom = 1.0 + n0.dot(&n1);
        let point = if denom.abs() < 1e-9 || bisector.norm_squared() < 1e-18 {
            curr + n1 * distance
        } else {
            let mitre = bisector * (distance / denom);
            let limit = MITRE_LIMIT * distance.abs();
            if mitre.norm() > limit {
                curr + mitre.normalize() * limit
            } else {
                curr + mitre
            }
        };
        out.push(point);
    }

    out
}

#[inline]
fn right_normal(edge: &Vector2<f64>) -> Vector2<f64> {
    let len = edge.norm();
    if len < 1e-12 {
        return Vector2::zeros();
    }
    Vector2::new(edge.y / len, -edge.x / len)
}

fn to_path(ring: &[Point2<f64>]) -> Vec<[f64; 2]> {
    ring.iter().map(|p| [p.x, p.y]).collect()
}

fn to_ring(path: &[[f64; 2]]) -> Vec<Point2<f64>> {
    path.iter().map(|p| Point2::new(p[0], p[1])).collect()
}

/// The fill rule under which a counter-clockwise ring is solid, detected
/// once against a unit square.
fn ccw_fill_rule() -> FillRule {
    static RULE: OnceLock<bool> = OnceLock::new();
    let positive = *RULE.get_or_init(|| {
        let square: Vec<Vec<[f64; 2]>> =
            vec![vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]];
        let empty: Vec<Vec<[f64; 2]>> = Vec::new();
        !square
            .overlay(&empty, OverlayRule::Subject, FillRule::Positive)
            .is_empty()
    });
    if positive {
        FillRule::Positive
    } else {
        FillRule::Negative
    }
}

/// Pick the shape with the largest outer area and normalize its winding
fn largest_shape(shapes: &[Vec<Vec<[f64; 2]>>]) -> Option<Footprint> {
    let best = shapes
        .iter()
        .filter(|shape| !shape.is_empty())
        .map(|shape| (signed_area(&to_ring(&shape[0])).abs(), shape))
        .filter(|(area, _)| *area > MIN_AREA_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))?
        .1;

    let mut outer = to_ring(&best[0]);
    rewind_ccw(&mut outer);

    let holes = best
        .iter()
        .skip(1)
        .map(|contour| to_ring(contour))
        .filter(|hole| hole.len() >= 3 && signed_area(hole).abs() > MIN_AREA_THRESHOLD)
        .map(|mut hole| {
            rewind_cw(&mut hole);
            hole
        })
        .collect();

    Some(Footprint::with_holes(outer, holes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inset_square() {
        let fp = Footprint::rectangle(0.0, 0.0, 10.0, 10.0);
        let inset = buffer(&fp, -2.0).unwrap();
        assert_relative_eq!(inset.area(), 36.0, epsilon = 1e-6);
        let b = inset.bounds();
        assert_relative_eq!(b.min_x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(b.max_y, 8.0, epsilon = 1e-6);
        assert!(signed_area(&inset.outer) > 0.0);
    }

    #[test]
    fn test_outset_square_keeps_mitred_corners() {
        let fp = Footprint::rectangle(0.0, 0.0, 10.0, 10.0);
        let grown = buffer(&fp, 1.0).unwrap();
        assert_relative_eq!(grown.area(), 144.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inset_clockwise_input() {
        let mut fp = Footprint::rectangle(0.0, 0.0, 10.0, 4.0);
        fp.outer.reverse();
        let inset = buffer(&fp, -1.0).unwrap();
        assert_relative_eq!(inset.area(), 16.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inset_collapses() {
        let fp = Footprint::rectangle(0.0, 0.0, 4.0, 4.0);
        assert!(matches!(buffer(&fp, -3.0), Err(Error::BufferFailed(_))));
    }

    #[test]
    fn test_inset_widens_holes() {
        let mut fp = Footprint::rectangle(0.0, 0.0, 20.0, 20.0);
        fp.add_hole(vec![
            Point2::new(8.0, 8.0),
            Point2::new(8.0, 12.0),
            Point2::new(12.0, 12.0),
            Point2::new(12.0, 8.0),
        ]);
        let inset = buffer(&fp, -1.0).unwrap();
        assert_eq!(inset.holes.len(), 1);
        // 18x18 outer minus a 6x6 hole
        assert_relative_eq!(inset.area(), 324.0 - 36.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_distance_is_identity() {
        let fp = Footprint::rectangle(0.0, 0.0, 3.0, 3.0);
        assert_eq!(buffer(&fp, 0.0).unwrap(), fp);
    }
}
