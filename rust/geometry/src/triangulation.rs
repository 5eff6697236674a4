// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygon triangulation utilities
//!
//! [`tessellate`] is the entry point used by roof builders: it runs earcutr
//! over the outer ring and holes, and falls back to a plain ear-clipper on
//! the outer ring when earcut fails or produces nothing.

use crate::footprint::signed_area;
use crate::{Error, Point2, Point3, Result, Vector3};
use smallvec::SmallVec;

/// Check if a polygon is convex (all cross products have same sign)
#[inline]
fn is_convex(points: &[Point2<f64>]) -> bool {
    if points.len() < 3 {
        return false;
    }

    let n = points.len();
    let mut sign = 0i8;

    for i in 0..n {
        let p0 = &points[i];
        let p1 = &points[(i + 1) % n];
        let p2 = &points[(i + 2) % n];

        let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);

        if cross.abs() > 1e-10 {
            let current_sign = if cross > 0.0 { 1i8 } else { -1i8 };
            if sign == 0 {
                sign = current_sign;
            } else if sign != current_sign {
                return false;
            }
        }
    }

    true
}

/// Simple fan triangulation for convex polygons
#[inline]
fn fan_triangulate(n: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity((n - 2) * 3);
    for i in 1..n - 1 {
        indices.push(0);
        indices.push(i);
        indices.push(i + 1);
    }
    indices
}

/// Triangulate a polygon with holes using earcut.
/// Returns triangle indices into the combined vertex array (outer + all holes)
pub fn triangulate_polygon_with_holes(
    outer: &[Point2<f64>],
    holes: &[Vec<Point2<f64>>],
) -> Result<Vec<usize>> {
    let n = outer.len();
    if n < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points in outer boundary".to_string(),
        ));
    }

    let valid_holes: SmallVec<[&Vec<Point2<f64>>; 4]> =
        holes.iter().filter(|h| h.len() >= 3).collect();

    if valid_holes.is_empty() {
        if n == 3 {
            return Ok(vec![0, 1, 2]);
        }
        if n <= 8 && is_convex(outer) {
            return Ok(fan_triangulate(n));
        }
    }

    let total_points = n + valid_holes.iter().map(|h| h.len()).sum::<usize>();
    let mut vertices = Vec::with_capacity(total_points * 2);
    for p in outer {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let mut hole_indices: SmallVec<[usize; 4]> = SmallVec::new();
    for hole in &valid_holes {
        hole_indices.push(vertices.len() / 2);
        for p in hole.iter() {
            vertices.push(p.x);
            vertices.push(p.y);
        }
    }

    earcutr::earcut(&vertices, &hole_indices, 2)
        .map_err(|e| Error::TriangulationError(format!("{:?}", e)))
}

/// Ear-clipping triangulation of a single ring (holes are ignored).
/// Works for either winding; indices refer to the input order.
pub fn ear_clip(points: &[Point2<f64>]) -> Result<Vec<usize>> {
    let n = points.len();
    if n < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points to triangulate".to_string(),
        ));
    }

    let ccw = signed_area(points) >= 0.0;
    let mut remaining: Vec<usize> = if ccw {
        (0..n).collect()
    } else {
        (0..n).rev().collect()
    };
    let mut indices = Vec::with_capacity((n - 2) * 3);

    let mut guard = 0usize;
    while remaining.len() > 3 {
        let m = remaining.len();
        let mut clipped = false;
        for i in 0..m {
            let ia = remaining[(i + m - 1) % m];
            let ib = remaining[i];
            let ic = remaining[(i + 1) % m];
            let (a, b, c) = (&points[ia], &points[ib], &points[ic]);

            if cross(a, b, c) <= 1e-12 {
                continue;
            }
            let blocked = remaining
                .iter()
                .filter(|&&k| k != ia && k != ib && k != ic)
                .any(|&k| point_in_triangle(&points[k], a, b, c));
            if blocked {
                continue;
            }

            indices.extend_from_slice(&[ia, ib, ic]);
            remaining.remove(i);
            clipped = true;
            break;
        }

        if !clipped {
            guard += 1;
            // Drop a degenerate (collinear) vertex and keep going
            let m = remaining.len();
            let degenerate = (0..m).find(|&i| {
                let a = &points[remaining[(i + m - 1) % m]];
                let b = &points[remaining[i]];
                let c = &points[remaining[(i + 1) % m]];
                cross(a, b, c).abs() <= 1e-12
            });
            match degenerate {
                Some(i) if guard <= n => {
                    remaining.remove(i);
                }
                _ => {
                    return Err(Error::TriangulationError(
                        "Ear clipping found no ear".to_string(),
                    ))
                }
            }
        }
    }

    if remaining.len() == 3 {
        let (a, b, c) = (
            &points[remaining[0]],
            &points[remaining[1]],
            &points[remaining[2]],
        );
        if cross(a, b, c).abs() > 1e-12 {
            indices.extend_from_slice(&[remaining[0], remaining[1], remaining[2]]);
        }
    }

    if indices.is_empty() {
        return Err(Error::TriangulationError(
            "Ear clipping produced no triangles".to_string(),
        ));
    }
    Ok(indices)
}

/// Result of [`tessellate`]
#[derive(Debug, Clone, Default)]
pub struct Tessellation {
    /// Triangle indices into `outer ++ holes[0] ++ holes[1] ...`
    pub indices: Vec<usize>,
    /// True when earcut failed and the ear-clipping fallback produced the result
    pub used_fallback: bool,
}

/// Tessellate a polygon with holes into triangles.
///
/// The fallback only covers the outer ring, so holes are filled when it
/// is used.
pub fn tessellate(outer: &[Point2<f64>], holes: &[Vec<Point2<f64>>]) -> Result<Tessellation> {
    match triangulate_polygon_with_holes(outer, holes) {
        Ok(indices) if !indices.is_empty() => Ok(Tessellation {
            indices,
            used_fallback: false,
        }),
        _ => Ok(Tessellation {
            indices: ear_clip(outer)?,
            used_fallback: true,
        }),
    }
}

#[inline]
fn cross(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x)
}

fn point_in_triangle(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> bool {
    let d1 = (p.x - b.x) * (a.y - b.y) - (a.x - b.x) * (p.y - b.y);
    let d2 = (p.x - c.x) * (b.y - c.y) - (b.x - c.x) * (p.y - c.y);
    let d3 = (p.x - a.x) * (c.y - a.y) - (c.x - a.x) * (p.y - a.y);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Unit normal of a triangle, or +Z when degenerate
#[inline]
pub fn triangle_normal(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    if len > 1e-10 {
        n / len
    } else {
        Vector3::z()
    }
}
