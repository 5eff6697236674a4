// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Elevations: vertical bands of a building and their wall extrusion.
//!
//! Building an elevation turns each ring of its footprint into a [`Wall`]:
//! a closed loop of [`Face`]s, each spanning two extruded [`Corner`]s. When
//! the wall skin has a real-world width, extra corners are inserted so that
//! no face spans more than one repetition of the texture.
//!
//! All coordinates are in the building's local frame.

use crate::keys::ElevationKey;
use crate::resource::{Color, SkinResource};
use crate::roof::{Roof, RoofKind};
use crate::symbol::DEFAULT_METERS_PER_FLOOR;
use skyline_geometry::footprint::{rewind_cw, Footprint};
use skyline_geometry::{buffer, BoundingBox3, Point2, Point3, Rotation2, Vector2, Vector3};
use std::sync::Arc;

/// Height of an elevation whose height was never resolved
pub const DEFAULT_HEIGHT: f64 = 50.0;

/// Roof texture span used when the roof skin has no size
pub const DEFAULT_ROOF_TEX_SPAN: f64 = 10.0;

/// Texture boundaries closer than this to an existing corner are skipped
const CORNER_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElevationKind {
    Standard,
    /// Low wall around the roof edge, `width` meters thick
    Parapet { width: f64 },
}

/// One footprint vertex extruded from the elevation bottom to its top
#[derive(Debug, Clone, PartialEq)]
pub struct Corner {
    pub lower: Point3<f64>,
    pub upper: Point3<f64>,
    /// Roof texture coordinate in the long-edge aligned frame
    pub roof_uv: Point2<f64>,
    /// Horizontal distance from the start of the ring
    pub offset_x: f64,
    pub height: f64,
    /// Cosine of the turn between the incoming and outgoing edges
    pub cos_angle: f64,
    /// False for corners inserted at texture boundaries
    pub is_from_source: bool,
}

impl Corner {
    fn source(x: f64, y: f64, bottom: f64, top: f64) -> Self {
        Self {
            lower: Point3::new(x, y, bottom),
            upper: Point3::new(x, y, top),
            roof_uv: Point2::origin(),
            offset_x: 0.0,
            height: top - bottom,
            cos_angle: 1.0,
            is_from_source: true,
        }
    }
}

/// One wall quad between two adjacent corners
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub left: Corner,
    pub right: Corner,
    /// Horizontal width in meters
    pub width_m: f64,
}

/// A closed loop of faces built from one footprint ring
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wall {
    pub faces: Vec<Face>,
}

impl Wall {
    /// Left corners of every face, in ring order
    pub fn corners(&self) -> impl Iterator<Item = &Corner> {
        self.faces.iter().map(|f| &f.left)
    }

    pub fn source_corner_count(&self) -> usize {
        self.corners().filter(|c| c.is_from_source).count()
    }
}

/// Dominant direction of a footprint, taken from its longest edge.
///
/// `rotation` maps the long edge onto the +Y axis. It is only used for
/// texture alignment and aligned bounds; stored coordinates are never
/// rotated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub rotation: Rotation2,
    pub long_edge_midpoint: Point2<f64>,
    /// Unit normal of the long edge pointing into the footprint
    pub long_edge_inside_normal: Vector2<f64>,
}

impl Orientation {
    pub fn from_footprint(footprint: &Footprint) -> Self {
        let Some((a, b)) = footprint.longest_edge() else {
            return Self::default();
        };

        let (p1, p2) = if a.x < b.x { (a, b) } else { (b, a) };
        let r = (p2.x - p1.x).atan2(p2.y - p1.y);

        // (b - a) x (0, 0, -1)
        let edge = Vector3::new(b.x - a.x, b.y - a.y, 0.0);
        let inside = edge.cross(&Vector3::new(0.0, 0.0, -1.0));
        let inside = Vector2::new(inside.x, inside.y);

        Self {
            rotation: Rotation2::from_angle(r),
            long_edge_midpoint: nalgebra::center(&p1, &p2),
            long_edge_inside_normal: inside.try_normalize(1e-12).unwrap_or_else(Vector2::zeros),
        }
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            rotation: Rotation2::identity(),
            long_edge_midpoint: Point2::origin(),
            long_edge_inside_normal: Vector2::zeros(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Elevation {
    pub kind: ElevationKind,
    absolute_height: Option<f64>,
    derived_height: f64,
    height_percentage: Option<f64>,
    num_floors: Option<u32>,
    /// Shrink distance applied to the footprint before extrusion
    pub inset: f64,
    pub xoffset: f64,
    pub yoffset: f64,
    pub color: Color,
    /// Library name of the wall skin, resolved into `skin`
    pub skin_name: Option<String>,
    pub skin: Option<Arc<SkinResource>>,
    pub roof: Option<Roof>,
    pub(crate) parent: Option<ElevationKey>,
    pub(crate) children: Vec<ElevationKey>,

    bottom: f64,
    orientation: Orientation,
    aabb: BoundingBox3,
    walls: Vec<Wall>,
}

impl Default for Elevation {
    fn default() -> Self {
        Self::new()
    }
}

impl Elevation {
    pub fn new() -> Self {
        Self {
            kind: ElevationKind::Standard,
            absolute_height: None,
            derived_height: DEFAULT_HEIGHT,
            height_percentage: None,
            num_floors: None,
            inset: 0.0,
            xoffset: 0.0,
            yoffset: 0.0,
            color: Color::WHITE,
            skin_name: None,
            skin: None,
            roof: None,
            parent: None,
            children: Vec::new(),
            bottom: 0.0,
            orientation: Orientation::default(),
            aabb: BoundingBox3::empty(),
            walls: Vec::new(),
        }
    }

    /// A parapet always carries a flat roof and counts as one floor
    pub fn parapet(width: f64) -> Self {
        Self {
            kind: ElevationKind::Parapet { width },
            num_floors: Some(1),
            roof: Some(Roof::flat()),
            ..Self::new()
        }
    }

    pub fn height(&self) -> f64 {
        self.absolute_height.unwrap_or(self.derived_height)
    }

    /// Apply a building height. Ignored once an absolute height is set;
    /// otherwise scaled by the height percentage.
    pub fn set_height(&mut self, height: f64) {
        if self.absolute_height.is_some() {
            return;
        }
        self.derived_height = match self.height_percentage {
            Some(hp) => height * hp.clamp(0.01, 1.0),
            None => height,
        };
    }

    pub fn set_absolute_height(&mut self, height: f64) {
        self.absolute_height = Some(height);
    }

    pub fn has_absolute_height(&self) -> bool {
        self.absolute_height.is_some()
    }

    /// Fraction of the building height, clamped to [0.01, 1] when applied
    pub fn set_height_percentage(&mut self, fraction: f64) {
        self.height_percentage = Some(fraction);
    }

    pub fn height_percentage(&self) -> f64 {
        self.height_percentage.unwrap_or(1.0).clamp(0.01, 1.0)
    }

    pub fn set_num_floors(&mut self, floors: u32) {
        self.num_floors = Some(floors);
    }

    /// Explicit floor count, or the height divided into default storeys
    pub fn num_floors(&self) -> u32 {
        self.num_floors
            .unwrap_or_else(|| (self.height() / DEFAULT_METERS_PER_FLOOR).round().max(1.0) as u32)
    }

    pub fn parent(&self) -> Option<ElevationKey> {
        self.parent
    }

    pub fn children(&self) -> &[ElevationKey] {
        &self.children
    }

    /// Bottom height recorded by the last build
    pub fn bottom(&self) -> f64 {
        self.bottom
    }

    pub fn top(&self) -> f64 {
        self.bottom + self.height()
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn orientation(&self) -> &Orientation {
        &self.orientation
    }

    /// Bounds of the footprint at roof height, in the long-edge aligned frame
    pub fn aabb(&self) -> &BoundingBox3 {
        &self.aabb
    }

    pub fn rotate(&self, p: &Point3<f64>) -> Point3<f64> {
        self.orientation.rotation.rotate_point(p)
    }

    pub fn unrotate(&self, p: &Point3<f64>) -> Point3<f64> {
        self.orientation.rotation.unrotate_point(p)
    }

    pub fn roof_kind(&self) -> Option<RoofKind> {
        self.roof.as_ref().map(|r| r.kind)
    }

    /// Extrude `footprint` into walls starting at `bottom`.
    ///
    /// The footprint is cleaned first: outer ring counter-clockwise, holes
    /// clockwise, no repeated points. Returns false, leaving no walls, when
    /// the footprint is degenerate or the inset consumes it. Children are
    /// built by the owning building.
    pub fn build(&mut self, footprint: &Footprint, bottom: f64) -> bool {
        self.walls.clear();
        self.aabb = BoundingBox3::empty();
        self.bottom = bottom;

        let mut cleaned = footprint.clone();
        cleaned.clean();
        if cleaned.outer.len() < 2 {
            return false;
        }

        let source = match self.kind {
            ElevationKind::Parapet { width } => parapet_footprint(&cleaned, width),
            ElevationKind::Standard => cleaned,
        };

        let mut working = if self.inset != 0.0 {
            match buffer(&source, -self.inset) {
                Ok(buffered) => buffered,
                Err(e) => {
                    tracing::debug!(inset = self.inset, error = %e, "Discarding footprint, inset failed");
                    return false;
                }
            }
        } else {
            source.clone()
        };

        if !working.is_valid() {
            tracing::debug!("Discarding invalid footprint");
            return false;
        }

        self.orientation = Orientation::from_footprint(&source);
        let rotation = self.orientation.rotation;

        if self.xoffset != 0.0 || self.yoffset != 0.0 {
            let (dx, dy) = rotation.unrotate(self.xoffset, self.yoffset);
            working = working.translated(&Vector2::new(dx, dy));
        }

        let top = self.top();
        for p in &working.outer {
            let (x, y) = rotation.rotate(p.x, p.y);
            self.aabb.expand(&Point3::new(x, y, top));
        }

        let tex_width = self
            .skin
            .as_ref()
            .and_then(|s| s.image_width)
            .filter(|w| *w > 0.0)
            .unwrap_or(0.0);

        let roof_span = self
            .roof
            .as_ref()
            .and_then(|r| r.skin.as_ref())
            .map(|skin| roof_tex_span(skin));

        let bounds = working.bounds();

        for ring in working.rings() {
            if ring.len() < 2 {
                continue;
            }

            let mut corners: Vec<Corner> = ring
                .iter()
                .map(|p| {
                    let mut c = Corner::source(p.x, p.y, bottom, top);
                    if let Some(span) = roof_span {
                        let (xr, yr) = rotation.rotate(p.x - bounds.min_x, p.y - bounds.min_y);
                        c.roof_uv = Point2::new(xr / span.x, yr / span.y);
                    }
                    c
                })
                .collect();

            corners = insert_texture_corners(&corners, tex_width);
            compute_corner_angles(&mut corners);
            self.walls.push(Wall {
                faces: build_faces(&corners),
            });
        }

        if let Some(roof) = &mut self.roof {
            roof.build(&source, &self.orientation);
        }

        true
    }
}

/// Outer ring of `footprint` with its inset by `width` cut out as a hole
fn parapet_footprint(footprint: &Footprint, width: f64) -> Footprint {
    let mut ring = Footprint::new(footprint.outer.clone());
    match buffer(&ring, -width) {
        Ok(inner) => {
            let mut hole = inner.outer;
            rewind_cw(&mut hole);
            ring.add_hole(hole);
        }
        Err(e) => {
            tracing::debug!(width, error = %e, "Parapet inset failed, building solid ring");
        }
    }
    ring
}

fn roof_tex_span(skin: &SkinResource) -> Vector2<f64> {
    let positive = |v: Option<f64>| v.filter(|v| *v > 0.0);
    let x = positive(skin.image_width)
        .or(positive(skin.image_height))
        .unwrap_or(DEFAULT_ROOF_TEX_SPAN);
    let y = positive(skin.image_height)
        .or(positive(skin.image_width))
        .unwrap_or(DEFAULT_ROOF_TEX_SPAN);
    Vector2::new(x, y)
}

/// Record ring offsets and insert a synthetic corner wherever the running
/// offset crosses a multiple of `tex_width`. Boundaries that land on an
/// existing corner produce nothing.
fn insert_texture_corners(source: &[Corner], tex_width: f64) -> Vec<Corner> {
    let n = source.len();
    let mut out = Vec::with_capacity(n);
    let mut offset = 0.0;
    let mut next_boundary = tex_width;

    for i in 0..n {
        let mut this = source[i].clone();
        let next = &source[(i + 1) % n];
        let base = next.lower - this.lower;
        let span = base.norm();

        this.offset_x = offset;
        out.push(this.clone());

        if tex_width > 0.0 && span > 0.0 {
            let base_dir = base / span;
            let roof_vec = next.upper - this.upper;
            let roof_dir = roof_vec.try_normalize(1e-12).unwrap_or(base_dir);

            while next_boundary < offset + span {
                let advance = next_boundary - offset;
                if advance > CORNER_EPSILON && span - advance > CORNER_EPSILON {
                    let t = advance / span;
                    let lower = this.lower + base_dir * advance;
                    let upper = this.upper + roof_dir * advance;
                    out.push(Corner {
                        lower,
                        upper,
                        roof_uv: this.roof_uv + (next.roof_uv - this.roof_uv) * t,
                        offset_x: offset + advance,
                        height: (upper - lower).norm(),
                        cos_angle: 1.0,
                        is_from_source: false,
                    });
                }
                next_boundary += tex_width;
            }
        }

        offset += span;
    }

    out
}

fn compute_corner_angles(corners: &mut [Corner]) {
    let n = corners.len();
    if n < 3 {
        return;
    }
    for i in 0..n {
        let prev = &corners[(i + n - 1) % n].upper;
        let this = &corners[i].upper;
        let next = &corners[(i + 1) % n].upper;
        let incoming = (this - prev).try_normalize(1e-12);
        let outgoing = (next - this).try_normalize(1e-12);
        corners[i].cos_angle = match (incoming, outgoing) {
            (Some(a), Some(b)) => a.dot(&b),
            _ => 1.0,
        };
    }
}

/// Pair each corner with its successor, closing the ring. The closing
/// face measures its right offset from its own span so the wrap-around
/// does not read the first corner's zero offset.
fn build_faces(corners: &[Corner]) -> Vec<Face> {
    let n = corners.len();
    (0..n)
        .map(|i| {
            let left = corners[i].clone();
            let mut right = corners[(i + 1) % n].clone();
            if i + 1 == n {
                right.offset_x = left.offset_x + (right.upper - left.upper).norm();
            }
            let width_m = right.offset_x - left.offset_x;
            Face {
                left,
                right,
                width_m,
            }
        })
        .collect()
}
