// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gable roofs fitted to the elevation's long-edge aligned bounds.
//!
//! The ridge runs across the aligned box at the midpoints of its lower and
//! upper edges, raised by the configured ridge height. Corners are moved
//! into the tile frame before normals are taken.

use super::ElevationTarget;
use crate::output::CompilerOutput;
use crate::scene::{Drawable, TextureRef};
use crate::settings::CompilerSettings;
use skyline_core::{Color, Elevation};
use skyline_geometry::{triangle_normal, Matrix4, Mesh, Point2, Point3, Vector3};

/// Chimney footprint as a fraction of the ridge length
const CHIMNEY_SIZE_FACTOR: f64 = 0.08;
/// Height of the chimney top above the ridge
const CHIMNEY_RISE: f64 = 1.0;

pub(crate) fn compile(
    output: &mut CompilerOutput,
    target: &ElevationTarget<'_>,
    settings: &CompilerSettings,
) -> bool {
    let elevation = target.elevation;
    let Some(roof) = elevation.roof.as_ref() else {
        return false;
    };
    let aabb = elevation.aabb();
    if elevation.walls().is_empty() || !aabb.is_valid() {
        return false;
    }

    let z = aabb.min.z;
    let corner = |x: f64, y: f64| elevation.unrotate(&Point3::new(x, y, z));
    let ll = corner(aabb.min.x, aabb.min.y);
    let lr = corner(aabb.max.x, aabb.min.y);
    let ul = corner(aabb.min.x, aabb.max.y);
    let ur = corner(aabb.max.x, aabb.max.y);

    let ridge = Vector3::new(0.0, 0.0, settings.gable_ridge_height);
    let lm = nalgebra::center(&ll, &lr) + ridge;
    let um = nalgebra::center(&ul, &ur) + ridge;

    let frame = &target.frame;
    let [ll, lr, ul, ur, lm, um] = [ll, lr, ul, ur, lm, um].map(|p| frame.transform_point(&p));

    let tex_ll = Point2::new(0.0, 0.0);
    let tex_lm = Point2::new(0.5, 0.0);
    let tex_lr = Point2::new(1.0, 0.0);
    let tex_ul = Point2::new(0.0, 1.0);
    let tex_um = Point2::new(0.5, 1.0);
    let tex_ur = Point2::new(1.0, 1.0);

    let with_uvs = roof.skin.is_some();
    let mut mesh = Mesh::with_capacity(18, 18);
    let mut add = |vertices: &[(Point3<f64>, Point2<f64>)], n: Vector3<f64>| {
        for tri in vertices.chunks_exact(3) {
            let idx: Vec<u32> = tri
                .iter()
                .map(|(p, uv)| {
                    if with_uvs {
                        mesh.add_vertex_uv(*p, n, *uv)
                    } else {
                        mesh.add_vertex(*p, n)
                    }
                })
                .collect();
            mesh.add_triangle(idx[0], idx[1], idx[2]);
        }
    };

    add(
        &[
            (ll, tex_ll), (lm, tex_lm), (ul, tex_ul),
            (ul, tex_ul), (lm, tex_lm), (um, tex_um),
        ],
        triangle_normal(&ll, &lm, &ul),
    );
    add(
        &[
            (lr, tex_lr), (ur, tex_ur), (lm, tex_lm),
            (lm, tex_lm), (ur, tex_ur), (um, tex_um),
        ],
        triangle_normal(&lr, &ur, &lm),
    );
    add(
        &[(ul, tex_ul), (um, tex_um), (ur, tex_ur)],
        triangle_normal(&ul, &um, &ur),
    );
    add(
        &[(ll, tex_ll), (lr, tex_lr), (lm, tex_lm)],
        triangle_normal(&lr, &lm, &ll),
    );

    let texture = roof
        .skin
        .as_deref()
        .filter(|s| !s.uri.is_empty())
        .map(|s| TextureRef::new(s.uri.clone()));
    let color = roof.color.unwrap_or(Color::WHITE).to_array();
    output.add_drawable(target.tag, Drawable::new(mesh, color).with_texture(texture));

    if settings.gable_chimney {
        let chimney = chimney(elevation, settings.gable_ridge_height, frame);
        output.add_drawable(target.tag, Drawable::new(chimney, Color::GRAY.to_array()));
    }
    true
}

/// Box standing on the ridge a third of the way along it
fn chimney(elevation: &Elevation, ridge_height: f64, frame: &Matrix4<f64>) -> Mesh {
    let aabb = elevation.aabb();
    let ridge_x = 0.5 * (aabb.min.x + aabb.max.x);
    let ridge_len = aabb.y_span();
    let half = 0.5 * (CHIMNEY_SIZE_FACTOR * ridge_len).clamp(0.5, 1.5);
    let cy = aabb.min.y + ridge_len / 3.0;

    let z0 = aabb.min.z + 0.5 * ridge_height;
    let z1 = aabb.min.z + ridge_height + CHIMNEY_RISE;

    let at = |x: f64, y: f64, z: f64| frame.transform_point(&elevation.unrotate(&Point3::new(x, y, z)));
    let (x0, x1, y0, y1) = (ridge_x - half, ridge_x + half, cy - half, cy + half);
    let bottom = [at(x0, y0, z0), at(x1, y0, z0), at(x1, y1, z0), at(x0, y1, z0)];
    let top = [at(x0, y0, z1), at(x1, y0, z1), at(x1, y1, z1), at(x0, y1, z1)];

    let mut mesh = Mesh::with_capacity(20, 30);
    let mut quad = |a: Point3<f64>, b: Point3<f64>, c: Point3<f64>, d: Point3<f64>| {
        let n = triangle_normal(&a, &b, &c);
        let i = [
            mesh.add_vertex(a, n),
            mesh.add_vertex(b, n),
            mesh.add_vertex(c, n),
            mesh.add_vertex(d, n),
        ];
        mesh.add_triangle(i[0], i[1], i[2]);
        mesh.add_triangle(i[0], i[2], i[3]);
    };
    for k in 0..4 {
        let next = (k + 1) % 4;
        quad(bottom[k], bottom[next], top[next], top[k]);
    }
    quad(top[0], top[1], top[2], top[3]);
    mesh
}
