// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall geometry: one quad per face.

use super::ElevationTarget;
use crate::output::CompilerOutput;
use crate::scene::{Drawable, TextureRef};
use skyline_geometry::{Mesh, Point2, Vector3};

/// Emit the walls of `target.elevation`. Returns false when the elevation
/// has no walls.
pub(crate) fn compile(output: &mut CompilerOutput, target: &ElevationTarget<'_>) -> bool {
    let elevation = target.elevation;
    if elevation.walls().is_empty() {
        return false;
    }

    let skin = elevation.skin.as_deref();
    let tex_width = skin.and_then(|s| s.image_width).filter(|w| *w > 0.0);
    let floors = elevation.num_floors() as f64;

    let face_count: usize = elevation.walls().iter().map(|w| w.faces.len()).sum();
    let mut mesh = Mesh::with_capacity(face_count * 4, face_count * 6);

    for face in elevation.walls().iter().flat_map(|w| &w.faces) {
        let (ll, lr) = (face.left.lower, face.right.lower);
        let (ul, ur) = (face.left.upper, face.right.upper);

        // Outward for counter-clockwise rings
        let Some(normal) = (lr - ll).cross(&Vector3::z()).try_normalize(1e-12) else {
            continue;
        };

        let indices = if skin.is_some() {
            let (u0, u1) = match tex_width {
                Some(w) => (face.left.offset_x / w, (face.left.offset_x + face.width_m) / w),
                None => (0.0, 1.0),
            };
            [
                mesh.add_vertex_uv(ll, normal, Point2::new(u0, 0.0)),
                mesh.add_vertex_uv(lr, normal, Point2::new(u1, 0.0)),
                mesh.add_vertex_uv(ur, normal, Point2::new(u1, floors)),
                mesh.add_vertex_uv(ul, normal, Point2::new(u0, floors)),
            ]
        } else {
            [
                mesh.add_vertex(ll, normal),
                mesh.add_vertex(lr, normal),
                mesh.add_vertex(ur, normal),
                mesh.add_vertex(ul, normal),
            ]
        };

        mesh.add_triangle(indices[0], indices[1], indices[2]);
        mesh.add_triangle(indices[0], indices[2], indices[3]);
    }

    if mesh.is_empty() {
        return false;
    }
    mesh.transform(&target.frame);

    let texture = skin
        .filter(|s| !s.uri.is_empty())
        .map(|s| TextureRef::new(s.uri.clone()));
    output.add_drawable(
        target.tag,
        Drawable::new(mesh, elevation.color.to_array()).with_texture(texture),
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use skyline_core::{Building, Elevation, SkinResource};
    use skyline_geometry::{Footprint, Matrix4};
    use std::sync::Arc;

    fn compiled(skin: Option<SkinResource>) -> CompilerOutput {
        let mut building = Building::new();
        let mut e = Elevation::new();
        e.set_absolute_height(12.0);
        e.skin = skin.map(Arc::new);
        let key = building.add_elevation(None, e).unwrap();
        building.set_footprint(Footprint::rectangle(0.0, 0.0, 10.0, 10.0));
        assert!(building.build());

        let mut out = CompilerOutput::new();
        let target = ElevationTarget {
            building: &building,
            elevation: building.elevation(key).unwrap(),
            frame: Matrix4::identity(),
            tag: "",
        };
        assert!(compile(&mut out, &target));
        out
    }

    #[test]
    fn test_one_quad_per_face() {
        let mut skin = SkinResource::new("facade").with_size(4.0, 3.0);
        skin.uri = "facade.png".into();
        let out = compiled(Some(skin));
        let wall = &out.drawables("")[0];

        // 4 source corners + 8 texture corners
        assert_eq!(wall.mesh.triangle_count(), 24);
        assert!(wall.mesh.has_tex_coords());
        assert_eq!(wall.texture.as_ref().unwrap().uri, "facade.png");

        // every face spans at most one texture repetition
        for quad in wall.mesh.tex_coords.chunks_exact(8) {
            assert!(quad[2] - quad[0] <= 1.0 + 1e-5);
        }
        // 12 m at the default 3.5 m storey rounds to 3 floors
        assert_relative_eq!(wall.mesh.tex_coords[5], 3.0);
    }

    #[test]
    fn test_normals_face_out() {
        let out = compiled(None);
        let wall = &out.drawables("")[0];
        assert_eq!(wall.mesh.triangle_count(), 8);
        assert!(!wall.mesh.has_tex_coords());
        assert!(wall.texture.is_none());

        // first face runs along y = 0, so it faces -y
        assert_relative_eq!(wall.mesh.normals[1], -1.0);
        let b = wall.mesh.bounds();
        assert_relative_eq!(b.max.z, 12.0);
    }
}
