// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flat roofs: the tessellated roof outline plus an optional prop model
//! placed inside the roof's model box.

use super::ElevationTarget;
use crate::output::CompilerOutput;
use crate::scene::{Drawable, TextureRef};
use crate::session::Session;
use crate::settings::CompilerSettings;
use skyline_core::{Color, Prng, Roof};
use skyline_geometry::transform::translation;
use skyline_geometry::{tessellate, Bounds2, Mesh, Point2, Point3, Vector3};

/// Height of the debug outline above the roof
const DEBUG_OUTLINE_LIFT: f64 = 0.25;

/// One ring of the roof outline
struct RoofLoop {
    points: Vec<Point3<f64>>,
    uvs: Vec<Point2<f64>>,
}

pub(crate) fn compile(
    output: &mut CompilerOutput,
    target: &ElevationTarget<'_>,
    session: &Session,
    settings: &CompilerSettings,
) -> bool {
    let elevation = target.elevation;
    let Some(roof) = elevation.roof.as_ref() else {
        return false;
    };
    if elevation.walls().is_empty() {
        return false;
    }

    // Synthetic corners are collinear, so only source corners make the outline
    let mut roof_z = 0.0;
    let loops: Vec<RoofLoop> = elevation
        .walls()
        .iter()
        .map(|wall| {
            let mut ring = RoofLoop {
                points: Vec::with_capacity(wall.faces.len()),
                uvs: Vec::with_capacity(wall.faces.len()),
            };
            for corner in wall.corners().filter(|c| c.is_from_source) {
                ring.points.push(corner.upper);
                ring.uvs.push(corner.roof_uv);
                roof_z = corner.upper.z;
            }
            ring
        })
        .filter(|ring| ring.points.len() >= 3)
        .collect();

    if let Some(mut mesh) = tessellate_loops(&loops, roof.skin.is_some()) {
        mesh.transform(&target.frame);
        let texture = roof
            .skin
            .as_deref()
            .filter(|s| !s.uri.is_empty())
            .map(|s| TextureRef::new(s.uri.clone()));
        let color = roof.color.unwrap_or(Color::WHITE).to_array();
        output.add_drawable(target.tag, Drawable::new(mesh, color).with_texture(texture));
    }

    place_model(output, target, roof, roof_z, session, settings);
    true
}

/// Tessellate the roof loops, the first being the outer ring. Returns
/// `None` when no triangles could be produced.
fn tessellate_loops(loops: &[RoofLoop], with_uvs: bool) -> Option<Mesh> {
    let (outer, holes) = loops.split_first()?;
    let outer_2d: Vec<Point2<f64>> = outer.points.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let holes_2d: Vec<Vec<Point2<f64>>> = holes
        .iter()
        .map(|h| h.points.iter().map(|p| Point2::new(p.x, p.y)).collect())
        .collect();

    let tess = match tessellate(&outer_2d, &holes_2d) {
        Ok(tess) => tess,
        Err(e) => {
            tracing::debug!(error = %e, "Roof tessellation failed, omitting roof cap");
            return None;
        }
    };
    if tess.used_fallback {
        tracing::debug!("Falling back on ear clipping for roof");
    }

    let points: Vec<&Point3<f64>> = loops.iter().flat_map(|l| &l.points).collect();
    let uvs: Vec<&Point2<f64>> = loops.iter().flat_map(|l| &l.uvs).collect();

    let up = Vector3::z();
    let mut mesh = Mesh::with_capacity(points.len(), tess.indices.len());
    for (p, uv) in points.iter().zip(&uvs) {
        if with_uvs {
            mesh.add_vertex_uv(**p, up, **uv);
        } else {
            mesh.add_vertex(**p, up);
        }
    }

    for tri in tess.indices.chunks_exact(3) {
        let (a, b, c) = (tri[0], tri[1], tri[2]);
        let (pa, pb, pc) = (points[a], points[b], points[c]);
        let cross = (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x);
        // Keep every triangle facing up
        if cross >= 0.0 {
            mesh.add_triangle(a as u32, b as u32, c as u32);
        } else {
            mesh.add_triangle(a as u32, c as u32, b as u32);
        }
    }

    (mesh.triangle_count() > 0).then_some(mesh)
}

/// Place the roof's prop model at a seeded offset inside the model box
fn place_model(
    output: &mut CompilerOutput,
    target: &ElevationTarget<'_>,
    roof: &Roof,
    roof_z: f64,
    session: &Session,
    settings: &CompilerSettings,
) {
    let (Some(model), Some(model_box)) = (roof.model.as_ref(), roof.model_box()) else {
        return;
    };

    let Some(node) = session
        .resource_cache()
        .get_or_create_instance_node(model, session.loader())
    else {
        tracing::warn!(model = %model.name, "Model resource set, but couldn't find model");
        return;
    };

    let model_bounds = node.bounds();
    if !model_bounds.is_valid() {
        return;
    }

    let rotation = target.elevation.orientation().rotation;
    let mut space = Bounds2::empty();
    for corner in model_box {
        let (x, y) = rotation.rotate(corner.x, corner.y);
        space.expand(x, y);
    }

    let model_width = model_bounds.x_span();
    let model_height = model_bounds.y_span();

    if model_width < space.width() && model_height < space.height() {
        let mut prng = Prng::new(target.building.uid);
        // The first two draws are reserved
        prng.next();
        prng.next();

        let max_offset_x = space.width() - model_width;
        let max_offset_y = space.height() - model_height;
        let dx = prng.next() * max_offset_x - 0.5 * max_offset_x;
        let dy = prng.next() * max_offset_y - 0.5 * max_offset_y;

        let center = space.center();
        let (px, py) = rotation.unrotate(center.x + dx, center.y + dy);
        let pz = roof_z - model_bounds.min.z;

        let matrix = target.frame * translation(px, py, pz) * rotation.to_unrotate_matrix();
        output.add_instance(model, matrix);
    }

    if settings.debug {
        let mut outline = Mesh::with_capacity(4, 0);
        for corner in model_box {
            outline.add_vertex(
                Point3::new(corner.x, corner.y, roof_z + DEBUG_OUTLINE_LIFT),
                Vector3::z(),
            );
        }
        outline.transform(&target.frame);
        output.add_debug(Drawable::new(outline, [1.0, 0.0, 0.0, 1.0]).line_loop());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ModelNode, Primitive};
    use crate::session::InMemoryModelLoader;
    use skyline_core::{Building, Elevation, ModelResource, SkinResource};
    use skyline_geometry::{Footprint, Matrix4};
    use std::sync::Arc;

    fn building(footprint: Footprint, roof: Roof, skin_width: Option<f64>) -> Building {
        let mut b = Building::new();
        b.uid = 42;
        let mut e = Elevation::new();
        e.set_absolute_height(12.0);
        e.skin = skin_width.map(|w| Arc::new(SkinResource::new("facade").with_size(w, 3.0)));
        e.roof = Some(roof);
        b.add_elevation(None, e).unwrap();
        b.set_footprint(footprint);
        assert!(b.build());
        b
    }

    fn compile_first(b: &Building, session: &Session, settings: &CompilerSettings) -> CompilerOutput {
        let key = b.root_elevations()[0];
        let target = ElevationTarget {
            building: b,
            elevation: b.elevation(key).unwrap(),
            frame: Matrix4::identity(),
            tag: "",
        };
        let mut out = CompilerOutput::new();
        assert!(compile(&mut out, &target, session, settings));
        out
    }

    fn model_session(size: f64) -> (Session, Arc<ModelResource>) {
        let mut mesh = Mesh::new();
        let up = Vector3::z();
        let a = mesh.add_vertex(Point3::new(-size, -size, -1.0), up);
        let b = mesh.add_vertex(Point3::new(size, -size, 1.0), up);
        let c = mesh.add_vertex(Point3::new(size, size, 1.0), up);
        mesh.add_triangle(a, b, c);

        let loader = InMemoryModelLoader::new();
        loader.insert("hvac", ModelNode::new("hvac", vec![Drawable::new(mesh, [1.0; 4])]));
        (Session::new(Arc::new(loader)), Arc::new(ModelResource::new("hvac")))
    }

    #[test]
    fn test_square_roof_ignores_texture_corners() {
        let b = building(Footprint::rectangle(0.0, 0.0, 10.0, 10.0), Roof::flat(), Some(4.0));
        let out = compile_first(&b, &Session::default(), &CompilerSettings::default());

        let elevation = b.elevation(b.root_elevations()[0]).unwrap();
        assert_eq!(elevation.walls()[0].faces.len(), 12);
        assert_eq!(elevation.walls()[0].source_corner_count(), 4);

        let roof = &out.drawables("")[0];
        assert_eq!(roof.mesh.triangle_count(), 2);
        assert_eq!(roof.mesh.vertex_count(), 4);
        assert!(roof.mesh.normals.chunks_exact(3).all(|n| n[2] == 1.0));
    }

    #[test]
    fn test_courtyard_roof() {
        let mut footprint = Footprint::rectangle(0.0, 0.0, 30.0, 30.0);
        footprint.add_hole(vec![
            Point2::new(10.0, 10.0),
            Point2::new(10.0, 20.0),
            Point2::new(20.0, 20.0),
            Point2::new(20.0, 10.0),
        ]);
        let b = building(footprint, Roof::flat(), None);
        let out = compile_first(&b, &Session::default(), &CompilerSettings::default());

        let roof = &out.drawables("")[0];
        assert_eq!(roof.mesh.vertex_count(), 8);
        assert_eq!(roof.mesh.triangle_count(), 8);
    }

    #[test]
    fn test_roof_uvs_follow_skin() {
        let mut roof = Roof::flat();
        roof.skin = Some(Arc::new(SkinResource::new("gravel").with_size(5.0, 5.0)));
        roof.color = Some(Color::GRAY);
        let b = building(Footprint::rectangle(0.0, 0.0, 10.0, 10.0), roof, None);
        let out = compile_first(&b, &Session::default(), &CompilerSettings::default());

        let drawable = &out.drawables("")[0];
        assert!(drawable.mesh.has_tex_coords());
        // skin has no uri, so nothing to bind
        assert!(drawable.texture.is_none());
        assert_eq!(drawable.color, Color::GRAY.to_array());
    }

    #[test]
    fn test_model_placement_is_deterministic() {
        let (session, model) = model_session(1.0);
        let mut roof = Roof::flat();
        roof.model = Some(model);
        let b = building(Footprint::rectangle(-20.0, -10.0, 20.0, 10.0), roof, None);

        let mut settings = CompilerSettings::default();
        settings.debug = true;
        let first = compile_first(&b, &session, &settings);
        let second = compile_first(&b, &session, &settings);
        assert_eq!(first.instance_count(), 1);
        assert_eq!(first.debug_count(), 1);

        let a = first.create_scene_graph(&session, &settings, None);
        let c = second.create_scene_graph(&session, &settings, None);
        assert_eq!(a.instances[0].matrices, c.instances[0].matrices);
        assert_eq!(a.debug[0].primitive, Primitive::LineLoop);

        // model base sits on the roof
        let m = a.instances[0].matrices[0];
        assert!((m[(2, 3)] - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_model_too_large_is_skipped() {
        let (session, model) = model_session(50.0);
        let mut roof = Roof::flat();
        roof.model = Some(model);
        let b = building(Footprint::rectangle(-20.0, -10.0, 20.0, 10.0), roof, None);
        let out = compile_first(&b, &session, &CompilerSettings::default());
        assert_eq!(out.instance_count(), 0);
        assert_eq!(out.debug_count(), 0);
    }
}
