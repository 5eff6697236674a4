// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Roofs made of a single model: either placed as-is on top of the
//! elevation (`Instanced`) or stretched to cover it (`Custom`).

use super::ElevationTarget;
use crate::output::CompilerOutput;
use crate::scene::ModelNode;
use crate::session::Session;
use skyline_core::{Elevation, ModelResource};
use skyline_geometry::transform::{scaling, translation};
use skyline_geometry::{BoundingBox3, Matrix4, Point3};
use std::sync::Arc;

/// Place the roof model unscaled at the center of the elevation top
pub(crate) fn compile(output: &mut CompilerOutput, target: &ElevationTarget<'_>, session: &Session) -> bool {
    let Some((model, node)) = resolve(target.elevation, session) else {
        return false;
    };
    let bounds = node.bounds();
    if !bounds.is_valid() {
        return false;
    }

    let matrix = top_center(target) * translation(0.0, 0.0, -bounds.min.z);
    output.add_instance(&model, matrix);
    true
}

/// Stretch the roof model over the elevation's aligned bounds
pub(crate) fn compile_custom(
    output: &mut CompilerOutput,
    target: &ElevationTarget<'_>,
    session: &Session,
) -> bool {
    let Some((model, node)) = resolve(target.elevation, session) else {
        return false;
    };
    let bounds = node.bounds();
    let aabb = target.elevation.aabb();
    let Some((sx, sy)) = fit_scale(&bounds, aabb) else {
        tracing::debug!(model = %model.name, "Degenerate custom roof model");
        return false;
    };

    let center = bounds.center();
    let matrix = top_center(target)
        * scaling(sx, sy, 1.0)
        * translation(-center.x, -center.y, -bounds.min.z);
    output.add_instance(&model, matrix);
    true
}

fn resolve(elevation: &Elevation, session: &Session) -> Option<(Arc<ModelResource>, Arc<ModelNode>)> {
    let model = elevation.roof.as_ref()?.model.clone()?;
    let node = session
        .resource_cache()
        .get_or_create_instance_node(&model, session.loader());
    if node.is_none() {
        tracing::warn!(model = %model.name, "Roof model set, but couldn't find model");
    }
    Some((model, node?))
}

/// Frame placing the aligned origin at the center of the elevation top
fn top_center(target: &ElevationTarget<'_>) -> Matrix4<f64> {
    let elevation = target.elevation;
    let aabb = elevation.aabb();
    let c = aabb.center();
    let p = elevation.unrotate(&Point3::new(c.x, c.y, elevation.top()));
    let rotation = elevation.orientation().rotation;
    target.frame * translation(p.x, p.y, p.z) * rotation.to_unrotate_matrix()
}

fn fit_scale(model: &BoundingBox3, aabb: &BoundingBox3) -> Option<(f64, f64)> {
    if !model.is_valid() || !aabb.is_valid() {
        return None;
    }
    let (mw, mh) = (model.x_span(), model.y_span());
    if mw <= f64::EPSILON || mh <= f64::EPSILON {
        return None;
    }
    Some((aabb.x_span() / mw, aabb.y_span() / mh))
}
