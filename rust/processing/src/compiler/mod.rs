// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building compiler: turns built [`Building`]s into tile geometry.
//!
//! Walls and roofs are generated in each building's local frame and moved
//! into the tile frame with one combined matrix per building
//! (`world_to_local * reference_frame`), so no vertex ever passes through
//! global coordinates.

mod elevation;
mod flat_roof;
mod gable_roof;
mod instanced_roof;

use crate::output::CompilerOutput;
use crate::progress::{is_canceled, Progress};
use crate::session::Session;
use crate::settings::CompilerSettings;
use skyline_core::{Building, Elevation, RoofKind};
use skyline_geometry::Matrix4;
use std::sync::Arc;

/// One elevation being compiled, with everything its builders need
pub(crate) struct ElevationTarget<'a> {
    pub building: &'a Building,
    pub elevation: &'a Elevation,
    /// Building frame followed by the tile's world-to-local transform
    pub frame: Matrix4<f64>,
    /// Output bucket for the generated drawables
    pub tag: &'a str,
}

pub struct BuildingCompiler {
    session: Arc<Session>,
    settings: CompilerSettings,
}

impl BuildingCompiler {
    pub fn new(session: Arc<Session>, settings: CompilerSettings) -> Self {
        Self { session, settings }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Compile `buildings` into `output`. The first building's frame
    /// becomes the tile frame. Returns false when canceled; geometry added
    /// before the cancellation was observed stays in `output`.
    pub fn compile(
        &self,
        buildings: &[Building],
        output: &mut CompilerOutput,
        progress: Option<&Progress>,
    ) -> bool {
        let local_to_world = buildings
            .first()
            .map(|b| b.reference_frame)
            .unwrap_or_else(Matrix4::identity);
        output.set_local_to_world(local_to_world);
        let world_to_local = *output.world_to_local();

        for building in buildings {
            if is_canceled(progress) {
                if let Some(p) = progress {
                    p.set_message("in BuildingCompiler::compile");
                }
                output.set_current_feature(None);
                return false;
            }

            output.set_current_feature(Some(building.uid));
            let frame = world_to_local * building.reference_frame;

            if let Some(uri) = &building.external_model {
                output.add_external_model(uri.clone(), frame);
            } else {
                self.add_elevations(output, building, &frame);
            }
        }

        output.set_current_feature(None);
        true
    }

    fn add_elevations(&self, output: &mut CompilerOutput, building: &Building, frame: &Matrix4<f64>) {
        let tag = building.tags.first().map(String::as_str).unwrap_or("");

        building.walk_elevations(|_, elevation| {
            let target = ElevationTarget {
                building,
                elevation,
                frame: *frame,
                tag,
            };
            elevation::compile(output, &target);
            if elevation.roof.is_some() {
                self.add_roof(output, &target);
            }
        });
    }

    fn add_roof(&self, output: &mut CompilerOutput, target: &ElevationTarget<'_>) -> bool {
        let Some(kind) = target.elevation.roof_kind() else {
            return false;
        };
        match kind {
            RoofKind::Gable if self.gable_allowed(target.elevation) => {
                gable_roof::compile(output, target, &self.settings)
            }
            RoofKind::Custom => instanced_roof::compile_custom(output, target, &self.session),
            RoofKind::Instanced => instanced_roof::compile(output, target, &self.session),
            RoofKind::Flat | RoofKind::Gable => {
                flat_roof::compile(output, target, &self.session, &self.settings)
            }
        }
    }

    /// Gable roofs are limited to elevations under the configured radius
    fn gable_allowed(&self, elevation: &Elevation) -> bool {
        let aabb = elevation.aabb();
        aabb.is_valid()
            && self
                .settings
                .gable_max_radius
                .map_or(true, |max| aabb.radius() < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Primitive;
    use skyline_core::{Elevation, Roof};
    use skyline_geometry::transform::translation;
    use skyline_geometry::Footprint;

    fn building(uid: u64, x: f64, roof: RoofKind, size: f64) -> Building {
        let mut b = Building::new();
        b.uid = uid;
        b.reference_frame = translation(x, 0.0, 0.0);
        let mut e = Elevation::new();
        e.set_absolute_height(9.0);
        e.roof = Some(Roof::new(roof));
        b.add_elevation(None, e).unwrap();
        b.set_footprint(Footprint::rectangle(-size, -size, size, size));
        assert!(b.build());
        b
    }

    fn compiler() -> BuildingCompiler {
        BuildingCompiler::new(Arc::new(Session::default()), CompilerSettings::default())
    }

    #[test]
    fn test_tile_frame_from_first_building() {
        let buildings = vec![
            building(1, 100.0, RoofKind::Flat, 5.0),
            building(2, 130.0, RoofKind::Flat, 5.0),
        ];
        let mut out = CompilerOutput::new();
        assert!(compiler().compile(&buildings, &mut out, None));
        assert_eq!(*out.local_to_world(), translation(100.0, 0.0, 0.0));

        // walls + roof per building
        assert_eq!(out.drawables("").len(), 4);
        let second_roof = &out.drawables("")[3];
        let bounds = second_roof.mesh.bounds();
        assert!((bounds.min.x - 25.0).abs() < 1e-4);
        assert_eq!(second_roof.user_data, Some(2));
    }

    #[test]
    fn test_external_model_building() {
        let mut b = Building::new();
        b.reference_frame = translation(5.0, 5.0, 0.0);
        b.external_model = Some("tower.glb".into());

        let mut out = CompilerOutput::new();
        assert!(compiler().compile(&[b], &mut out, None));
        assert_eq!(out.external_count(), 1);
        assert_eq!(out.drawable_count(), 0);
    }

    #[test]
    fn test_gable_radius_threshold() {
        let small = building(1, 0.0, RoofKind::Gable, 5.0);
        let large = building(2, 0.0, RoofKind::Gable, 30.0);

        let mut out = CompilerOutput::new();
        compiler().compile(&[small], &mut out, None);
        // gable roof: 6 triangles, 18 unshared vertices
        assert_eq!(out.drawables("")[1].mesh.triangle_count(), 6);

        let mut out = CompilerOutput::new();
        compiler().compile(&[large.clone()], &mut out, None);
        assert_eq!(out.drawables("")[1].mesh.triangle_count(), 2);

        let mut settings = CompilerSettings::default();
        settings.gable_max_radius = None;
        let unlimited = BuildingCompiler::new(Arc::new(Session::default()), settings);
        let mut out = CompilerOutput::new();
        unlimited.compile(&[large], &mut out, None);
        assert_eq!(out.drawables("")[1].mesh.triangle_count(), 6);
        assert_eq!(out.drawables("")[1].primitive, Primitive::Triangles);
    }

    #[test]
    fn test_canceled_compile_adds_nothing() {
        let progress = Progress::new();
        progress.cancel();
        let mut out = CompilerOutput::new();
        let buildings = vec![building(1, 0.0, RoofKind::Flat, 5.0)];
        assert!(!compiler().compile(&buildings, &mut out, Some(&progress)));
        assert!(out.is_empty());
        assert_eq!(progress.message(), "in BuildingCompiler::compile");
    }

    #[test]
    fn test_tags_pick_bucket() {
        let mut b = building(1, 0.0, RoofKind::Flat, 5.0);
        b.tags = vec!["commercial".into(), "tall".into()];
        let mut out = CompilerOutput::new();
        compiler().compile(&[b], &mut out, None);
        assert_eq!(out.drawables("commercial").len(), 2);
        assert!(out.drawables("").is_empty());
    }
}
