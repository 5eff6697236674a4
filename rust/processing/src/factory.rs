// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building factory: features in, built [`Building`]s out.
//!
//! For each feature the factory resolves the building symbol against the
//! feature's attributes, keeps only features whose centroid lies in the
//! crop extent (so a feature straddling tiles is built once), optionally
//! samples the terrain beneath the footprint, and then either asks the
//! catalog for templated buildings or synthesizes a simple one.

use crate::progress::{is_canceled, Progress};
use crate::session::Session;
use crate::config::PagerConfig;
use crate::pager::terrain_clamper;
use crate::terrain::{ElevationSource, TerrainClamper};
use crate::tile::CropExtent;
use skyline_core::{
    BuildContext, Building, BuildingCatalog, BuildingStyle, BuildingSymbol, Color, Elevation, Feature,
    ResourceLibrary, Roof,
};
use skyline_core::symbol::DEFAULT_METERS_PER_FLOOR;
use skyline_geometry::transform::translation;
use skyline_geometry::Vector2;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Height of an ad hoc building when the symbol has no height expression
pub const DEFAULT_BUILDING_HEIGHT: f64 = 15.0;

/// Catalog buildings are raised at least this much above the highest
/// terrain under the footprint
const MIN_CLEARANCE: f64 = 3.0;

/// Terrain level sampled when no configuration says otherwise
pub const DEFAULT_CLAMP_LOD: u32 = 12;

const DEFAULT_WALL_SKIN: &str = "facade.commercial.1";
const DEFAULT_ROOF_SKIN: &str = "roof.commercial.1";

const PARAPET_WIDTH: f64 = 2.0;
const PARAPET_HEIGHT: f64 = 2.0;

/// Resolved symbology for one feature
#[derive(Debug, Default)]
struct Resolved {
    external_model: Option<String>,
    height: f64,
    tags: Vec<String>,
}

#[derive(Debug, Default)]
struct Timers {
    xform: Duration,
    clamp: Duration,
    symbol: Duration,
    create: Duration,
}

pub struct BuildingFactory {
    session: Arc<Session>,
    catalog: Option<Arc<BuildingCatalog>>,
    clamper: Option<Arc<TerrainClamper>>,
    clamp_lod: u32,
}

impl BuildingFactory {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            catalog: None,
            clamper: None,
            clamp_lod: DEFAULT_CLAMP_LOD,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<BuildingCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Terrain used when a style asks for clamping, sampled at `lod`
    pub fn with_clamper(mut self, clamper: Arc<TerrainClamper>, lod: u32) -> Self {
        self.clamper = Some(clamper);
        self.clamp_lod = lod;
        self
    }

    /// Clamp against `source` with the cache size, fetch timeout and
    /// sampling level from `config`
    pub fn with_terrain(self, source: Arc<dyn ElevationSource>, config: &PagerConfig) -> Self {
        let clamper = Arc::new(terrain_clamper(source, config));
        self.with_clamper(clamper, config.clamp_lod)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn clamper(&self) -> Option<&Arc<TerrainClamper>> {
        self.clamper.as_ref()
    }

    /// Terrain level sampled under footprints
    pub fn clamp_lod(&self) -> u32 {
        self.clamp_lod
    }

    pub fn catalog(&self) -> Option<&Arc<BuildingCatalog>> {
        self.catalog.as_ref()
    }

    /// Create buildings for `features`, appending them to `output`.
    ///
    /// Returns false if canceled; buildings pushed before that stay in
    /// `output` and the caller is expected to discard them.
    pub fn create(
        &self,
        features: &[Feature],
        crop_to: Option<&CropExtent>,
        style: Option<&BuildingStyle>,
        output: &mut Vec<Building>,
        progress: Option<&Progress>,
    ) -> bool {
        let symbol = style.and_then(|s| s.symbol.as_ref());
        let clamp = style.is_some_and(|s| s.clamp_to_terrain);
        let library = symbol
            .and_then(|s| s.library.as_deref())
            .and_then(|name| self.session.library(name))
            .or_else(|| self.session.default_library());

        let mut timers = Timers::default();

        for feature in features {
            if is_canceled(progress) {
                if let Some(p) = progress {
                    p.set_message("in BuildingFactory::create");
                }
                return false;
            }

            let started = Instant::now();
            let resolved = resolve_symbol(feature, symbol);
            timers.symbol += started.elapsed();

            if resolved.height <= 0.0 && resolved.external_model.is_none() {
                continue;
            }

            let started = Instant::now();
            // Collinear points would skew the longest edge used for orientation
            let mut feature = feature.clone();
            for part in feature.geometry.polygons_mut() {
                part.remove_collinear_points();
            }
            let centroid = feature.centroid();
            timers.xform += started.elapsed();
            if crop_to.is_some_and(|crop| !crop.contains(&centroid)) {
                continue;
            }

            let started = Instant::now();
            let mut context = BuildContext::new(feature.id);
            let extrema = if clamp { self.terrain_min_max(&feature) } else { None };
            let valid = extrema.is_some();
            let (min, max) = extrema.unwrap_or((0.0, 0.0));
            context.set_terrain_min_max(min, max);
            timers.clamp += started.elapsed();

            let started = Instant::now();
            if let Some(uri) = resolved.external_model {
                if let Some(building) = external_model_building(&feature, uri, &context) {
                    output.push(building);
                }
            } else if let Some(catalog) = &self.catalog {
                let clearance = if valid {
                    context.terrain_max() - context.terrain_min() + MIN_CLEARANCE
                } else {
                    MIN_CLEARANCE
                };
                let height = resolved.height.max(clearance);
                context.resources = library.clone();
                output.extend(catalog.create_buildings(&feature, &resolved.tags, height, &context));
            } else {
                output.extend(sample_buildings(
                    &feature,
                    resolved.height,
                    symbol,
                    library.as_deref(),
                    &context,
                ));
            }
            timers.create += started.elapsed();
        }

        if let Some(p) = progress {
            p.set_stat("factory.xform", timers.xform.as_secs_f64());
            p.set_stat("factory.clamp", timers.clamp.as_secs_f64());
            p.set_stat("factory.symbol", timers.symbol.as_secs_f64());
            p.set_stat("factory.create", timers.create.as_secs_f64());
        }
        true
    }

    fn terrain_min_max(&self, feature: &Feature) -> Option<(f64, f64)> {
        let clamper = self.clamper.as_ref()?;
        let envelope = clamper.create_envelope(&feature.geometry.bounds(), self.clamp_lod);
        envelope.elevation_extrema(feature)
    }
}

/// Evaluate model, height and tags. Height is only evaluated without a
/// model, and tags only for a positive height.
fn resolve_symbol(feature: &Feature, symbol: Option<&BuildingSymbol>) -> Resolved {
    let mut resolved = Resolved {
        height: DEFAULT_BUILDING_HEIGHT,
        ..Default::default()
    };
    let Some(symbol) = symbol else {
        return resolved;
    };

    if let Some(expr) = &symbol.model {
        let uri = expr.eval(&feature.attributes);
        if !uri.is_empty() {
            resolved.external_model = Some(uri);
            return resolved;
        }
    }

    if let Some(expr) = &symbol.height {
        resolved.height = expr.eval(&feature.attributes);
    }
    if resolved.height > 0.0 {
        if let Some(expr) = &symbol.tags {
            resolved.tags = expr
                .eval(&feature.attributes)
                .split(' ')
                .map(|t| t.trim_matches('"'))
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
    }
    resolved
}

/// A building that is only a placed model, clamped to the terrain minimum
fn external_model_building(feature: &Feature, uri: String, context: &BuildContext) -> Option<Building> {
    if !feature.geometry.bounds().is_valid() {
        return None;
    }
    let center = feature.centroid();
    let mut building = Building::new();
    building.uid = feature.id;
    building.external_model = Some(uri);
    building.reference_frame = translation(center.x, center.y, context.terrain_min());
    Some(building)
}

/// One default building per valid polygon part: a single flat-roofed
/// elevation with a parapet, skinned from the default library.
fn sample_buildings(
    feature: &Feature,
    height: f64,
    symbol: Option<&BuildingSymbol>,
    library: Option<&ResourceLibrary>,
    context: &BuildContext,
) -> Vec<Building> {
    let Some(parts) = feature.geometry.polygons() else {
        tracing::warn!(fid = feature.id, "Feature is not a polygon, skipping");
        return Vec::new();
    };

    let center = feature.centroid();
    let frame = translation(center.x, center.y, context.terrain_min());
    let to_local = Vector2::new(-center.x, -center.y);

    let mut output = Vec::new();
    for part in parts {
        if !part.is_valid() {
            tracing::warn!(fid = feature.id, "Polygon part is invalid, skipping");
            continue;
        }
        let mut building = sample_building(feature, height, symbol, library);
        building.reference_frame = frame;

        let mut footprint = part.translated(&to_local);
        footprint.clean();
        building.set_footprint(footprint);

        if building.build() {
            output.push(building);
        } else {
            tracing::debug!(fid = feature.id, "Invalid footprint, discarding building");
        }
    }
    output
}

fn sample_building(
    feature: &Feature,
    height: f64,
    symbol: Option<&BuildingSymbol>,
    library: Option<&ResourceLibrary>,
) -> Building {
    let mut building = Building::new();
    building.uid = feature.id;

    let wall_skin = library.and_then(|l| l.skin(DEFAULT_WALL_SKIN));
    let roof_skin = library.and_then(|l| l.skin(DEFAULT_ROOF_SKIN));

    let floor_height = wall_skin
        .as_ref()
        .and_then(|s| s.image_height)
        .filter(|h| *h > 0.0)
        .unwrap_or_else(|| symbol.map_or(DEFAULT_METERS_PER_FLOOR, |s| s.meters_per_floor));
    let floors = (height / floor_height).round().max(1.0) as u32;

    let mut elevation = Elevation::new();
    elevation.set_absolute_height(height);
    elevation.set_num_floors(floors);
    elevation.skin = wall_skin;
    let mut roof = Roof::flat();
    roof.skin = roof_skin.clone();
    elevation.roof = Some(roof);

    let mut parapet = Elevation::parapet(PARAPET_WIDTH);
    parapet.set_absolute_height(PARAPET_HEIGHT);
    parapet.set_num_floors(1);
    parapet.color = Color::GRAY.brightness(1.3);
    let mut parapet_roof = Roof::flat();
    parapet_roof.skin = roof_skin;
    parapet_roof.color = Some(Color::GRAY.brightness(1.2));
    parapet.roof = Some(parapet_roof);

    // Both adds only fail for an unknown parent, which cannot happen here
    if let Ok(key) = building.add_elevation(None, elevation) {
        let _ = building.add_elevation(Some(key), parapet);
    }
    building
}
