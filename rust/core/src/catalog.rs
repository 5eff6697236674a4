// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building catalog: pre-authored building templates loaded from JSON.
//!
//! ```json
//! {
//!   "buildings": [{
//!     "name": "tower",
//!     "min_height": 30, "max_height": 200,
//!     "elevations": [{
//!       "skin": "facade.glass",
//!       "height_percentage": 80,
//!       "roof": {"type": "flat", "skin": "roof.gravel"},
//!       "elevations": [{"inset": 4, "roof": {"type": "gable"}}]
//!     }]
//!   }]
//! }
//! ```
//!
//! Template selection is seeded with the feature id so a feature gets the
//! same template on every build.

use crate::building::Building;
use crate::context::BuildContext;
use crate::elevation::Elevation;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::keys::ElevationKey;
use crate::random::Prng;
use crate::resource::Color;
use crate::roof::{Roof, RoofKind};
use serde::Deserialize;
use skyline_geometry::transform::translation;
use skyline_geometry::Vector2;

/// Parapet width when a template does not give one
pub const DEFAULT_PARAPET_WIDTH: f64 = 1.0;

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    buildings: Vec<TemplateConfig>,
}

#[derive(Debug, Deserialize)]
struct TemplateConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    min_height: Option<f64>,
    #[serde(default)]
    max_height: Option<f64>,
    #[serde(default)]
    min_area: Option<f64>,
    #[serde(default)]
    max_area: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    elevations: Vec<ElevationConfig>,
}

#[derive(Debug, Deserialize)]
struct ElevationConfig {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
    /// Percent of the building height
    #[serde(default)]
    height_percentage: Option<f64>,
    #[serde(default)]
    inset: Option<f64>,
    #[serde(default)]
    xoffset: f64,
    #[serde(default)]
    yoffset: f64,
    #[serde(default)]
    floors: Option<u32>,
    #[serde(default)]
    skin: Option<String>,
    #[serde(default)]
    color: Option<Color>,
    #[serde(default)]
    roof: Option<RoofConfig>,
    #[serde(default)]
    elevations: Vec<ElevationConfig>,
}

#[derive(Debug, Deserialize)]
struct RoofConfig {
    #[serde(default, rename = "type")]
    kind: RoofKind,
    #[serde(default)]
    skin: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    color: Option<Color>,
}

impl ElevationConfig {
    fn to_elevation(&self) -> Result<Elevation> {
        let mut elevation = match self.kind.as_deref() {
            None | Some("") | Some("elevation") => Elevation::new(),
            Some("parapet") => Elevation::parapet(self.width.unwrap_or(DEFAULT_PARAPET_WIDTH)),
            Some(other) => {
                return Err(Error::Catalog(format!("unknown elevation type '{other}'")));
            }
        };

        if let Some(hp) = self.height_percentage {
            elevation.set_height_percentage(hp * 0.01);
        }
        if let Some(h) = self.height {
            elevation.set_absolute_height(h);
        }
        if let Some(inset) = self.inset {
            elevation.inset = inset;
        }
        elevation.xoffset = self.xoffset;
        elevation.yoffset = self.yoffset;
        if let Some(floors) = self.floors {
            elevation.set_num_floors(floors);
        }
        if let Some(color) = self.color {
            elevation.color = color;
        }
        elevation.skin_name = self.skin.clone();

        if let Some(rc) = &self.roof {
            let mut roof = Roof::new(rc.kind);
            roof.skin_name = rc.skin.clone();
            roof.model_name = rc.model.clone();
            roof.color = rc.color;
            elevation.roof = Some(roof);
        }
        Ok(elevation)
    }
}

fn add_elevations(
    building: &mut Building,
    parent: Option<ElevationKey>,
    configs: &[ElevationConfig],
) -> Result<()> {
    for config in configs {
        let key = building.add_elevation(parent, config.to_elevation()?)?;
        add_elevations(building, Some(key), &config.elevations)?;
    }
    Ok(())
}

/// A named template with its applicability ranges
#[derive(Debug, Clone)]
pub struct BuildingTemplate {
    pub name: String,
    pub building: Building,
}

impl BuildingTemplate {
    fn accepts(&self, height: f64, area: f64, tags: &[String]) -> bool {
        let b = &self.building;
        let tags_ok = b.tags.is_empty() || tags.is_empty() || tags.iter().any(|t| b.tags.contains(t));
        (b.min_height..=b.max_height).contains(&height)
            && (b.min_area..=b.max_area).contains(&area)
            && tags_ok
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildingCatalog {
    templates: Vec<BuildingTemplate>,
}

impl BuildingCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        let mut templates = Vec::with_capacity(doc.buildings.len());

        for (i, config) in doc.buildings.iter().enumerate() {
            if config.elevations.is_empty() {
                continue;
            }
            let mut building = Building::new();
            building.min_height = config.min_height.unwrap_or(0.0);
            building.max_height = config.max_height.unwrap_or(f64::MAX);
            building.min_area = config.min_area.unwrap_or(0.0);
            building.max_area = config.max_area.unwrap_or(f64::MAX);
            building.tags = config.tags.clone();
            add_elevations(&mut building, None, &config.elevations)?;

            templates.push(BuildingTemplate {
                name: config.name.clone().unwrap_or_else(|| format!("building-{i}")),
                building,
            });
        }

        tracing::info!(count = templates.len(), "Read building templates");
        Ok(Self { templates })
    }

    pub fn add_template(&mut self, template: BuildingTemplate) {
        self.templates.push(template);
    }

    pub fn templates(&self) -> &[BuildingTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Pick a template index for a feature. Candidates are the templates
    /// whose ranges accept `height` and `area`; when none do, every template
    /// is a candidate.
    pub fn select_template(&self, seed: u64, height: f64, area: f64, tags: &[String]) -> Option<usize> {
        if self.templates.is_empty() {
            return None;
        }
        let mut candidates: Vec<usize> = self
            .templates
            .iter()
            .enumerate()
            .filter(|(_, t)| t.accepts(height, area, tags))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            candidates = (0..self.templates.len()).collect();
        }
        let mut prng = Prng::new(seed);
        Some(candidates[prng.next_index(candidates.len())])
    }

    /// Create one building per polygon part of `feature`.
    ///
    /// Each building's frame is centered on the feature bounds at the
    /// terrain minimum, and its footprint is expressed in that frame.
    pub fn create_buildings(
        &self,
        feature: &Feature,
        tags: &[String],
        height: f64,
        context: &BuildContext,
    ) -> Vec<Building> {
        let mut output = Vec::new();
        let Some(parts) = feature.geometry.polygons() else {
            tracing::warn!(fid = feature.id, "Feature is not a polygon, skipping");
            return output;
        };

        let center = feature.centroid();
        let frame = translation(center.x, center.y, context.terrain_min());
        let to_local = Vector2::new(-center.x, -center.y);

        for part in parts {
            if !part.is_valid() {
                tracing::warn!(fid = feature.id, "Polygon part is invalid, skipping");
                continue;
            }

            let mut footprint = part.translated(&to_local);
            footprint.clean();

            let Some(index) = self.select_template(context.seed, height, footprint.area(), tags) else {
                return output;
            };

            let mut building = self.templates[index].building.clone();
            building.uid = feature.id;
            building.reference_frame = frame;
            if let Some(library) = &context.resources {
                building.resolve_resources(library);
            }
            building.set_height(height);
            building.set_footprint(footprint);

            if building.build() {
                output.push(building);
            } else {
                tracing::warn!(fid = feature.id, "Building build failed");
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::ElevationKind;
    use crate::feature::FeatureGeometry;
    use approx::assert_relative_eq;
    use skyline_geometry::Footprint;

    const CATALOG: &str = r#"{
        "buildings": [
            {
                "name": "low",
                "max_height": 20,
                "elevations": [{"skin": "brick", "roof": {"type": "gable"}}]
            },
            {
                "name": "tower",
                "min_height": 20,
                "elevations": [{
                    "height_percentage": 80,
                    "roof": {"type": "flat", "skin": "gravel"},
                    "elevations": [{"type": "parapet", "width": 0.5, "height": 1.5}]
                }]
            },
            {"name": "empty", "elevations": []}
        ]
    }"#;

    #[test]
    fn test_load_templates() {
        let catalog = BuildingCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);

        let tower = &catalog.templates()[1].building;
        assert_eq!(tower.elevation_count(), 2);
        let mut kinds = Vec::new();
        tower.walk_elevations(|_, e| kinds.push((e.kind, e.height_percentage())));
        assert_eq!(kinds[0].0, ElevationKind::Standard);
        assert_relative_eq!(kinds[0].1, 0.8);
        assert_eq!(kinds[1].0, ElevationKind::Parapet { width: 0.5 });
    }

    #[test]
    fn test_unknown_elevation_type() {
        let json = r#"{"buildings": [{"elevations": [{"type": "dome"}]}]}"#;
        assert!(matches!(BuildingCatalog::from_json(json), Err(Error::Catalog(_))));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let mut catalog = BuildingCatalog::default();
        for i in 0..8 {
            let mut building = Building::new();
            building.add_elevation(None, Elevation::new()).unwrap();
            catalog.add_template(BuildingTemplate {
                name: format!("t{i}"),
                building,
            });
        }
        for fid in [1u64, 42, 7_000_000_001] {
            let a = catalog.select_template(fid, 15.0, 100.0, &[]);
            let b = catalog.select_template(fid, 15.0, 100.0, &[]);
            assert!(a.is_some());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_selection_respects_ranges() {
        let catalog = BuildingCatalog::from_json(CATALOG).unwrap();
        for fid in 0..20 {
            assert_eq!(catalog.select_template(fid, 10.0, 100.0, &[]), Some(0));
            assert_eq!(catalog.select_template(fid, 60.0, 100.0, &[]), Some(1));
        }
    }

    #[test]
    fn test_create_buildings_in_local_frame() {
        let catalog = BuildingCatalog::from_json(CATALOG).unwrap();
        let feature = Feature::new(
            9,
            FeatureGeometry::Polygon(Footprint::rectangle(100.0, 200.0, 120.0, 210.0)),
        );
        let mut context = BuildContext::new(9);
        context.set_terrain_min_max(5.0, 8.0);

        let buildings = catalog.create_buildings(&feature, &[], 40.0, &context);
        assert_eq!(buildings.len(), 1);

        let b = &buildings[0];
        assert_eq!(b.uid, 9);
        let fp = b.footprint().unwrap();
        assert_relative_eq!(fp.bounds().center().x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(b.reference_frame[(0, 3)], 110.0);
        assert_relative_eq!(b.reference_frame[(2, 3)], 5.0);

        let mut tops = Vec::new();
        b.walk_elevations(|_, e| tops.push(e.top()));
        assert_relative_eq!(tops[0], 32.0);
        assert_relative_eq!(tops[1], 33.5);
    }

    #[test]
    fn test_point_feature_yields_nothing() {
        let catalog = BuildingCatalog::from_json(CATALOG).unwrap();
        let feature = Feature::new(1, FeatureGeometry::Point(skyline_geometry::Point2::new(0.0, 0.0)));
        assert!(catalog
            .create_buildings(&feature, &[], 10.0, &BuildContext::new(1))
            .is_empty());
    }
}
