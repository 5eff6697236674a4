// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building: a footprint, a reference frame and a tree of elevations.
//!
//! Elevations live in a slotmap arena owned by the building. Parents own
//! their children through key lists; the back-reference to the parent is a
//! plain key, so cloning a building (as the catalog does for templates)
//! copies the whole tree without fixing up pointers.

use crate::elevation::Elevation;
use crate::error::{Error, Result};
use crate::feature::FeatureId;
use crate::keys::ElevationKey;
use crate::resource::ResourceLibrary;
use skyline_geometry::{Footprint, Matrix4};
use slotmap::SlotMap;

#[derive(Debug, Clone)]
pub struct Building {
    pub uid: FeatureId,
    /// Building-local to world transform
    pub reference_frame: Matrix4<f64>,
    /// Applicability range used when selecting catalog templates
    pub min_height: f64,
    pub max_height: f64,
    pub min_area: f64,
    pub max_area: f64,
    pub tags: Vec<String>,
    /// Location of a model that stands in for the whole building
    pub external_model: Option<String>,
    footprint: Option<Footprint>,
    elevations: SlotMap<ElevationKey, Elevation>,
    roots: Vec<ElevationKey>,
}

impl Default for Building {
    fn default() -> Self {
        Self::new()
    }
}

impl Building {
    pub fn new() -> Self {
        Self {
            uid: 0,
            reference_frame: Matrix4::identity(),
            min_height: 0.0,
            max_height: f64::MAX,
            min_area: 0.0,
            max_area: f64::MAX,
            tags: Vec::new(),
            external_model: None,
            footprint: None,
            elevations: SlotMap::with_key(),
            roots: Vec::new(),
        }
    }

    /// Insert an elevation, either at the top level or under `parent`
    pub fn add_elevation(
        &mut self,
        parent: Option<ElevationKey>,
        mut elevation: Elevation,
    ) -> Result<ElevationKey> {
        if let Some(p) = parent {
            if !self.elevations.contains_key(p) {
                return Err(Error::ElevationNotFound(p));
            }
        }
        elevation.parent = parent;
        elevation.children.clear();
        let key = self.elevations.insert(elevation);
        match parent {
            Some(p) => {
                if let Some(parent) = self.elevations.get_mut(p) {
                    parent.children.push(key);
                }
            }
            None => self.roots.push(key),
        }
        Ok(key)
    }

    pub fn elevation(&self, key: ElevationKey) -> Option<&Elevation> {
        self.elevations.get(key)
    }

    pub fn elevation_mut(&mut self, key: ElevationKey) -> Option<&mut Elevation> {
        self.elevations.get_mut(key)
    }

    /// Top-level elevations in insertion order
    pub fn root_elevations(&self) -> &[ElevationKey] {
        &self.roots
    }

    pub fn elevation_count(&self) -> usize {
        self.elevations.len()
    }

    pub fn footprint(&self) -> Option<&Footprint> {
        self.footprint.as_ref()
    }

    pub fn set_footprint(&mut self, footprint: Footprint) {
        self.footprint = Some(footprint);
    }

    pub fn is_external_model(&self) -> bool {
        self.external_model.is_some()
    }

    /// Propagate a building height to every elevation. Each elevation
    /// resolves its own share; children receive the same full height.
    pub fn set_height(&mut self, height: f64) {
        for elevation in self.elevations.values_mut() {
            elevation.set_height(height);
        }
    }

    /// Extrude every elevation from the installed footprint. Children stack
    /// on their parent's top; a parent that fails to build takes its
    /// subtree with it. Returns false only without a valid footprint.
    pub fn build(&mut self) -> bool {
        let Some(footprint) = self.footprint.clone() else {
            return false;
        };
        if !footprint.is_valid() {
            return false;
        }

        let mut stack: Vec<(ElevationKey, f64)> =
            self.roots.iter().rev().map(|k| (*k, 0.0)).collect();

        while let Some((key, bottom)) = stack.pop() {
            let Some(elevation) = self.elevations.get_mut(key) else {
                continue;
            };
            if elevation.build(&footprint, bottom) {
                let top = elevation.top();
                stack.extend(elevation.children.iter().rev().map(|c| (*c, top)));
            } else {
                tracing::debug!(uid = self.uid, "Elevation build failed, skipping its children");
            }
        }
        true
    }

    /// Depth-first, parents before children
    pub fn walk_elevations<F>(&self, mut visit: F)
    where
        F: FnMut(ElevationKey, &Elevation),
    {
        let mut stack: Vec<ElevationKey> = self.roots.iter().rev().copied().collect();
        while let Some(key) = stack.pop() {
            if let Some(elevation) = self.elevations.get(key) {
                visit(key, elevation);
                stack.extend(elevation.children.iter().rev());
            }
        }
    }

    pub fn walk_elevations_mut<F>(&mut self, mut visit: F)
    where
        F: FnMut(ElevationKey, &mut Elevation),
    {
        let mut stack: Vec<ElevationKey> = self.roots.iter().rev().copied().collect();
        while let Some(key) = stack.pop() {
            if let Some(elevation) = self.elevations.get_mut(key) {
                visit(key, elevation);
                stack.extend(elevation.children.iter().rev());
            }
        }
    }

    /// Resolve skin and model names against `library`. Names that are not
    /// found leave the resource unset.
    pub fn resolve_resources(&mut self, library: &ResourceLibrary) {
        self.walk_elevations_mut(|_, elevation| {
            if let Some(name) = &elevation.skin_name {
                elevation.skin = library.skin(name);
                if elevation.skin.is_none() {
                    tracing::debug!(skin = %name, "Wall skin not found in library");
                }
            }
            if let Some(roof) = &mut elevation.roof {
                if let Some(name) = &roof.skin_name {
                    roof.skin = library.skin(name);
                }
                if let Some(name) = &roof.model_name {
                    roof.model = library.model(name);
                    if roof.model.is_none() {
                        tracing::warn!(model = %name, "Roof model not found in library");
                    }
                }
            }
        });
    }
}
