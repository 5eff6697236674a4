// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-feature build parameters handed from the factory to the catalog.

use crate::resource::ResourceLibrary;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// PRNG seed, normally the feature id
    pub seed: u64,
    terrain_min: f64,
    terrain_max: f64,
    /// Library used to resolve skin and model names
    pub resources: Option<Arc<ResourceLibrary>>,
}

impl BuildContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Record the terrain range under the footprint; zero when unknown
    pub fn set_terrain_min_max(&mut self, min: f64, max: f64) {
        self.terrain_min = min;
        self.terrain_max = max;
    }

    pub fn terrain_min(&self) -> f64 {
        self.terrain_min
    }

    pub fn terrain_max(&self) -> f64 {
        self.terrain_max
    }
}
