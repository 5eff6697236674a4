// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building symbology: how feature attributes map to building parameters.

use crate::expression::{NumericExpr, StringExpr};
use serde::{Deserialize, Serialize};

/// Default storey height used to derive floor counts
pub const DEFAULT_METERS_PER_FLOOR: f64 = 3.5;

fn default_meters_per_floor() -> f64 {
    DEFAULT_METERS_PER_FLOOR
}

/// Per-layer building symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingSymbol {
    /// Building height in meters
    #[serde(default)]
    pub height: Option<NumericExpr>,
    /// External model location; a non-empty result replaces parametric geometry
    #[serde(default)]
    pub model: Option<StringExpr>,
    /// Space-separated tags used for template and skin selection
    #[serde(default)]
    pub tags: Option<StringExpr>,
    #[serde(default = "default_meters_per_floor")]
    pub meters_per_floor: f64,
    /// Name of the resource library to draw skins from
    #[serde(default)]
    pub library: Option<String>,
}

impl Default for BuildingSymbol {
    fn default() -> Self {
        Self {
            height: None,
            model: None,
            tags: None,
            meters_per_floor: DEFAULT_METERS_PER_FLOOR,
            library: None,
        }
    }
}

/// Style applied to a building layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingStyle {
    #[serde(default)]
    pub symbol: Option<BuildingSymbol>,
    /// Sample terrain under each footprint and raise buildings to clear it
    #[serde(default)]
    pub clamp_to_terrain: bool,
}
