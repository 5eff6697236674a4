// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compiler settings: LOD bins and roof generation parameters.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Scales the visible range of drawables or instances carrying `tag`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    #[serde(default)]
    pub tag: String,
    #[serde(default = "default_lod_scale")]
    pub lod_scale: f64,
}

fn default_lod_scale() -> f64 {
    1.0
}

fn default_gable_max_radius() -> Option<f64> {
    Some(20.0)
}

fn default_ridge_height() -> f64 {
    2.0
}

fn default_max_merged_vertices() -> usize {
    250_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerSettings {
    #[serde(default)]
    pub bins: Vec<Bin>,
    /// Gable roofs are only built on elevations with a smaller bounding
    /// radius; larger ones get a flat roof. `None` removes the limit.
    #[serde(default = "default_gable_max_radius")]
    pub gable_max_radius: Option<f64>,
    #[serde(default = "default_ridge_height")]
    pub gable_ridge_height: f64,
    #[serde(default)]
    pub gable_chimney: bool,
    /// Vertex budget for one merged batch
    #[serde(default = "default_max_merged_vertices")]
    pub max_merged_vertices: usize,
    /// Emit roof model box outlines into the debug group
    #[serde(default)]
    pub debug: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            bins: Vec::new(),
            gable_max_radius: default_gable_max_radius(),
            gable_ridge_height: default_ridge_height(),
            gable_chimney: false,
            max_merged_vertices: default_max_merged_vertices(),
            debug: false,
        }
    }
}

impl CompilerSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn add_bin(&mut self, tag: impl Into<String>, lod_scale: f64) -> &mut Bin {
        self.bins.push(Bin {
            tag: tag.into(),
            lod_scale,
        });
        let last = self.bins.len() - 1;
        &mut self.bins[last]
    }

    /// First bin whose tag equals `tag`
    pub fn bin(&self, tag: &str) -> Option<&Bin> {
        self.bins.iter().find(|b| b.tag == tag)
    }

    /// First bin whose tag is in `tags`
    pub fn bin_for_tags<S: AsRef<str>>(&self, tags: &[S]) -> Option<&Bin> {
        self.bins
            .iter()
            .find(|b| tags.iter().any(|t| t.as_ref() == b.tag))
    }
}
