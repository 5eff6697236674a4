// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Art resources referenced by buildings: wall/roof skins and prop models.
//!
//! A [`ResourceLibrary`] is loaded once (typically from JSON) and shared
//! behind `Arc`. Elevations and roofs hold `Arc` handles to the resources
//! they resolved, so cloning a building template never copies art metadata.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Linear RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const GRAY: Color = Color::new(0.5, 0.5, 0.5, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Scale the RGB channels, leaving alpha alone
    pub fn brightness(&self, factor: f32) -> Self {
        Self::new(
            (self.r * factor).min(1.0),
            (self.g * factor).min(1.0),
            (self.b * factor).min(1.0),
            self.a,
        )
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// A texture applied to walls or roofs, with its real-world size in meters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinResource {
    pub name: String,
    /// Image location, resolved by the session's loader
    #[serde(default)]
    pub uri: String,
    /// Width in meters covered by one repetition of the image
    #[serde(default)]
    pub image_width: Option<f64>,
    /// Height in meters covered by one repetition of the image
    #[serde(default)]
    pub image_height: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SkinResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: String::new(),
            image_width: None,
            image_height: None,
            tags: Vec::new(),
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.image_width = Some(width);
        self.image_height = Some(height);
        self
    }
}

/// A 3D model placed as an instance (roof props, external buildings)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResource {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ModelResource {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uri: name.clone(),
            name,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LibraryDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    skins: Vec<SkinResource>,
    #[serde(default)]
    models: Vec<ModelResource>,
}

/// Named collection of skins and models
#[derive(Debug, Clone, Default)]
pub struct ResourceLibrary {
    name: String,
    skins: FxHashMap<String, Arc<SkinResource>>,
    models: FxHashMap<String, Arc<ModelResource>>,
}

impl ResourceLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a library from its JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: LibraryDocument = serde_json::from_str(json)?;
        let mut lib = Self::new(doc.name);
        for skin in doc.skins {
            if skin.name.is_empty() {
                return Err(Error::Catalog("skin without a name".to_string()));
            }
            lib.add_skin(skin);
        }
        for model in doc.models {
            if model.name.is_empty() {
                return Err(Error::Catalog("model without a name".to_string()));
            }
            lib.add_model(model);
        }
        Ok(lib)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_skin(&mut self, skin: SkinResource) {
        self.skins.insert(skin.name.clone(), Arc::new(skin));
    }

    pub fn add_model(&mut self, model: ModelResource) {
        self.models.insert(model.name.clone(), Arc::new(model));
    }

    pub fn skin(&self, name: &str) -> Option<Arc<SkinResource>> {
        self.skins.get(name).cloned()
    }

    pub fn model(&self, name: &str) -> Option<Arc<ModelResource>> {
        self.models.get(name).cloned()
    }

    pub fn skin_count(&self) -> usize {
        self.skins.len()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_from_json() {
        let lib = ResourceLibrary::from_json(
            r#"{
                "name": "default",
                "skins": [
                    {"name": "facade.commercial.1", "uri": "facade.png", "image_width": 4.0, "image_height": 3.5},
                    {"name": "roof.commercial.1"}
                ],
                "models": [{"name": "hvac", "uri": "hvac.glb"}]
            }"#,
        )
        .unwrap();

        assert_eq!(lib.name(), "default");
        assert_eq!(lib.skin_count(), 2);
        let facade = lib.skin("facade.commercial.1").unwrap();
        assert_eq!(facade.image_width, Some(4.0));
        assert!(lib.skin("roof.commercial.1").unwrap().image_height.is_none());
        assert_eq!(lib.model("hvac").unwrap().uri, "hvac.glb");
        assert!(lib.model("missing").is_none());
    }

    #[test]
    fn test_library_rejects_unnamed_skin() {
        assert!(ResourceLibrary::from_json(r#"{"skins": [{"name": ""}]}"#).is_err());
    }

    #[test]
    fn test_brightness_clamps() {
        let c = Color::GRAY.brightness(1.3);
        assert!((c.r - 0.65).abs() < 1e-6);
        assert_eq!(Color::WHITE.brightness(2.0), Color::WHITE);
    }
}
