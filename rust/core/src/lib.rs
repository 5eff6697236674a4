// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Skyline Core
//!
//! Procedural building model: a [`Building`] owns a footprint, a reference
//! frame and a tree of [`Elevation`]s. Building an elevation extrudes each
//! footprint ring into a [`Wall`] of [`Face`]s, inserting extra corners at
//! texture boundaries, and fits the roof's model box.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skyline_core::{Building, Elevation, Roof};
//! use skyline_geometry::Footprint;
//!
//! let mut building = Building::new();
//! let mut base = Elevation::new();
//! base.roof = Some(Roof::flat());
//! let key = building.add_elevation(None, base)?;
//! building.add_elevation(Some(key), Elevation::parapet(1.0))?;
//!
//! building.set_height(24.0);
//! building.set_footprint(Footprint::rectangle(-10.0, -6.0, 10.0, 6.0));
//! assert!(building.build());
//! ```
//!
//! Buildings are produced from features either by cloning a
//! [`BuildingCatalog`] template or ad hoc by the factory in
//! `skyline-processing`. Template choice and roof prop placement are seeded
//! with the feature id through [`Prng`], so builds are reproducible.

pub mod building;
pub mod catalog;
pub mod context;
pub mod elevation;
pub mod error;
pub mod expression;
pub mod feature;
pub mod keys;
pub mod random;
pub mod resource;
pub mod roof;
pub mod symbol;

pub use building::Building;
pub use catalog::{BuildingCatalog, BuildingTemplate};
pub use context::BuildContext;
pub use elevation::{Corner, Elevation, ElevationKind, Face, Orientation, Wall};
pub use error::{Error, Result};
pub use expression::{NumericExpr, StringExpr};
pub use feature::{AttributeValue, Attributes, Feature, FeatureGeometry, FeatureId};
pub use keys::ElevationKey;
pub use random::Prng;
pub use resource::{Color, ModelResource, ResourceLibrary, SkinResource};
pub use roof::{Roof, RoofKind};
pub use symbol::{BuildingStyle, BuildingSymbol};
