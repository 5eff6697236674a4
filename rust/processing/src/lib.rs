// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Skyline Processing
//!
//! Turns vector building footprints into cached, tiled scene graphs.
//!
//! A [`BuildingPager`] serves one tile key at a time:
//!
//! 1. The tile's cache entry is read from a [`CacheBin`]; a hit is returned
//!    right away.
//! 2. The [`FeatureSource`] supplies the features under the tile.
//! 3. The [`BuildingFactory`] turns each feature into [`Building`]s,
//!    optionally clamping them to terrain through a [`TerrainClamper`].
//! 4. The [`BuildingCompiler`] emits walls and roofs into a
//!    [`CompilerOutput`].
//! 5. The output becomes a [`SceneNode`], is written back to the cache and
//!    receives its render-time attachments.
//!
//! Every stage polls a shared [`Progress`]; a canceled tile yields `None`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skyline_processing::{
//!     BuildingCompiler, BuildingFactory, BuildingPager, CompilerSettings, PagerConfig,
//!     Session, TileKey, TilingProfile,
//! };
//! use std::sync::Arc;
//!
//! let config = PagerConfig::from_env();
//! let settings = CompilerSettings::default();
//! let session = Arc::new(Session::default());
//!
//! let mut pager = BuildingPager::new(profile, config.clone());
//! pager.set_feature_source(Arc::new(my_features));
//! pager.set_factory(Arc::new(BuildingFactory::new(session.clone())));
//! pager.set_compiler(Arc::new(BuildingCompiler::new(session, settings.clone())));
//! pager.set_cache_bin(Some(Arc::new(open_cache_bin(&config, &settings)?)));
//!
//! let node = pager.create_node(&TileKey::new(14, 8712, 5741), None);
//! ```
//!
//! [`Building`]: skyline_core::Building

pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod factory;
pub mod output;
pub mod pager;
pub mod progress;
pub mod scene;
pub mod session;
pub mod settings;
pub mod stats;
pub mod terrain;
pub mod tile;

pub use cache::{bin_id_for, CacheBin, CachePolicy, CacheRecord, CacheUsage, DiskCacheBin, MemoryCacheBin};
pub use compiler::BuildingCompiler;
pub use config::PagerConfig;
pub use error::{Error, Result};
pub use factory::BuildingFactory;
pub use output::{CompilerOutput, FeatureIndex};
pub use pager::{open_cache_bin, terrain_clamper, BuildingPager, FeatureIndexFactory, FeatureSource};
pub use progress::Progress;
pub use scene::{Drawable, InstanceGroup, LodBucket, ModelNode, Primitive, SceneNode, TextureRef};
pub use session::{FileModelLoader, InMemoryModelLoader, ModelLoader, ResourceCache, Session};
pub use settings::CompilerSettings;
pub use stats::Analyzer;
pub use terrain::{ElevationSource, GeoHeightField, HeightField, TerrainClamper, TerrainEnvelope};
pub use tile::{crop_contains, CropExtent, TileKey, TilingProfile};
