// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Skyline Geometry
//!
//! Planar footprint handling and mesh primitives for procedural buildings:
//! ring cleaning, mitred buffering (i_overlay), tessellation (earcutr with
//! an ear-clipping fallback) and nalgebra-based transforms.

pub mod bounds;
pub mod buffer;
pub mod error;
pub mod footprint;
pub mod mesh;
pub mod transform;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point2, Point3, Vector2, Vector3};

pub use bounds::{BoundingBox3, Bounds2};
pub use buffer::buffer;
pub use error::{Error, Result};
pub use footprint::{signed_area, Footprint, Segment};
pub use mesh::Mesh;
pub use transform::Rotation2;
pub use triangulation::{tessellate, triangle_normal, Tessellation};
