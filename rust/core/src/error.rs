// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the building model.

use crate::keys::ElevationKey;

/// Result type alias for building model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling or building a model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced elevation was not found in the building's arena.
    #[error("elevation not found: {0:?}")]
    ElevationNotFound(ElevationKey),

    /// A footprint could not be used.
    #[error(transparent)]
    Geometry(#[from] skyline_geometry::Error),

    /// A catalog or resource library document is malformed.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// An expression could not be parsed.
    #[error("invalid expression '{0}'")]
    Expression(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
