// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for tile processing.
//!
//! These stay inside the pipeline: the pager, factory and compiler entry
//! points log them and report failure through their return values.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] skyline_core::Error),

    #[error(transparent)]
    Geometry(#[from] skyline_geometry::Error),

    #[error("Model resource '{0}' could not be loaded")]
    ModelLoad(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<cacache::Error> for Error {
    fn from(err: cacache::Error) -> Self {
        Error::Cache(err.to_string())
    }
}
