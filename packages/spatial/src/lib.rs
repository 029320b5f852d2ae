#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Grid geometry and spatial joins.
//!
//! The grid is loaded once at startup from a [`GeometrySource`], kept in its
//! native CRS, and joined with per-cell result tables by cell identifier.
//! Output geometry is reprojected and simplified per a
//! [`GeometryPrecision`] and serialized as a `GeoJSON` `FeatureCollection`.

pub mod crs;
pub mod grid;
pub mod join;
pub mod precision;

use std::path::PathBuf;

use env_insights_pollution_models::CellId;
use thiserror::Error;

pub use crs::{Crs, reproject, reproject_point};
pub use grid::{
    GeoJsonFileSource, GeometrySource, Grid, cell_id_from_json, parse_geojson_to_multipolygon,
    parse_grid_collection,
};
pub use join::{JoinReport, JoinedPayload, join, join_and_serialize};
pub use precision::{GeometryPrecision, Tolerance};

/// Errors from loading or serializing grid geometry.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A CRS name is not one of the supported systems.
    #[error("unsupported CRS '{value}' (expected EPSG:4326, EPSG:3395 or EPSG:3857)")]
    UnsupportedCrs {
        /// The rejected value.
        value: String,
    },

    /// Two cells share an identifier.
    #[error("duplicate grid cell '{cell}'")]
    DuplicateCell {
        /// The repeated identifier.
        cell: CellId,
    },

    /// The geometry document is not usable GeoJSON.
    #[error("invalid grid GeoJSON: {message}")]
    InvalidGeoJson {
        /// Description of what went wrong.
        message: String,
    },

    /// One feature of the geometry document is unusable.
    #[error("invalid grid feature #{index}: {message}")]
    InvalidFeature {
        /// Position of the feature in the collection.
        index: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Reading a geometry file failed.
    #[error("failed to read grid file {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the output collection failed.
    #[error("failed to serialize GeoJSON: {0}")]
    Serialize(#[from] serde_json::Error),
}
