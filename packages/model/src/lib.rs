#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Regression models for concentration prediction.
//!
//! Models are static build outputs stored as JSON under
//! `<models_dir>/<dataset scope>/<quantile>/<pollutant>.json`. The
//! [`registry::ModelRegistry`] loads each artifact on first use and keeps
//! it for the life of the process; [`predict::predict`] scores every cell
//! of a feature table.

pub mod artifact;
pub mod predict;
pub mod registry;

use std::path::PathBuf;

use env_insights_pollution_models::{DatasetScope, Pollutant, Quantile};
use thiserror::Error;

pub use artifact::{Model, ModelArtifact, Regressor, Tree, TreeNode};
pub use predict::{PredictionError, predict};
pub use registry::{ModelKey, ModelRegistry};

/// Errors from loading model artifacts.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No artifact exists at the resolved path.
    #[error(
        "no model for pollutant '{pollutant}' (quantile {quantile}, dataset {scope}) at {}",
        path.display()
    )]
    NotFound {
        /// Requested pollutant.
        pollutant: Pollutant,
        /// Requested quantile.
        quantile: Quantile,
        /// Requested dataset scope.
        scope: DatasetScope,
        /// Resolved artifact path.
        path: PathBuf,
    },

    /// The artifact exists but cannot be used.
    #[error("model artifact {} is invalid: {message}", path.display())]
    Corrupt {
        /// Artifact path.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Reading the artifact failed.
    #[error("failed to read model artifact {}: {source}", path.display())]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
