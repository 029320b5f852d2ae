//! Default locations of the data files.
//!
//! All paths are relative to the working directory's `data/` directory,
//! where the offline build step writes its outputs.

use std::path::PathBuf;

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Returns the path of the `DuckDB` store.
#[must_use]
pub fn database_path() -> PathBuf {
    data_dir().join("environmental_insights.duckdb")
}

/// Returns the root directory of the model artifacts.
#[must_use]
pub fn models_dir() -> PathBuf {
    data_dir().join("models")
}

/// Returns the path of the grid `GeoJSON` file.
#[must_use]
pub fn grid_path() -> PathBuf {
    data_dir().join("grid.geojson")
}
