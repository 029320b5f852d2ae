#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read-only access to the environmental insights `DuckDB` store.
//!
//! The store holds one feature vector table and one concentration table per
//! (month, weekday, hour) bucket, keyed by `"Grid ID"`, plus an optional
//! `grids` table with each cell's `GeoJSON` geometry as TEXT. Tables are
//! produced offline; this crate never writes.

pub mod grid;
pub mod paths;
pub mod pool;
pub mod store;

use env_insights_spatial::SpatialError;

pub use grid::GridTableSource;
pub use pool::DuckDbPool;
pub use store::Store;

/// Errors that can occur while reading the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No table exists for the requested time bucket.
    #[error("no data for time bucket {bucket} (table {table} does not exist)")]
    TableNotFound {
        /// Bucket key, e.g. `Month_1_Day_Monday_Hour_8`.
        bucket: String,
        /// Table that was looked up.
        table: String,
    },

    /// A required column is absent from a table.
    #[error("table {table} has no column '{column}'")]
    ColumnNotFound {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A row has no cell identifier.
    #[error("table {table} has a row without a Grid ID")]
    MissingCellId {
        /// Table name.
        table: String,
    },

    /// A cell identifier appears in more than one row.
    #[error("table {table} has more than one row for Grid ID {cell}")]
    DuplicateCellId {
        /// Table name.
        table: String,
        /// The repeated identifier.
        cell: String,
    },

    /// A grid row has unusable geometry.
    #[error("grid cell {cell} has invalid geometry")]
    InvalidGeometry {
        /// Cell identifier.
        cell: String,
    },

    /// Building the grid failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Quotes an identifier for interpolation into SQL.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("Grid ID"), "\"Grid ID\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
