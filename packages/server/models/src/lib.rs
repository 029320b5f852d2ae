#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the environmental insights server.
//!
//! Parameter names follow what the map client already sends (`dataType`,
//! `air_pollutant`, `HH:MM` hours), so the types here carry raw strings.
//! Validation into domain values happens in the handlers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Month used when a request omits `month`.
pub const DEFAULT_MONTH: &str = "1";
/// Weekday used when a request omits `day`.
pub const DEFAULT_DAY: &str = "Friday";
/// Hour used when a request omits `hour`.
pub const DEFAULT_HOUR: &str = "8";
/// Pollutant used when a request omits `dataType` or `air_pollutant`.
pub const DEFAULT_POLLUTANT: &str = "no2";
/// Feature used when `/feature-vector` omits `dataType`.
pub const DEFAULT_FEATURE: &str = "Bicycle Score";

/// Query parameters shared by the layer endpoints
/// (`/air-pollution-concentrations`, `/feature-vector`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerQueryParams {
    /// Pollutant name or feature column, depending on the endpoint.
    pub data_type: Option<String>,
    /// Month, 1-12.
    pub month: Option<String>,
    /// Full weekday name.
    pub day: Option<String>,
    /// Hour, `8` or `08:00`.
    pub hour: Option<String>,
    /// Quantile label; `mean` when omitted.
    pub quantile: Option<String>,
}

impl LayerQueryParams {
    /// Requested month, or [`DEFAULT_MONTH`].
    #[must_use]
    pub fn month(&self) -> &str {
        self.month.as_deref().unwrap_or(DEFAULT_MONTH)
    }

    /// Requested weekday, or [`DEFAULT_DAY`].
    #[must_use]
    pub fn day(&self) -> &str {
        self.day.as_deref().unwrap_or(DEFAULT_DAY)
    }

    /// Requested hour, or [`DEFAULT_HOUR`].
    #[must_use]
    pub fn hour(&self) -> &str {
        self.hour.as_deref().unwrap_or(DEFAULT_HOUR)
    }
}

/// Query parameters for `/predict` and `/report`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioQueryParams {
    /// Changes as `Feature A:10,Feature B:-5`.
    pub changes: Option<String>,
    /// Pollutant to predict.
    pub air_pollutant: Option<String>,
    /// Month, 1-12.
    pub month: Option<String>,
    /// Full weekday name.
    pub day: Option<String>,
    /// Hour, `8` or `08:00`.
    pub hour: Option<String>,
    /// Quantile label; `mean` when omitted.
    pub quantile: Option<String>,
}

impl ScenarioQueryParams {
    /// Requested pollutant, or [`DEFAULT_POLLUTANT`].
    #[must_use]
    pub fn air_pollutant(&self) -> &str {
        self.air_pollutant.as_deref().unwrap_or(DEFAULT_POLLUTANT)
    }

    /// Requested month, or [`DEFAULT_MONTH`].
    #[must_use]
    pub fn month(&self) -> &str {
        self.month.as_deref().unwrap_or(DEFAULT_MONTH)
    }

    /// Requested weekday, or [`DEFAULT_DAY`].
    #[must_use]
    pub fn day(&self) -> &str {
        self.day.as_deref().unwrap_or(DEFAULT_DAY)
    }

    /// Requested hour, or [`DEFAULT_HOUR`].
    #[must_use]
    pub fn hour(&self) -> &str {
        self.hour.as_deref().unwrap_or(DEFAULT_HOUR)
    }
}

/// Optional JSON body of `POST /predict`, an alternative to the `changes`
/// query parameter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioBody {
    /// Feature name to percentage change.
    #[serde(default)]
    pub changes: BTreeMap<String, f64>,
}

/// Response from `/predict`.
///
/// The collection is embedded as text because that is what the map client
/// parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResponse {
    /// Serialized `GeoJSON` `FeatureCollection`.
    pub updated_geojson: String,
}

/// Response from `/num-tables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesResponse {
    /// Number of tables in the store.
    pub num_tables: usize,
    /// Table names, sorted.
    pub table_names: Vec<String>,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// Error kind name, e.g. `TableNotFound`.
    pub kind: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Number of cells in the loaded grid.
    pub grid_cells: usize,
    /// Version of the feature schema models must match.
    pub feature_schema_version: u32,
}
