#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pollutant, time bucket, and store naming types for environmental insights.
//!
//! Everything that selects a table, a column, or a model artifact is built
//! from the validated types in this crate. Caller-supplied strings are
//! parsed into these types at the edge and never interpolated raw into a
//! query or a filesystem path.

pub mod table;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub use table::{CellTable, ColumnValues, NamedColumn, TableShapeError};

/// Name of the cell identifier column shared by every store table.
pub const GRID_ID_COLUMN: &str = "Grid ID";

/// Errors produced when a request parameter is outside its enumerated
/// domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidParameterError {
    /// Month was not an integer in 1-12.
    #[error("invalid month '{value}': expected 1-12")]
    Month {
        /// The rejected input.
        value: String,
    },
    /// Weekday was not a full English day name.
    #[error("invalid day '{value}': expected a weekday name such as 'Friday'")]
    Weekday {
        /// The rejected input.
        value: String,
    },
    /// Hour was not an integer in 0-23 (optionally written `HH:MM`).
    #[error("invalid hour '{value}': expected 0-23 or HH:MM")]
    Hour {
        /// The rejected input.
        value: String,
    },
    /// Pollutant name is not one the service knows about.
    #[error("unknown pollutant '{value}'")]
    Pollutant {
        /// The rejected input.
        value: String,
    },
    /// Quantile label was neither `mean` nor a probability in (0, 1).
    #[error("invalid quantile '{value}': expected 'mean' or a value between 0 and 1")]
    Quantile {
        /// The rejected input.
        value: String,
    },
    /// Dataset scope contained characters outside `[A-Za-z0-9_-]`.
    #[error("invalid dataset scope '{value}'")]
    DatasetScope {
        /// The rejected input.
        value: String,
    },
}

/// Air pollutants for which the store holds predictions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Pollutant {
    /// Nitrogen dioxide.
    #[serde(rename = "no2")]
    #[strum(serialize = "no2")]
    No2,
    /// Ozone.
    #[serde(rename = "o3")]
    #[strum(serialize = "o3")]
    O3,
    /// Particulate matter below 10 micrometres.
    #[serde(rename = "pm10")]
    #[strum(serialize = "pm10")]
    Pm10,
    /// Particulate matter below 2.5 micrometres.
    #[serde(rename = "pm2.5")]
    #[strum(serialize = "pm2.5")]
    Pm25,
    /// Sulphur dioxide.
    #[serde(rename = "so2")]
    #[strum(serialize = "so2")]
    So2,
    /// Nitrogen oxides. Predicted, but not part of the daily index.
    #[serde(rename = "nox")]
    #[strum(serialize = "nox")]
    Nox,
}

impl Pollutant {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::No2,
            Self::O3,
            Self::Pm10,
            Self::Pm25,
            Self::So2,
            Self::Nox,
        ]
    }

    /// Parses a pollutant name, mapping failures to
    /// [`InvalidParameterError::Pollutant`].
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a known pollutant.
    pub fn parse(value: &str) -> Result<Self, InvalidParameterError> {
        value
            .trim()
            .parse()
            .map_err(|_| InvalidParameterError::Pollutant {
                value: value.to_string(),
            })
    }
}

/// Days of the week, as used in store table names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Weekday {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl Weekday {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Monday,
            Self::Tuesday,
            Self::Wednesday,
            Self::Thursday,
            Self::Friday,
            Self::Saturday,
            Self::Sunday,
        ]
    }
}

/// A (month, weekday, hour) key selecting one precomputed table slice.
///
/// Fields are private so that every bucket in circulation has passed
/// validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    month: u8,
    weekday: Weekday,
    hour: u8,
}

impl TimeBucket {
    /// Creates a bucket from already-typed components.
    ///
    /// # Errors
    ///
    /// Returns an error if `month` is outside 1-12 or `hour` outside 0-23.
    pub fn new(month: u8, weekday: Weekday, hour: u8) -> Result<Self, InvalidParameterError> {
        if !(1..=12).contains(&month) {
            return Err(InvalidParameterError::Month {
                value: month.to_string(),
            });
        }
        if hour > 23 {
            return Err(InvalidParameterError::Hour {
                value: hour.to_string(),
            });
        }
        Ok(Self {
            month,
            weekday,
            hour,
        })
    }

    /// Parses a bucket from raw request parameters.
    ///
    /// The hour may be given as `"8"` or `"08:00"`; only the part before
    /// the first `:` is used.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first parameter that is out of range.
    pub fn parse(month: &str, day: &str, hour: &str) -> Result<Self, InvalidParameterError> {
        let month_value: u8 =
            month
                .trim()
                .parse()
                .map_err(|_| InvalidParameterError::Month {
                    value: month.to_string(),
                })?;

        let weekday: Weekday = day
            .trim()
            .parse()
            .map_err(|_| InvalidParameterError::Weekday {
                value: day.to_string(),
            })?;

        let hour_part = hour.trim().split(':').next().unwrap_or_default();
        let hour_value: u8 = hour_part
            .parse()
            .map_err(|_| InvalidParameterError::Hour {
                value: hour.to_string(),
            })?;

        Self::new(month_value, weekday, hour_value).map_err(|e| match e {
            InvalidParameterError::Month { .. } => InvalidParameterError::Month {
                value: month.to_string(),
            },
            _ => InvalidParameterError::Hour {
                value: hour.to_string(),
            },
        })
    }

    /// Month of the year, 1-12.
    #[must_use]
    pub const fn month(&self) -> u8 {
        self.month
    }

    /// Day of the week.
    #[must_use]
    pub const fn weekday(&self) -> Weekday {
        self.weekday
    }

    /// Hour of the day, 0-23.
    #[must_use]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Returns the store key fragment, e.g. `Month_1_Day_Friday_Hour_8`.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "Month_{}_Day_{}_Hour_{}",
            self.month, self.weekday, self.hour
        )
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// The kinds of time-sliced table held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TableKind {
    /// Model input features per cell.
    FeatureVector,
    /// Precomputed model output per cell.
    AirPollutionConcentration,
}

impl TableKind {
    /// Table name prefix, including the trailing underscore.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::FeatureVector => "feature_vector_",
            Self::AirPollutionConcentration => "air_pollution_concentration_",
        }
    }

    /// Derives the table name for this kind and a validated bucket.
    #[must_use]
    pub fn table_name(self, bucket: &TimeBucket) -> String {
        format!("{}{}", self.prefix(), bucket.key())
    }
}

/// The quantile (or `mean`) a model was trained to predict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantile(String);

impl Quantile {
    /// The `mean` label used by the baseline concentration tables.
    #[must_use]
    pub fn mean() -> Self {
        Self("mean".to_string())
    }

    /// Label as it appears in column names and artifact paths.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Quantile {
    fn default() -> Self {
        Self::mean()
    }
}

impl FromStr for Quantile {
    type Err = InvalidParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.eq_ignore_ascii_case("mean") {
            return Ok(Self::mean());
        }

        let is_decimal = !value.is_empty()
            && value.chars().all(|c| c.is_ascii_digit() || c == '.')
            && value.matches('.').count() <= 1;
        let in_range = value
            .parse::<f64>()
            .is_ok_and(|q| q > 0.0 && q < 1.0);

        if is_decimal && in_range {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidParameterError::Quantile {
                value: s.to_string(),
            })
        }
    }
}

impl fmt::Display for Quantile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The training dataset a model belongs to (e.g. `all`, `transport`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DatasetScope(String);

impl DatasetScope {
    /// Label as it appears in artifact paths.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DatasetScope {
    fn default() -> Self {
        Self("all".to_string())
    }
}

impl FromStr for DatasetScope {
    type Err = InvalidParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= 64
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidParameterError::DatasetScope {
                value: s.to_string(),
            })
        }
    }
}

impl fmt::Display for DatasetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    /// Creates an identifier from its textual form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CellId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Column holding a model prediction, e.g. `no2 Prediction mean`.
#[must_use]
pub fn prediction_column(pollutant: Pollutant, quantile: &Quantile) -> String {
    format!("{pollutant} Prediction {quantile}")
}

/// Column holding the daily index value (1-10), e.g. `no2 AQI`.
#[must_use]
pub fn aqi_column(pollutant: Pollutant) -> String {
    format!("{pollutant} AQI")
}

/// Column holding the daily index level label, e.g. `no2 AQI Band`.
#[must_use]
pub fn aqi_band_column(pollutant: Pollutant) -> String {
    format!("{pollutant} AQI Band")
}
