#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! UK Daily Air Quality Index classification.
//!
//! Maps a continuous concentration to one of ten index values using a
//! pollutant-specific breakpoint table. Tables are plain data: the default
//! set is embedded from `breakpoints/*.toml` at compile time, and callers
//! may inject their own through [`AqiClassifier::new`].
//!
//! Boundaries are closed below and open above. A concentration exactly
//! equal to a band's lower bound belongs to that band, so with the `pm2.5`
//! table `11.99` is index 1 and `12.0` is index 2. Values below the first
//! bound (including negative predictions) are index 1 and values at or
//! above the last bound are index 10.

use std::collections::BTreeMap;

use env_insights_pollution_models::{
    CellTable, ColumnValues, Pollutant, TableShapeError, aqi_band_column, aqi_column,
};
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, IntoStaticStr};
use thiserror::Error;

/// Number of index values in the scheme.
pub const BAND_COUNT: u8 = 10;

/// Errors from air quality classification.
#[derive(Debug, Error)]
pub enum AqiError {
    /// No breakpoint table is registered for this pollutant.
    #[error("no air quality index breakpoints are defined for pollutant '{pollutant}'")]
    PollutantUnsupported {
        /// The pollutant that was requested.
        pollutant: Pollutant,
    },

    /// A breakpoint table is malformed.
    #[error("invalid breakpoint table for '{pollutant}': {message}")]
    InvalidTable {
        /// The pollutant the table was declared for.
        pollutant: Pollutant,
        /// Description of what went wrong.
        message: String,
    },

    /// The concentration column to classify does not exist.
    #[error("concentration column '{column}' not found")]
    MissingColumn {
        /// Column name.
        column: String,
    },

    /// A concentration cannot be ascribed a band.
    #[error("concentration {value} for cell '{cell}' cannot be classified")]
    ConcentrationInvalid {
        /// Cell identifier.
        cell: String,
        /// The offending value.
        value: f64,
    },

    /// Adding the derived columns failed.
    #[error(transparent)]
    Table(#[from] TableShapeError),
}

/// Descriptive level grouping of index values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, IntoStaticStr,
)]
pub enum DaqiLevel {
    /// Index 1-3.
    Low,
    /// Index 4-6.
    Moderate,
    /// Index 7-9.
    High,
    /// Index 10.
    #[strum(serialize = "Very High")]
    VeryHigh,
}

/// One of the ten index values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AqiBand(u8);

impl AqiBand {
    /// Creates a band from its index value, if in 1-10.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        if index >= 1 && index <= BAND_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Index value, 1-10.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Level grouping for this index value.
    #[must_use]
    pub const fn level(self) -> DaqiLevel {
        match self.0 {
            0..=3 => DaqiLevel::Low,
            4..=6 => DaqiLevel::Moderate,
            7..=9 => DaqiLevel::High,
            _ => DaqiLevel::VeryHigh,
        }
    }
}

/// Breakpoints for one pollutant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BreakpointTable {
    /// Pollutant this table classifies.
    pub pollutant: Pollutant,
    /// Averaging period the thresholds were defined for.
    #[serde(default)]
    pub averaging_period: String,
    /// Concentration units.
    #[serde(default)]
    pub units: String,
    /// Lower bound of index 2 through 10, strictly ascending.
    pub lower_bounds: Vec<f64>,
}

impl BreakpointTable {
    /// Checks that the table has one bound per band above the first and
    /// that bounds are finite and strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError::InvalidTable`] describing the first problem.
    pub fn validate(&self) -> Result<(), AqiError> {
        let expected = usize::from(BAND_COUNT - 1);
        if self.lower_bounds.len() != expected {
            return Err(AqiError::InvalidTable {
                pollutant: self.pollutant,
                message: format!(
                    "expected {expected} lower bounds, found {}",
                    self.lower_bounds.len()
                ),
            });
        }

        if let Some(bad) = self.lower_bounds.iter().find(|b| !b.is_finite()) {
            return Err(AqiError::InvalidTable {
                pollutant: self.pollutant,
                message: format!("bound {bad} is not finite"),
            });
        }

        if self.lower_bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AqiError::InvalidTable {
                pollutant: self.pollutant,
                message: "bounds must be strictly ascending".to_string(),
            });
        }

        Ok(())
    }

    /// Band for a concentration. Total over finite inputs.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError::ConcentrationInvalid`] for `NaN`.
    pub fn band(&self, value: f64) -> Result<AqiBand, AqiError> {
        if value.is_nan() {
            return Err(AqiError::ConcentrationInvalid {
                cell: String::new(),
                value,
            });
        }

        let reached = self.lower_bounds.partition_point(|bound| *bound <= value);

        #[allow(clippy::cast_possible_truncation)]
        Ok(AqiBand(1 + reached as u8))
    }
}

const BREAKPOINT_TOMLS: &[(&str, &str)] = &[
    ("no2", include_str!("../breakpoints/no2.toml")),
    ("o3", include_str!("../breakpoints/o3.toml")),
    ("pm10", include_str!("../breakpoints/pm10.toml")),
    ("pm2.5", include_str!("../breakpoints/pm2_5.toml")),
    ("so2", include_str!("../breakpoints/so2.toml")),
];

/// Classifies concentrations using a set of breakpoint tables keyed by
/// pollutant.
#[derive(Debug, Clone)]
pub struct AqiClassifier {
    tables: BTreeMap<Pollutant, BreakpointTable>,
}

impl AqiClassifier {
    /// Builds a classifier from explicit tables.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError::InvalidTable`] if any table fails validation or
    /// two tables name the same pollutant.
    pub fn new(tables: Vec<BreakpointTable>) -> Result<Self, AqiError> {
        let mut by_pollutant = BTreeMap::new();

        for table in tables {
            table.validate()?;
            let pollutant = table.pollutant;
            if by_pollutant.insert(pollutant, table).is_some() {
                return Err(AqiError::InvalidTable {
                    pollutant,
                    message: "duplicate table".to_string(),
                });
            }
        }

        Ok(Self {
            tables: by_pollutant,
        })
    }

    /// The UK Daily Air Quality Index tables shipped with the service.
    ///
    /// # Panics
    ///
    /// Panics if an embedded table is malformed (the tables are baked in at
    /// compile time and covered by tests).
    #[must_use]
    pub fn uk_daqi() -> Self {
        let tables = BREAKPOINT_TOMLS
            .iter()
            .map(|(name, toml_str)| {
                toml::de::from_str(toml_str)
                    .unwrap_or_else(|e| panic!("Failed to parse breakpoint table '{name}': {e}"))
            })
            .collect();

        Self::new(tables).unwrap_or_else(|e| panic!("Invalid embedded breakpoint table: {e}"))
    }

    /// Whether a breakpoint table exists for the pollutant.
    #[must_use]
    pub fn supports(&self, pollutant: Pollutant) -> bool {
        self.tables.contains_key(&pollutant)
    }

    /// Returns the table for a pollutant.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError::PollutantUnsupported`] if none is registered.
    pub fn table(&self, pollutant: Pollutant) -> Result<&BreakpointTable, AqiError> {
        self.tables
            .get(&pollutant)
            .ok_or(AqiError::PollutantUnsupported { pollutant })
    }

    /// Band for a single concentration.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError::PollutantUnsupported`] or
    /// [`AqiError::ConcentrationInvalid`].
    pub fn band(&self, pollutant: Pollutant, value: f64) -> Result<AqiBand, AqiError> {
        self.table(pollutant)?.band(value)
    }

    /// Adds `"<pollutant> AQI"` (index) and `"<pollutant> AQI Band"`
    /// (level label) columns derived from `concentration_column`.
    ///
    /// # Errors
    ///
    /// Returns [`AqiError::PollutantUnsupported`] for pollutants without a
    /// table, [`AqiError::MissingColumn`] if the column is absent or not
    /// numeric, and [`AqiError::ConcentrationInvalid`] for `NaN` values.
    pub fn classify(
        &self,
        table: &mut CellTable,
        pollutant: Pollutant,
        concentration_column: &str,
    ) -> Result<(), AqiError> {
        let breakpoints = self.table(pollutant)?;

        let values = table
            .numbers(concentration_column)
            .ok_or_else(|| AqiError::MissingColumn {
                column: concentration_column.to_string(),
            })?;

        let mut indices = Vec::with_capacity(values.len());
        let mut labels = Vec::with_capacity(values.len());

        for (cell, value) in table.cell_ids().iter().zip(values) {
            let band = breakpoints.band(*value).map_err(|_| {
                AqiError::ConcentrationInvalid {
                    cell: cell.to_string(),
                    value: *value,
                }
            })?;
            indices.push(i64::from(band.index()));
            labels.push(band.level().to_string());
        }

        log::debug!(
            "Classified {} cells for {pollutant} from '{concentration_column}'",
            indices.len()
        );

        table.push_column(aqi_column(pollutant), ColumnValues::Integer(indices))?;
        table.push_column(aqi_band_column(pollutant), ColumnValues::Text(labels))?;

        Ok(())
    }
}
