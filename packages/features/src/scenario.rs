//! Hypothetical percentage changes to feature columns.
//!
//! A scenario such as `{"Car and Taxi Score": -20}` scales every cell's
//! value in that column by `1 + pct / 100`. Names that are not columns of
//! the table are skipped, which lets clients send changes for features a
//! given model does not use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::FeatureTable;

/// Errors from parsing a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    /// An entry was not of the form `feature:percent`.
    #[error("invalid change '{entry}': expected 'feature:percent'")]
    InvalidChange {
        /// The rejected entry.
        entry: String,
    },
}

/// What to do with values a scenario pushes below zero.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RangePolicy {
    /// Hand the scaled value to the model unchanged, even if negative.
    #[default]
    PassThrough,
    /// Clamp negative results to zero.
    ClampAtZero,
}

impl RangePolicy {
    fn apply(self, value: f64) -> f64 {
        match self {
            Self::PassThrough => value,
            Self::ClampAtZero if value < 0.0 => 0.0,
            Self::ClampAtZero => value,
        }
    }
}

/// Feature name to signed percentage change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenario {
    changes: BTreeMap<String, f64>,
}

impl Scenario {
    /// Creates an empty scenario.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }

    /// Adds or replaces a change.
    #[must_use]
    pub fn with_change(mut self, feature: impl Into<String>, percent: f64) -> Self {
        self.changes.insert(feature.into(), percent);
        self
    }

    /// Parses the comma separated `feature:percent` form sent by the map
    /// client, e.g. `Bicycle Score:10,Car and Taxi Score:-5`.
    ///
    /// Blank input is an empty scenario. A repeated feature keeps its last
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::InvalidChange`] for an entry without a
    /// separator, with an empty name, or with a non-finite percentage.
    pub fn parse_changes(input: &str) -> Result<Self, ScenarioError> {
        let mut changes = BTreeMap::new();

        for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = || ScenarioError::InvalidChange {
                entry: entry.to_string(),
            };

            let (name, percent) = entry.rsplit_once(':').ok_or_else(invalid)?;
            let name = name.trim();
            let percent: f64 = percent.trim().parse().map_err(|_| invalid())?;

            if name.is_empty() || !percent.is_finite() {
                return Err(invalid());
            }

            changes.insert(name.to_string(), percent);
        }

        Ok(Self { changes })
    }

    /// All requested changes, ordered by feature name.
    #[must_use]
    pub const fn changes(&self) -> &BTreeMap<String, f64> {
        &self.changes
    }

    /// Whether the scenario requests no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changes whose feature is a column of `table`.
    pub fn applicable<'a>(
        &'a self,
        table: &'a FeatureTable,
    ) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.changes
            .iter()
            .filter(|(name, _)| table.has_column(name))
            .map(|(name, pct)| (name.as_str(), *pct))
    }

    /// Applies the scenario with values passed through unclamped.
    #[must_use]
    pub fn apply(&self, table: &FeatureTable) -> FeatureTable {
        self.apply_with_policy(table, RangePolicy::PassThrough)
    }

    /// Applies the scenario, returning a new table.
    ///
    /// Each matching column value `v` becomes `v * (1 + pct / 100)`, then
    /// `policy` is applied. `table` is not modified; untouched columns are
    /// shared with the result.
    #[must_use]
    pub fn apply_with_policy(&self, table: &FeatureTable, policy: RangePolicy) -> FeatureTable {
        let mut result = table.clone();

        for (name, pct) in &self.changes {
            let factor = 1.0 + pct / 100.0;
            match result.map_column(name, |v| policy.apply(v * factor)) {
                Some(changed) => result = changed,
                None => log::debug!("Scenario change for unknown feature '{name}' ignored"),
            }
        }

        result
    }
}
