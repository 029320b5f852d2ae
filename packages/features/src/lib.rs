#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature vectors and scenario perturbations.
//!
//! - [`schema`] holds the single versioned list of model input columns.
//! - [`table`] holds per-cell feature values for one time bucket.
//! - [`scenario`] applies percentage changes to a table without touching
//!   the baseline it was derived from.

pub mod scenario;
pub mod schema;
pub mod table;

pub use scenario::{RangePolicy, Scenario, ScenarioError};
pub use schema::FeatureSchema;
pub use table::{FeatureError, FeatureTable};
