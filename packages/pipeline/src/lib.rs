#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The scenario prediction pipeline.
//!
//! [`Insights`] owns every long-lived resource (store, grid, model
//! registry, classifier, feature schema) and runs each request end to end:
//!
//! ```text
//! feature table -> scenario -> model -> predictions -> AQI -> grid join -> GeoJSON
//! ```
//!
//! All work is synchronous; callers on an async runtime should run it on a
//! blocking thread.

pub mod error;
pub mod report;

use std::sync::Arc;

use env_insights_aqi::AqiClassifier;
use env_insights_database::{Store, StoreError};
use env_insights_features::{FeatureSchema, FeatureTable, RangePolicy, Scenario};
use env_insights_model::{Model, ModelRegistry, predict};
use env_insights_pollution_models::{
    CellTable, ColumnValues, DatasetScope, Pollutant, Quantile, TimeBucket, aqi_column,
    prediction_column,
};
use env_insights_spatial::{GeometryPrecision, Grid, JoinedPayload, join_and_serialize};

pub use error::{ErrorKind, InsightsError};
pub use report::{BandCount, CellSummary, ScenarioReport};

/// Per-deployment pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    /// What to do with feature values a scenario pushes below zero.
    pub range_policy: RangePolicy,
    /// Output geometry precision.
    pub precision: GeometryPrecision,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            range_policy: RangePolicy::PassThrough,
            precision: GeometryPrecision::default(),
        }
    }
}

/// Long-lived pipeline state, shared by all requests.
pub struct Insights {
    store: Store,
    grid: Arc<Grid>,
    registry: ModelRegistry,
    classifier: AqiClassifier,
    schema: FeatureSchema,
    scope: DatasetScope,
    settings: Settings,
}

impl Insights {
    /// Assembles the pipeline.
    ///
    /// The grid is reprojected and simplified once here, so requests only
    /// copy prepared geometry into their output.
    #[must_use]
    pub fn new(
        store: Store,
        grid: &Grid,
        registry: ModelRegistry,
        classifier: AqiClassifier,
        schema: FeatureSchema,
        scope: DatasetScope,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            grid: Arc::new(grid.prepare(&settings.precision)),
            registry,
            classifier,
            schema,
            scope,
            settings,
        }
    }

    /// The prepared grid, in the output CRS.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The feature schema models are bound to.
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Pipeline settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Dataset scope models are loaded from.
    #[must_use]
    pub const fn scope(&self) -> &DatasetScope {
        &self.scope
    }

    fn output_precision(&self) -> GeometryPrecision {
        GeometryPrecision::exact(self.grid.crs())
    }

    /// Stored baseline predictions for a bucket, classified and joined.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::PollutantUnsupported`] if the pollutant has no index
    /// * [`ErrorKind::TableNotFound`] if the bucket has no table
    /// * [`ErrorKind::InvalidRequest`] if no column holds the requested
    ///   predictions
    pub fn baseline_concentrations(
        &self,
        pollutant: Pollutant,
        quantile: &Quantile,
        bucket: &TimeBucket,
    ) -> Result<JoinedPayload, InsightsError> {
        self.classifier.table(pollutant)?;

        let column = prediction_column(pollutant, quantile);
        let mut table = self
            .store
            .load_concentrations(bucket, pollutant, quantile)
            .map_err(|e| match e {
                StoreError::ColumnNotFound { .. } => InsightsError::ConcentrationUnavailable {
                    bucket: bucket.key(),
                    column: column.clone(),
                },
                other => other.into(),
            })?;

        self.classifier.classify(&mut table, pollutant, &column)?;
        let payload = join_and_serialize(&self.grid, &table, &self.output_precision())?;

        log::info!(
            "Served baseline {pollutant} ({quantile}) for {bucket}: {} cells",
            payload.report.matched
        );
        Ok(payload)
    }

    /// One stored feature column for a bucket, joined.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::InvalidRequest`] if `feature` is not a model input
    /// * [`ErrorKind::TableNotFound`] if the bucket has no table
    pub fn baseline_feature(
        &self,
        feature: &str,
        bucket: &TimeBucket,
    ) -> Result<JoinedPayload, InsightsError> {
        if !self.schema.contains(feature) {
            return Err(InsightsError::UnknownFeature {
                feature: feature.to_string(),
            });
        }

        let table = self
            .store
            .load_feature_column(bucket, feature)
            .map_err(feature_store_error)?;
        let payload = join_and_serialize(&self.grid, &table, &self.output_precision())?;

        log::info!(
            "Served feature '{feature}' for {bucket}: {} cells",
            payload.report.matched
        );
        Ok(payload)
    }

    /// Predictions for a bucket under `scenario`, classified and joined.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::PollutantUnsupported`] if the pollutant has no index
    /// * [`ErrorKind::ModelNotFound`] if no model artifact exists
    /// * [`ErrorKind::TableNotFound`] if the bucket has no table
    /// * [`ErrorKind::FeatureVectorInvalid`] if stored features are missing
    ///   or inconsistent with the model
    pub fn scenario_concentrations(
        &self,
        pollutant: Pollutant,
        quantile: &Quantile,
        bucket: &TimeBucket,
        scenario: &Scenario,
    ) -> Result<JoinedPayload, InsightsError> {
        let run = self.run_scenario(pollutant, quantile, bucket, scenario)?;
        let payload = join_and_serialize(&self.grid, &run.predictions, &self.output_precision())?;

        log::info!(
            "Served {pollutant} ({quantile}) scenario for {bucket}: {} changes, {} cells",
            scenario.changes().len(),
            payload.report.matched
        );
        Ok(payload)
    }

    /// Summary statistics for a scenario run.
    ///
    /// # Errors
    ///
    /// Same as [`Self::scenario_concentrations`].
    pub fn scenario_report(
        &self,
        pollutant: Pollutant,
        quantile: &Quantile,
        bucket: &TimeBucket,
        scenario: &Scenario,
    ) -> Result<ScenarioReport, InsightsError> {
        let run = self.run_scenario(pollutant, quantile, bucket, scenario)?;
        let column = prediction_column(pollutant, quantile);

        let baseline = predict(&run.model, &run.baseline, &self.schema)?;
        let baseline_values = baseline.numbers(&column).unwrap_or_default();
        let scenario_values = run.predictions.numbers(&column).unwrap_or_default();
        let aqi = match run.predictions.column(&aqi_column(pollutant)) {
            Some(ColumnValues::Integer(values)) => values.as_slice(),
            _ => &[],
        };

        let applied_changes = scenario
            .applicable(&run.baseline)
            .map(|(name, pct)| (name.to_string(), pct))
            .collect();
        let ignored_changes = scenario
            .changes()
            .keys()
            .filter(|name| !run.baseline.has_column(name))
            .cloned()
            .collect();

        ScenarioReport::build(
            report::ReportRequest {
                pollutant,
                quantile: quantile.to_string(),
                time_bucket: bucket.key(),
                applied_changes,
                ignored_changes,
                classifier: &self.classifier,
                grid: &self.grid,
            },
            run.predictions.cell_ids(),
            baseline_values,
            scenario_values,
            aqi,
        )
    }

    /// The bare grid: one feature per cell carrying only its `"Grid ID"`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Internal`] if serialization fails.
    pub fn grid_geojson(&self) -> Result<JoinedPayload, InsightsError> {
        let cells = CellTable::new(self.grid.iter().map(|(id, _)| id.clone()).collect());
        let payload = join_and_serialize(&self.grid, &cells, &self.output_precision())?;

        log::info!("Served grid: {} cells", payload.report.matched);
        Ok(payload)
    }

    /// Names of all store tables.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Internal`] if the store cannot be read.
    pub fn list_tables(&self) -> Result<Vec<String>, InsightsError> {
        Ok(self.store.list_tables()?)
    }

    fn run_scenario(
        &self,
        pollutant: Pollutant,
        quantile: &Quantile,
        bucket: &TimeBucket,
        scenario: &Scenario,
    ) -> Result<ScenarioRun, InsightsError> {
        self.classifier.table(pollutant)?;
        let model = self.registry.get(pollutant, quantile, &self.scope)?;

        let baseline = self
            .store
            .load_feature_table(bucket, &self.schema)
            .map_err(feature_store_error)?;
        log::debug!("Loaded {} cells for {bucket}", baseline.len());

        let adjusted = scenario.apply_with_policy(&baseline, self.settings.range_policy);
        let mut predictions = predict(&model, &adjusted, &self.schema)?;

        let column = prediction_column(pollutant, quantile);
        self.classifier
            .classify(&mut predictions, pollutant, &column)?;

        Ok(ScenarioRun {
            model,
            baseline,
            predictions,
        })
    }
}

struct ScenarioRun {
    model: Arc<Model>,
    baseline: FeatureTable,
    predictions: CellTable,
}

/// A feature column the schema requires but the store lacks, or a cell
/// keyed by more than one row, means the stored data does not fit the model.
fn feature_store_error(e: StoreError) -> InsightsError {
    if matches!(
        e,
        StoreError::ColumnNotFound { .. }
            | StoreError::MissingCellId { .. }
            | StoreError::DuplicateCellId { .. }
    ) {
        InsightsError::FeatureVectorInvalid {
            message: e.to_string(),
        }
    } else {
        e.into()
    }
}
