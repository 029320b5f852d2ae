//! Scoring feature tables.

use env_insights_features::{FeatureSchema, FeatureTable};
use env_insights_pollution_models::{
    CellId, CellTable, ColumnValues, TableShapeError, prediction_column,
};
use thiserror::Error;

use crate::Model;

/// Errors from scoring a feature table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    /// The model was trained on different features than the schema lists.
    #[error(
        "model expects schema version {model_version} with {model_features} features, \
         feature schema is version {schema_version} with {schema_features}"
    )]
    SchemaMismatch {
        /// Version recorded in the model artifact.
        model_version: u32,
        /// Number of features the model takes.
        model_features: usize,
        /// Version of the feature schema.
        schema_version: u32,
        /// Number of columns in the feature schema.
        schema_features: usize,
    },

    /// A schema column is absent from the feature table.
    #[error("feature table is missing column '{column}'")]
    MissingColumn {
        /// Column name.
        column: String,
    },

    /// A cell has a missing or non-finite feature value.
    #[error("cell {cell} has invalid value {value} for feature '{column}'")]
    InvalidValue {
        /// Offending cell.
        cell: CellId,
        /// Feature name.
        column: String,
        /// The value found (`NaN` when missing).
        value: f64,
    },

    /// Building the output table failed.
    #[error(transparent)]
    Table(#[from] TableShapeError),
}

/// Scores every cell of `features` with `model`.
///
/// The output has one row per input cell, in input order, and a single
/// numeric column named by [`prediction_column`]. The whole call fails if
/// any cell has a missing or non-finite value for a feature the model uses.
///
/// # Errors
///
/// * [`PredictionError::SchemaMismatch`] if the model's feature list or
///   schema version differ from `schema`
/// * [`PredictionError::MissingColumn`] if `features` lacks a schema column
/// * [`PredictionError::InvalidValue`] for the first bad cell value
pub fn predict(
    model: &Model,
    features: &FeatureTable,
    schema: &FeatureSchema,
) -> Result<CellTable, PredictionError> {
    if model.schema_version() != schema.version() || model.feature_names() != schema.columns() {
        return Err(PredictionError::SchemaMismatch {
            model_version: model.schema_version(),
            model_features: model.feature_names().len(),
            schema_version: schema.version(),
            schema_features: schema.len(),
        });
    }

    let columns = schema
        .columns()
        .iter()
        .map(|name| {
            features
                .column(name)
                .map(|values| (name.as_str(), values))
                .ok_or_else(|| PredictionError::MissingColumn {
                    column: name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut row = vec![0.0; columns.len()];
    let mut predictions = Vec::with_capacity(features.len());

    for (i, cell) in features.cell_ids().iter().enumerate() {
        for (slot, (name, values)) in row.iter_mut().zip(&columns) {
            let value = values[i];
            if !value.is_finite() {
                return Err(PredictionError::InvalidValue {
                    cell: cell.clone(),
                    column: (*name).to_string(),
                    value,
                });
            }
            *slot = value;
        }
        predictions.push(model.score(&row));
    }

    log::debug!(
        "Scored {} cells for {} (quantile {})",
        predictions.len(),
        model.pollutant(),
        model.quantile()
    );

    Ok(CellTable::new(features.cell_ids().to_vec()).with_column(
        prediction_column(model.pollutant(), model.quantile()),
        ColumnValues::Number(predictions),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelArtifact, Regressor};
    use env_insights_features::Scenario;
    use env_insights_pollution_models::Pollutant;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(1, vec!["Bicycle Score".to_string(), "Urban".to_string()]).unwrap()
    }

    fn model(feature_names: Vec<&str>) -> Model {
        Model::from_artifact(ModelArtifact {
            pollutant: Pollutant::No2,
            quantile: "mean".to_string(),
            schema_version: 1,
            feature_names: feature_names.into_iter().map(str::to_string).collect(),
            model: Regressor::Linear {
                intercept: 10.0,
                coefficients: vec![1.0, 0.5],
            },
        })
        .unwrap()
    }

    fn features(bicycle: Vec<f64>) -> FeatureTable {
        let n = bicycle.len();
        FeatureTable::new(
            (0..n).map(|i| CellId::new(format!("{}", i + 1))).collect(),
            vec![
                ("Urban".to_string(), vec![4.0; n]),
                ("Bicycle Score".to_string(), bicycle),
                ("Extra".to_string(), vec![99.0; n]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn one_prediction_per_cell_in_order() {
        let model = model(vec!["Bicycle Score", "Urban"]);
        let table = features(vec![1.0, 2.0, 3.0]);

        let result = predict(&model, &table, &schema()).unwrap();

        assert_eq!(result.cell_ids(), table.cell_ids());
        assert_eq!(result.columns().len(), 1);
        assert_eq!(result.columns()[0].name, "no2 Prediction mean");
        assert_eq!(
            result.numbers("no2 Prediction mean"),
            Some(&[13.0, 14.0, 15.0][..])
        );
    }

    #[test]
    fn scenario_changes_flow_into_predictions() {
        let model = model(vec!["Bicycle Score", "Urban"]);
        let baseline = features(vec![10.0, 20.0]);
        let adjusted = Scenario::new()
            .with_change("Bicycle Score", -50.0)
            .apply(&baseline);

        let base = predict(&model, &baseline, &schema()).unwrap();
        let scenario = predict(&model, &adjusted, &schema()).unwrap();

        assert_eq!(base.numbers("no2 Prediction mean"), Some(&[22.0, 32.0][..]));
        assert_eq!(
            scenario.numbers("no2 Prediction mean"),
            Some(&[17.0, 22.0][..])
        );
    }

    #[test]
    fn missing_value_fails_whole_request() {
        let model = model(vec!["Bicycle Score", "Urban"]);
        let table = features(vec![1.0, f64::NAN, 3.0]);

        let err = predict(&model, &table, &schema()).unwrap_err();
        match err {
            PredictionError::InvalidValue { cell, column, .. } => {
                assert_eq!(cell.as_str(), "2");
                assert_eq!(column, "Bicycle Score");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_column_is_reported() {
        let model = model(vec!["Bicycle Score", "Urban"]);
        let table = FeatureTable::new(
            vec![CellId::from("1")],
            vec![("Bicycle Score".to_string(), vec![1.0])],
        )
        .unwrap();

        assert_eq!(
            predict(&model, &table, &schema()).unwrap_err(),
            PredictionError::MissingColumn {
                column: "Urban".to_string()
            }
        );
    }

    #[test]
    fn feature_order_mismatch_is_rejected() {
        let model = model(vec!["Urban", "Bicycle Score"]);
        let table = features(vec![1.0]);

        assert!(matches!(
            predict(&model, &table, &schema()),
            Err(PredictionError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn empty_table_yields_empty_result() {
        let model = model(vec!["Bicycle Score", "Urban"]);
        let table = features(Vec::new());

        let result = predict(&model, &table, &schema()).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.numbers("no2 Prediction mean"), Some(&[][..]));
    }
}
