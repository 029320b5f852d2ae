//! On-disk model format.
//!
//! An artifact records which pollutant and quantile it predicts, the
//! feature names (in order) it was trained on, and one of two regressor
//! shapes: a linear model or an ensemble of binary regression trees whose
//! leaf values are summed (the layout gradient-boosting libraries export).
//!
//! ```json
//! {
//!   "pollutant": "no2",
//!   "quantile": "mean",
//!   "schemaVersion": 1,
//!   "featureNames": ["Bicycle Score", "..."],
//!   "model": {
//!     "type": "treeEnsemble",
//!     "baseScore": 20.0,
//!     "trees": [{ "nodes": [
//!       { "kind": "split", "feature": 0, "threshold": 5.0, "left": 1, "right": 2 },
//!       { "kind": "leaf", "value": -1.5 },
//!       { "kind": "leaf", "value": 2.0 }
//!     ]}]
//!   }
//! }
//! ```

use env_insights_pollution_models::{Pollutant, Quantile};
use serde::{Deserialize, Serialize};

/// Serialized model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifact {
    /// Pollutant the model predicts.
    pub pollutant: Pollutant,
    /// Quantile label (`mean`, `0.5`, ...).
    pub quantile: String,
    /// Feature schema version the model was trained against.
    pub schema_version: u32,
    /// Input feature names in training order.
    pub feature_names: Vec<String>,
    /// The regressor.
    pub model: Regressor,
}

/// Supported regressor shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Regressor {
    /// `intercept + sum(coefficients[i] * x[i])`.
    #[serde(rename_all = "camelCase")]
    Linear {
        /// Constant term.
        intercept: f64,
        /// One coefficient per feature.
        coefficients: Vec<f64>,
    },
    /// `base_score + sum(tree(x))`.
    #[serde(rename_all = "camelCase")]
    TreeEnsemble {
        /// Constant added to the sum of tree outputs.
        base_score: f64,
        /// Trees in the ensemble.
        trees: Vec<Tree>,
    },
}

/// A binary regression tree stored as a flat node list rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Nodes; children always have a higher index than their parent.
    pub nodes: Vec<TreeNode>,
}

/// A tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TreeNode {
    /// Go to `left` when `x[feature] <= threshold`, otherwise `right`.
    Split {
        /// Input feature index.
        feature: usize,
        /// Split threshold.
        threshold: f64,
        /// Index of the left child.
        left: usize,
        /// Index of the right child.
        right: usize,
    },
    /// Terminal node.
    Leaf {
        /// Contribution of this leaf.
        value: f64,
    },
}

impl Tree {
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {i} splits on feature {feature} but the model has {n_features}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {i} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(format!("node {i} has out-of-order child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {i} has a non-finite value"));
                    }
                }
            }
        }

        Ok(())
    }

    fn score(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// A validated, ready-to-score model.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pollutant: Pollutant,
    quantile: Quantile,
    schema_version: u32,
    feature_names: Vec<String>,
    regressor: Regressor,
}

impl Model {
    /// Validates an artifact.
    ///
    /// Child indices must increase along every path, so scoring always
    /// terminates.
    ///
    /// # Errors
    ///
    /// Returns a description of the first structural problem found.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, String> {
        let quantile: Quantile = artifact.quantile.parse().map_err(|e| format!("{e}"))?;
        let n_features = artifact.feature_names.len();

        if n_features == 0 {
            return Err("model declares no features".to_string());
        }

        match &artifact.model {
            Regressor::Linear {
                intercept,
                coefficients,
            } => {
                if coefficients.len() != n_features {
                    return Err(format!(
                        "{} coefficients for {n_features} features",
                        coefficients.len()
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("linear model has non-finite parameters".to_string());
                }
            }
            Regressor::TreeEnsemble { base_score, trees } => {
                if !base_score.is_finite() {
                    return Err("base score is not finite".to_string());
                }
                for (t, tree) in trees.iter().enumerate() {
                    tree.validate(n_features)
                        .map_err(|e| format!("tree {t}: {e}"))?;
                }
            }
        }

        Ok(Self {
            pollutant: artifact.pollutant,
            quantile,
            schema_version: artifact.schema_version,
            feature_names: artifact.feature_names,
            regressor: artifact.model,
        })
    }

    /// Pollutant the model predicts.
    #[must_use]
    pub const fn pollutant(&self) -> Pollutant {
        self.pollutant
    }

    /// Quantile the model predicts.
    #[must_use]
    pub const fn quantile(&self) -> &Quantile {
        &self.quantile
    }

    /// Feature schema version the model was trained against.
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Input feature names in training order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Scores one input row. `row` must hold one value per feature, in
    /// [`Self::feature_names`] order.
    #[must_use]
    pub fn score(&self, row: &[f64]) -> f64 {
        debug_assert_eq!(row.len(), self.feature_names.len());

        match &self.regressor {
            Regressor::Linear {
                intercept,
                coefficients,
            } => {
                intercept
                    + coefficients
                        .iter()
                        .zip(row)
                        .map(|(c, x)| c * x)
                        .sum::<f64>()
            }
            Regressor::TreeEnsemble { base_score, trees } => {
                base_score + trees.iter().map(|t| t.score(row)).sum::<f64>()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(model: Regressor, n: usize) -> ModelArtifact {
        ModelArtifact {
            pollutant: Pollutant::No2,
            quantile: "0.5".to_string(),
            schema_version: 1,
            feature_names: (0..n).map(|i| format!("f{i}")).collect(),
            model,
        }
    }

    #[test]
    fn linear_scoring() {
        let model = Model::from_artifact(artifact(
            Regressor::Linear {
                intercept: 1.0,
                coefficients: vec![2.0, -0.5],
            },
            2,
        ))
        .unwrap();
        assert!((model.score(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(model.quantile().as_str(), "0.5");
    }

    #[test]
    fn tree_ensemble_scoring() {
        let tree = Tree {
            nodes: vec![
                TreeNode::Split {
                    feature: 1,
                    threshold: 5.0,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: -1.0 },
                TreeNode::Leaf { value: 3.0 },
            ],
        };
        let model = Model::from_artifact(artifact(
            Regressor::TreeEnsemble {
                base_score: 10.0,
                trees: vec![tree.clone(), tree],
            },
            2,
        ))
        .unwrap();

        assert!((model.score(&[0.0, 5.0]) - 8.0).abs() < 1e-12);
        assert!((model.score(&[0.0, 5.1]) - 16.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_cyclic_trees() {
        let tree = Tree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 0,
                    right: 1,
                },
                TreeNode::Leaf { value: 0.0 },
            ],
        };
        let err = Model::from_artifact(artifact(
            Regressor::TreeEnsemble {
                base_score: 0.0,
                trees: vec![tree],
            },
            1,
        ))
        .unwrap_err();
        assert!(err.contains("out-of-order child"), "{err}");
    }

    #[test]
    fn rejects_feature_index_out_of_range() {
        let tree = Tree {
            nodes: vec![
                TreeNode::Split {
                    feature: 3,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: 0.0 },
                TreeNode::Leaf { value: 1.0 },
            ],
        };
        assert!(
            Model::from_artifact(artifact(
                Regressor::TreeEnsemble {
                    base_score: 0.0,
                    trees: vec![tree],
                },
                2,
            ))
            .is_err()
        );
    }

    #[test]
    fn rejects_coefficient_count_mismatch() {
        assert!(
            Model::from_artifact(artifact(
                Regressor::Linear {
                    intercept: 0.0,
                    coefficients: vec![1.0],
                },
                2,
            ))
            .is_err()
        );
    }

    #[test]
    fn parses_json_layout() {
        let json = r#"{
            "pollutant": "pm2.5",
            "quantile": "mean",
            "schemaVersion": 1,
            "featureNames": ["a", "b"],
            "model": {
                "type": "treeEnsemble",
                "baseScore": 2.0,
                "trees": [{ "nodes": [
                    { "kind": "split", "feature": 0, "threshold": 1.0, "left": 1, "right": 2 },
                    { "kind": "leaf", "value": 0.5 },
                    { "kind": "leaf", "value": 1.5 }
                ]}]
            }
        }"#;
        let artifact: ModelArtifact = serde_json::from_str(json).unwrap();
        let model = Model::from_artifact(artifact).unwrap();
        assert_eq!(model.pollutant(), Pollutant::Pm25);
        assert!((model.score(&[2.0, 0.0]) - 3.5).abs() < 1e-12);
    }
}
