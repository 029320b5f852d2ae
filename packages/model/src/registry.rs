//! Lazily loaded, process-wide model cache.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use env_insights_pollution_models::{DatasetScope, Pollutant, Quantile};

use crate::{Model, ModelArtifact, ModelError};

/// Identifies one model artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelKey {
    /// Pollutant predicted.
    pub pollutant: Pollutant,
    /// Quantile predicted.
    pub quantile: Quantile,
    /// Training dataset.
    pub scope: DatasetScope,
}

/// Loads models from a directory tree and caches them.
///
/// A model is read from disk at most once per key under normal operation.
/// Two threads requesting the same uncached key may both read the file;
/// the first to insert wins and both get the same instance back. Failed
/// loads are not cached, so a model dropped into place later is picked up
/// on the next request.
#[derive(Debug)]
pub struct ModelRegistry {
    root: PathBuf,
    models: RwLock<BTreeMap<ModelKey, Arc<Model>>>,
}

impl ModelRegistry {
    /// Creates an empty registry rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            models: RwLock::new(BTreeMap::new()),
        }
    }

    /// Directory the registry reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact path for a key: `<root>/<scope>/<quantile>/<pollutant>.json`.
    #[must_use]
    pub fn path_for(&self, key: &ModelKey) -> PathBuf {
        self.root
            .join(key.scope.as_str())
            .join(key.quantile.as_str())
            .join(format!("{}.json", key.pollutant))
    }

    /// Number of models currently cached.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the model for a pollutant, quantile, and dataset, loading it
    /// on first use.
    ///
    /// # Errors
    ///
    /// * [`ModelError::NotFound`] if no artifact exists for the key
    /// * [`ModelError::Corrupt`] if the artifact cannot be parsed, fails
    ///   validation, or describes a different pollutant or quantile
    /// * [`ModelError::Io`] if the artifact cannot be read
    pub fn get(
        &self,
        pollutant: Pollutant,
        quantile: &Quantile,
        scope: &DatasetScope,
    ) -> Result<Arc<Model>, ModelError> {
        let key = ModelKey {
            pollutant,
            quantile: quantile.clone(),
            scope: scope.clone(),
        };

        if let Some(model) = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(model));
        }

        let loaded = Arc::new(self.load(&key)?);

        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        let model = models.entry(key).or_insert(loaded);

        Ok(Arc::clone(model))
    }

    fn load(&self, key: &ModelKey) -> Result<Model, ModelError> {
        let path = self.path_for(key);
        log::debug!("Loading model {} from {}", key.pollutant, path.display());

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModelError::NotFound {
                    pollutant: key.pollutant,
                    quantile: key.quantile.clone(),
                    scope: key.scope.clone(),
                    path,
                });
            }
            Err(source) => return Err(ModelError::Io { path, source }),
        };

        let artifact: ModelArtifact =
            serde_json::from_str(&contents).map_err(|e| ModelError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let model = Model::from_artifact(artifact).map_err(|message| ModelError::Corrupt {
            path: path.clone(),
            message,
        })?;

        if model.pollutant() != key.pollutant || model.quantile() != &key.quantile {
            return Err(ModelError::Corrupt {
                message: format!(
                    "artifact describes {} quantile {}, expected {} quantile {}",
                    model.pollutant(),
                    model.quantile(),
                    key.pollutant,
                    key.quantile
                ),
                path,
            });
        }

        log::info!(
            "Loaded {} model (quantile {}, dataset {}, {} features)",
            key.pollutant,
            key.quantile,
            key.scope,
            model.feature_names().len()
        );

        Ok(model)
    }
}
