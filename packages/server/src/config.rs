//! Server configuration.
//!
//! Values start from [`ServerConfig::default`], are replaced by the TOML
//! file named in `ENV_INSIGHTS_CONFIG` if set, and finally by individual
//! environment variables (`BIND_ADDR`, `PORT`, `DATABASE_PATH`,
//! `GRID_SOURCE`, `GRID_CRS`, `MODELS_DIR`, `DATASET_SCOPE`,
//! `RANGE_POLICY`, `DB_POOL_SIZE`, `SIMPLIFY_TOLERANCE`, `STATIC_DIR`).

use std::path::PathBuf;
use std::str::FromStr;

use env_insights_database::paths;
use env_insights_features::RangePolicy;
use env_insights_pollution_models::DatasetScope;
use env_insights_spatial::{Crs, GeometryPrecision, Tolerance};
use serde::Deserialize;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "ENV_INSIGHTS_CONFIG";

/// Value of `GRID_SOURCE` that reads the grid from the store.
const STORE_GRID_SOURCE: &str = "duckdb";

/// Errors from assembling the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`].
    #[error("invalid config file {path}: {message}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A setting holds a value outside its domain.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Where the grid geometry is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridSource {
    /// The store's `grids` table.
    Store,
    /// A `GeoJSON` `FeatureCollection` file.
    File(PathBuf),
}

impl From<String> for GridSource {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case(STORE_GRID_SOURCE) {
            Self::Store
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// `DuckDB` store file.
    pub database_path: PathBuf,
    /// `duckdb` for the `grids` table, otherwise a `GeoJSON` file path.
    pub grid_source: String,
    /// CRS the grid geometry is stored in, e.g. `EPSG:3395`.
    pub grid_crs: String,
    /// Root of the model artifact tree.
    pub models_dir: PathBuf,
    /// Dataset scope models are loaded from.
    pub dataset_scope: String,
    /// What to do with feature values a scenario pushes below zero.
    pub range_policy: RangePolicy,
    /// Number of read-only store connections.
    pub db_pool_size: usize,
    /// Simplification tolerance in degrees; `0` keeps every vertex.
    pub simplify_tolerance: f64,
    /// Directory of front-end files to serve at `/`, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            database_path: paths::database_path(),
            grid_source: paths::grid_path().display().to_string(),
            grid_crs: Crs::WorldMercator.to_string(),
            models_dir: paths::models_dir(),
            dataset_scope: DatasetScope::default().to_string(),
            range_policy: RangePolicy::default(),
            db_pool_size: 4,
            simplify_tolerance: Tolerance::default().value,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::Io`] or [`ConfigError::Parse`] if `ENV_INSIGHTS_CONFIG`
    ///   names a file that cannot be used
    /// * [`ConfigError::InvalidValue`] if a variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which maps variable names
    /// to values.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        toml::de::from_str(&text).map_err(|e| ConfigError::Parse {
            path,
            message: e.to_string(),
        })
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = parse_value("PORT", v)?;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GRID_SOURCE") {
            self.grid_source = v;
        }
        if let Some(v) = lookup("GRID_CRS") {
            self.grid_crs = v;
        }
        if let Some(v) = lookup("MODELS_DIR") {
            self.models_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATASET_SCOPE") {
            self.dataset_scope = v;
        }
        if let Some(v) = lookup("RANGE_POLICY") {
            self.range_policy = parse_value("RANGE_POLICY", v)?;
        }
        if let Some(v) = lookup("DB_POOL_SIZE") {
            self.db_pool_size = parse_value("DB_POOL_SIZE", v)?;
        }
        if let Some(v) = lookup("SIMPLIFY_TOLERANCE") {
            self.simplify_tolerance = parse_value("SIMPLIFY_TOLERANCE", v)?;
        }
        if let Some(v) = lookup("STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.grid_crs()?;
        self.dataset_scope()?;
        if self.db_pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "db_pool_size",
                value: self.db_pool_size.to_string(),
            });
        }
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "simplify_tolerance",
                value: self.simplify_tolerance.to_string(),
            });
        }
        Ok(())
    }

    /// Where the grid geometry comes from.
    #[must_use]
    pub fn grid_source(&self) -> GridSource {
        GridSource::from(self.grid_source.clone())
    }

    /// CRS the grid geometry is stored in.
    ///
    /// # Errors
    ///
    /// Returns an error if `grid_crs` is not a supported CRS.
    pub fn grid_crs(&self) -> Result<Crs, ConfigError> {
        parse_value("grid_crs", self.grid_crs.clone())
    }

    /// Dataset scope models are loaded from.
    ///
    /// # Errors
    ///
    /// Returns an error if `dataset_scope` is not a valid scope label.
    pub fn dataset_scope(&self) -> Result<DatasetScope, ConfigError> {
        parse_value("dataset_scope", self.dataset_scope.clone())
    }

    /// Output geometry precision: simplified at `simplify_tolerance`
    /// degrees and serialized in EPSG:4326.
    #[must_use]
    pub fn precision(&self) -> GeometryPrecision {
        let tolerance = (self.simplify_tolerance > 0.0).then_some(Tolerance {
            value: self.simplify_tolerance,
            crs: Crs::Wgs84,
        });
        GeometryPrecision {
            tolerance,
            output_crs: Crs::Wgs84,
        }
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_london_deployment() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.grid_crs().unwrap(), Crs::WorldMercator);
        assert_eq!(config.range_policy, RangePolicy::PassThrough);
        assert_eq!(config.dataset_scope().unwrap().as_str(), "all");
        assert_eq!(config.precision(), GeometryPrecision::default());
        assert!(matches!(config.grid_source(), GridSource::File(_)));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "5000"),
            ("GRID_SOURCE", "DuckDB"),
            ("GRID_CRS", "4326"),
            ("RANGE_POLICY", "clamp_at_zero"),
            ("DB_POOL_SIZE", "2"),
            ("SIMPLIFY_TOLERANCE", "0"),
        ]))
        .unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.grid_source(), GridSource::Store);
        assert_eq!(config.grid_crs().unwrap(), Crs::Wgs84);
        assert_eq!(config.range_policy, RangePolicy::ClampAtZero);
        assert_eq!(config.db_pool_size, 2);
        assert_eq!(config.precision().tolerance, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("GRID_CRS", "EPSG:27700")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "grid_crs", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("DATASET_SCOPE", "../x")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "dataset_scope",
                ..
            }
        ));

        let err = ServerConfig::from_lookup(lookup(&[("DB_POOL_SIZE", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "db_pool_size",
                ..
            }
        ));
    }

    #[test]
    fn file_values_sit_between_defaults_and_environment() {
        let path = std::env::temp_dir().join(format!(
            "env_insights_server_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
            port = 9000
            models_dir = "/srv/models"
            range_policy = "clamp_at_zero"
            "#,
        )
        .unwrap();

        let path_str = path.display().to_string();
        let config = ServerConfig::from_lookup(lookup(&[
            (CONFIG_ENV, path_str.as_str()),
            ("PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.models_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.range_policy, RangePolicy::ClampAtZero);
        assert_eq!(config.bind_addr, "127.0.0.1");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let path = std::env::temp_dir().join(format!(
            "env_insights_server_config_bad_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "prot = 9000\n").unwrap();

        let err = ServerConfig::from_file(path.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        std::fs::remove_file(&path).unwrap();
    }
}
