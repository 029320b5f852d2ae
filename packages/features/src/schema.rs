//! Versioned model input schema.
//!
//! The ordered column list is defined once, in
//! `schema/feature_vector_v1.toml`, and shared by the store loader, the
//! prediction engine, and request validation.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::FeatureError;

const FEATURE_VECTOR_V1: &str = include_str!("../schema/feature_vector_v1.toml");

#[derive(Deserialize)]
struct SchemaFile {
    version: u32,
    columns: Vec<String>,
}

/// Ordered, versioned list of feature columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    version: u32,
    columns: Vec<String>,
    positions: BTreeMap<String, usize>,
}

impl FeatureSchema {
    /// Builds a schema from an explicit column list.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::InvalidSchema`] if the list is empty or
    /// contains duplicates.
    pub fn new(version: u32, columns: Vec<String>) -> Result<Self, FeatureError> {
        if columns.is_empty() {
            return Err(FeatureError::InvalidSchema {
                message: "schema has no columns".to_string(),
            });
        }

        let mut positions = BTreeMap::new();
        for (i, name) in columns.iter().enumerate() {
            if positions.insert(name.clone(), i).is_some() {
                return Err(FeatureError::InvalidSchema {
                    message: format!("duplicate column '{name}'"),
                });
            }
        }

        Ok(Self {
            version,
            columns,
            positions,
        })
    }

    /// The schema every shipped model was trained against.
    ///
    /// # Panics
    ///
    /// Panics if the embedded schema file is malformed.
    #[must_use]
    pub fn v1() -> Self {
        let file: SchemaFile = toml::de::from_str(FEATURE_VECTOR_V1)
            .unwrap_or_else(|e| panic!("Failed to parse embedded feature schema: {e}"));

        Self::new(file.version, file.columns)
            .unwrap_or_else(|e| panic!("Invalid embedded feature schema: {e}"))
    }

    /// Schema version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Column names in model input order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether `name` is a feature column.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Position of `name` in model input order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false for a constructed schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
