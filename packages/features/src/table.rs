//! In-memory feature tables.

use std::sync::Arc;

use env_insights_pollution_models::CellId;
use thiserror::Error;

/// Errors from building or reading feature tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// A column has a different number of values than there are cells.
    #[error("feature column '{column}' has {actual} values but the table has {expected} cells")]
    LengthMismatch {
        /// Column name.
        column: String,
        /// Number of cells.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// Two columns share a name.
    #[error("duplicate feature column '{column}'")]
    DuplicateColumn {
        /// Column name.
        column: String,
    },

    /// A feature schema definition is unusable.
    #[error("invalid feature schema: {message}")]
    InvalidSchema {
        /// Description of what went wrong.
        message: String,
    },
}

/// Feature values per cell for one time bucket.
///
/// Columns are reference counted and never written in place, so cloning a
/// table is cheap and a derived table shares every column it does not
/// change with its source. Missing or non-numeric source values are held
/// as `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    cell_ids: Arc<[CellId]>,
    names: Vec<String>,
    columns: Vec<Arc<[f64]>>,
}

impl FeatureTable {
    /// Builds a table from cells and named columns.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError`] if a column length differs from the cell
    /// count or a name repeats.
    pub fn new(
        cell_ids: Vec<CellId>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, FeatureError> {
        let mut names: Vec<String> = Vec::with_capacity(columns.len());
        let mut values = Vec::with_capacity(columns.len());

        for (name, column) in columns {
            if column.len() != cell_ids.len() {
                return Err(FeatureError::LengthMismatch {
                    column: name,
                    expected: cell_ids.len(),
                    actual: column.len(),
                });
            }
            if names.contains(&name) {
                return Err(FeatureError::DuplicateColumn { column: name });
            }
            names.push(name);
            values.push(Arc::from(column));
        }

        Ok(Self {
            cell_ids: Arc::from(cell_ids),
            names,
            columns: values,
        })
    }

    /// Cell identifiers in row order.
    #[must_use]
    pub fn cell_ids(&self) -> &[CellId] {
        &self.cell_ids
    }

    /// Column names in storage order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Values of a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.index_of(name).map(|i| &*self.columns[i])
    }

    /// Whether a column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Whether this table and `other` share the storage of `name`.
    #[must_use]
    pub fn shares_column(&self, other: &Self, name: &str) -> bool {
        match (self.index_of(name), other.index_of(name)) {
            (Some(a), Some(b)) => Arc::ptr_eq(&self.columns[a], &other.columns[b]),
            _ => false,
        }
    }

    /// Returns a copy with `name` replaced by the result of `f` over its
    /// values. Returns `None` if the column does not exist.
    #[must_use]
    pub fn map_column(&self, name: &str, f: impl Fn(f64) -> f64) -> Option<Self> {
        let index = self.index_of(name)?;
        let replaced: Arc<[f64]> = self.columns[index].iter().map(|v| f(*v)).collect();

        let mut columns = self.columns.clone();
        columns[index] = replaced;

        Some(Self {
            cell_ids: Arc::clone(&self.cell_ids),
            names: self.names.clone(),
            columns,
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cell_ids.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cell_ids.is_empty()
    }
}
