//! Per-cell result tables.
//!
//! A [`CellTable`] is the in-memory shape passed between the prediction,
//! classification, and serialization stages: one row per cell, a fixed
//! set of named columns of equal length.

use thiserror::Error;

use crate::CellId;

/// Errors raised when a column does not fit the table it is added to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableShapeError {
    /// Column length differs from the number of cells.
    #[error("column '{column}' has {actual} values but the table has {expected} cells")]
    LengthMismatch {
        /// Column name.
        column: String,
        /// Number of cells in the table.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    /// A column with this name already exists.
    #[error("column '{column}' already exists")]
    DuplicateColumn {
        /// Column name.
        column: String,
    },
}

/// Values of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Continuous values (concentrations, feature values).
    Number(Vec<f64>),
    /// Small integers (index values).
    Integer(Vec<i64>),
    /// Labels.
    Text(Vec<String>),
}

impl ColumnValues {
    /// Number of values in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Number(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Whether the column holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedColumn {
    /// Column name as exposed in serialized properties.
    pub name: String,
    /// Column values, one per cell.
    pub values: ColumnValues,
}

/// One row per cell with named, equally sized columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellTable {
    cell_ids: Vec<CellId>,
    columns: Vec<NamedColumn>,
}

impl CellTable {
    /// Creates a table with the given cells and no columns.
    #[must_use]
    pub const fn new(cell_ids: Vec<CellId>) -> Self {
        Self {
            cell_ids,
            columns: Vec::new(),
        }
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// Returns [`TableShapeError`] if the length does not match the cell
    /// count or the name is already taken.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: ColumnValues,
    ) -> Result<(), TableShapeError> {
        let name = name.into();

        if values.len() != self.cell_ids.len() {
            return Err(TableShapeError::LengthMismatch {
                column: name,
                expected: self.cell_ids.len(),
                actual: values.len(),
            });
        }

        if self.columns.iter().any(|c| c.name == name) {
            return Err(TableShapeError::DuplicateColumn { column: name });
        }

        self.columns.push(NamedColumn { name, values });
        Ok(())
    }

    /// Builder-style variant of [`Self::push_column`].
    ///
    /// # Errors
    ///
    /// See [`Self::push_column`].
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: ColumnValues,
    ) -> Result<Self, TableShapeError> {
        self.push_column(name, values)?;
        Ok(self)
    }

    /// Cell identifiers in row order.
    #[must_use]
    pub fn cell_ids(&self) -> &[CellId] {
        &self.cell_ids
    }

    /// All columns in insertion order.
    #[must_use]
    pub fn columns(&self) -> &[NamedColumn] {
        &self.columns
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.values)
    }

    /// Looks up a numeric column by name.
    #[must_use]
    pub fn numbers(&self, name: &str) -> Option<&[f64]> {
        match self.column(name)? {
            ColumnValues::Number(v) => Some(v),
            _ => None,
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<CellId> {
        (0..n).map(|i| CellId::new(i.to_string())).collect()
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut table = CellTable::new(ids(3));
        let err = table
            .push_column("x", ColumnValues::Number(vec![1.0, 2.0]))
            .unwrap_err();
        assert_eq!(
            err,
            TableShapeError::LengthMismatch {
                column: "x".to_string(),
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn rejects_duplicate_names() {
        let table = CellTable::new(ids(1))
            .with_column("x", ColumnValues::Number(vec![1.0]))
            .unwrap();
        assert!(matches!(
            table.with_column("x", ColumnValues::Integer(vec![1])),
            Err(TableShapeError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn numbers_only_matches_numeric_columns() {
        let table = CellTable::new(ids(2))
            .with_column("n", ColumnValues::Number(vec![1.0, 2.0]))
            .unwrap()
            .with_column("t", ColumnValues::Text(vec!["a".into(), "b".into()]))
            .unwrap();
        assert_eq!(table.numbers("n"), Some(&[1.0, 2.0][..]));
        assert_eq!(table.numbers("t"), None);
        assert_eq!(table.numbers("missing"), None);
    }
}
