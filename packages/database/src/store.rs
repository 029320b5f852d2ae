//! Time-bucketed feature vector and concentration tables.
//!
//! Table names are only ever derived from a validated [`TimeBucket`], and
//! every table is confirmed to exist with a parameterized
//! `information_schema` query before its name is interpolated into SQL.

use std::{collections::BTreeSet, path::Path};

use env_insights_features::{FeatureSchema, FeatureTable};
use env_insights_pollution_models::{
    CellId, CellTable, ColumnValues, GRID_ID_COLUMN, Pollutant, Quantile, TableKind, TimeBucket,
    prediction_column,
};

use crate::{DuckDbPool, StoreError, quote_identifier};

/// Read-only handle on the store.
pub struct Store {
    pool: DuckDbPool,
}

impl Store {
    /// Opens the `DuckDB` file at `path` with `pool_size` connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if the file cannot be opened.
    pub fn open(path: &Path, pool_size: usize) -> Result<Self, StoreError> {
        Ok(Self::from_pool(DuckDbPool::open(path, pool_size)?))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: DuckDbPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &DuckDbPool {
        &self.pool
    }

    /// Whether a table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if the lookup fails.
    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let conn = self.pool.acquire();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Names of all tables, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if the lookup fails.
    pub fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.acquire();
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' ORDER BY table_name",
        )?;
        let mut rows = stmt.query([])?;

        let mut tables = Vec::new();
        while let Some(row) = rows.next()? {
            tables.push(row.get(0)?);
        }
        Ok(tables)
    }

    /// Column names of a table in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if the lookup fails.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.acquire();
        let mut stmt = conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let mut rows = stmt.query([table])?;

        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(row.get(0)?);
        }
        Ok(columns)
    }

    /// Loads every schema column of the feature vector table for `bucket`.
    ///
    /// Missing or non-numeric values are held as `NaN`; columns outside the
    /// schema are not read.
    ///
    /// # Errors
    ///
    /// * [`StoreError::TableNotFound`] if the bucket has no table
    /// * [`StoreError::ColumnNotFound`] if a schema column is absent
    pub fn load_feature_table(
        &self,
        bucket: &TimeBucket,
        schema: &FeatureSchema,
    ) -> Result<FeatureTable, StoreError> {
        let table = self.require_table(TableKind::FeatureVector, bucket)?;
        let names: Vec<&str> = schema.columns().iter().map(String::as_str).collect();
        let (cell_ids, columns) = self.read_numeric_columns(&table, &names)?;

        log::debug!(
            "Loaded {} cells x {} features from {table}",
            cell_ids.len(),
            columns.len()
        );

        let columns = schema.columns().iter().cloned().zip(columns).collect();
        FeatureTable::new(cell_ids, columns).map_err(|e| StoreError::ColumnNotFound {
            table,
            column: e.to_string(),
        })
    }

    /// Loads one feature column for `bucket`.
    ///
    /// # Errors
    ///
    /// * [`StoreError::TableNotFound`] if the bucket has no table
    /// * [`StoreError::ColumnNotFound`] if the feature is absent
    pub fn load_feature_column(
        &self,
        bucket: &TimeBucket,
        feature: &str,
    ) -> Result<CellTable, StoreError> {
        let table = self.require_table(TableKind::FeatureVector, bucket)?;
        self.read_cell_table(&table, feature)
    }

    /// Loads the stored baseline prediction of `pollutant` at `quantile`
    /// for `bucket`, as the `"<pollutant> Prediction <quantile>"` column.
    ///
    /// # Errors
    ///
    /// * [`StoreError::TableNotFound`] if the bucket has no table
    /// * [`StoreError::ColumnNotFound`] if the prediction column is absent
    pub fn load_concentrations(
        &self,
        bucket: &TimeBucket,
        pollutant: Pollutant,
        quantile: &Quantile,
    ) -> Result<CellTable, StoreError> {
        let table = self.require_table(TableKind::AirPollutionConcentration, bucket)?;
        self.read_cell_table(&table, &prediction_column(pollutant, quantile))
    }

    fn require_table(&self, kind: TableKind, bucket: &TimeBucket) -> Result<String, StoreError> {
        let table = kind.table_name(bucket);
        if self.table_exists(&table)? {
            Ok(table)
        } else {
            Err(StoreError::TableNotFound {
                bucket: bucket.key(),
                table,
            })
        }
    }

    fn read_cell_table(&self, table: &str, column: &str) -> Result<CellTable, StoreError> {
        let (cell_ids, mut columns) = self.read_numeric_columns(table, &[column])?;
        let values = columns.pop().unwrap_or_default();

        CellTable::new(cell_ids)
            .with_column(column, ColumnValues::Number(values))
            .map_err(|e| StoreError::ColumnNotFound {
                table: table.to_string(),
                column: e.to_string(),
            })
    }

    /// Reads `"Grid ID"` and `columns` from an existing table. Values that
    /// are NULL or cannot be cast to a number come back as `NaN`. Every
    /// cell must appear in exactly one row.
    fn read_numeric_columns(
        &self,
        table: &str,
        columns: &[&str],
    ) -> Result<(Vec<CellId>, Vec<Vec<f64>>), StoreError> {
        let available = self.table_columns(table)?;
        for required in std::iter::once(&GRID_ID_COLUMN).chain(columns) {
            if !available.iter().any(|c| c == required) {
                return Err(StoreError::ColumnNotFound {
                    table: table.to_string(),
                    column: (*required).to_string(),
                });
            }
        }

        let select = std::iter::once(format!(
            "CAST({} AS VARCHAR)",
            quote_identifier(GRID_ID_COLUMN)
        ))
        .chain(
            columns
                .iter()
                .map(|c| format!("TRY_CAST({} AS DOUBLE)", quote_identifier(c))),
        )
        .collect::<Vec<_>>()
        .join(", ");
        let sql = format!("SELECT {select} FROM {}", quote_identifier(table));

        let conn = self.pool.acquire();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut cell_ids = Vec::new();
        let mut seen = BTreeSet::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];

        while let Some(row) = rows.next()? {
            let id: Option<String> = row.get(0)?;
            let id = id.ok_or_else(|| StoreError::MissingCellId {
                table: table.to_string(),
            })?;
            if !seen.insert(id.clone()) {
                return Err(StoreError::DuplicateCellId {
                    table: table.to_string(),
                    cell: id,
                });
            }
            cell_ids.push(CellId::new(id));

            for (i, column) in values.iter_mut().enumerate() {
                let value: Option<f64> = row.get(i + 1)?;
                column.push(value.unwrap_or(f64::NAN));
            }
        }

        Ok((cell_ids, values))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use env_insights_pollution_models::Weekday;
    use std::path::PathBuf;

    /// Creates a store file with one feature table and one concentration
    /// table for `Month_1_Day_Monday_Hour_8`.
    pub fn fixture(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "env_insights_store_{name}_{}.duckdb",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let conn = duckdb::Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "feature_vector_Month_1_Day_Monday_Hour_8" (
                "Grid ID" BIGINT,
                "Bicycle Score" DOUBLE,
                "Urban" VARCHAR,
                "Unused" DOUBLE
            );
            INSERT INTO "feature_vector_Month_1_Day_Monday_Hour_8" VALUES
                (1, 10.0, '0.5', 0.0),
                (2, 20.0, 'n/a', 0.0),
                (3, NULL, '0.25', 0.0);

            CREATE TABLE "air_pollution_concentration_Month_1_Day_Monday_Hour_8" (
                "Grid ID" BIGINT,
                "no2 Prediction mean" DOUBLE
            );
            INSERT INTO "air_pollution_concentration_Month_1_Day_Monday_Hour_8" VALUES
                (1, 12.5), (2, 70.0), (3, 300.0);

            CREATE TABLE "feature_vector_Month_1_Day_Tuesday_Hour_8" (
                "Grid ID" BIGINT,
                "Bicycle Score" DOUBLE,
                "Urban" DOUBLE
            );
            INSERT INTO "feature_vector_Month_1_Day_Tuesday_Hour_8" VALUES
                (1, 10.0, 0.5),
                (2, 20.0, 0.5),
                (1, 30.0, 0.5);

            CREATE TABLE grids ("Grid ID" BIGINT, geometry_geojson VARCHAR);
            INSERT INTO grids VALUES
                (1, '{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}'),
                (2, '{"type":"Polygon","coordinates":[[[1,0],[2,0],[2,1],[1,1],[1,0]]]}');
            "#,
        )
        .unwrap();
        drop(conn);

        path
    }

    pub fn monday_8am() -> TimeBucket {
        TimeBucket::new(1, Weekday::Monday, 8).unwrap()
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(1, vec!["Bicycle Score".to_string(), "Urban".to_string()]).unwrap()
    }

    #[test]
    fn loads_feature_table_in_schema_order() {
        let path = fixture("features");
        let store = Store::open(&path, 2).unwrap();

        let table = store.load_feature_table(&monday_8am(), &schema()).unwrap();

        assert_eq!(table.column_names(), schema().columns());
        assert_eq!(
            table.cell_ids(),
            &[CellId::from("1"), CellId::from("2"), CellId::from("3")]
        );
        let bicycle = table.column("Bicycle Score").unwrap();
        assert_eq!(&bicycle[..2], &[10.0, 20.0]);
        assert!(bicycle[2].is_nan());

        let urban = table.column("Urban").unwrap();
        assert!((urban[0] - 0.5).abs() < 1e-12);
        assert!(urban[1].is_nan());
        assert!(!table.has_column("Unused"));

        drop(store);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_bucket_is_table_not_found() {
        let path = fixture("missing_bucket");
        let store = Store::open(&path, 1).unwrap();
        let bucket = TimeBucket::new(2, Weekday::Sunday, 23).unwrap();

        let err = store.load_feature_table(&bucket, &schema()).unwrap_err();
        match err {
            StoreError::TableNotFound { bucket, table } => {
                assert_eq!(bucket, "Month_2_Day_Sunday_Hour_23");
                assert_eq!(table, "feature_vector_Month_2_Day_Sunday_Hour_23");
            }
            other => panic!("unexpected error: {other}"),
        }

        drop(store);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn repeated_cell_id_is_rejected() {
        let path = fixture("duplicate_cell");
        let store = Store::open(&path, 1).unwrap();
        let bucket = TimeBucket::new(1, Weekday::Tuesday, 8).unwrap();

        let err = store.load_feature_table(&bucket, &schema()).unwrap_err();
        match err {
            StoreError::DuplicateCellId { table, cell } => {
                assert_eq!(table, "feature_vector_Month_1_Day_Tuesday_Hour_8");
                assert_eq!(cell, "1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            store.load_feature_column(&bucket, "Urban"),
            Err(StoreError::DuplicateCellId { .. })
        ));

        drop(store);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_schema_column_is_reported() {
        let path = fixture("missing_column");
        let store = Store::open(&path, 1).unwrap();
        let schema =
            FeatureSchema::new(1, vec!["Bicycle Score".to_string(), "HGV Score".to_string()])
                .unwrap();

        let err = store.load_feature_table(&monday_8am(), &schema).unwrap_err();
        assert!(
            matches!(&err, StoreError::ColumnNotFound { column, .. } if column == "HGV Score"),
            "{err}"
        );

        drop(store);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn loads_concentrations_and_single_features() {
        let path = fixture("concentrations");
        let store = Store::open(&path, 1).unwrap();

        let concentrations = store
            .load_concentrations(&monday_8am(), Pollutant::No2, &Quantile::mean())
            .unwrap();
        assert_eq!(
            concentrations.numbers("no2 Prediction mean"),
            Some(&[12.5, 70.0, 300.0][..])
        );

        assert!(matches!(
            store.load_concentrations(&monday_8am(), Pollutant::O3, &Quantile::mean()),
            Err(StoreError::ColumnNotFound { .. })
        ));

        let feature = store
            .load_feature_column(&monday_8am(), "Bicycle Score")
            .unwrap();
        assert_eq!(feature.len(), 3);
        assert_eq!(feature.columns()[0].name, "Bicycle Score");

        drop(store);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn lists_tables() {
        let path = fixture("list");
        let store = Store::open(&path, 1).unwrap();

        let tables = store.list_tables().unwrap();
        assert_eq!(
            tables,
            vec![
                "air_pollution_concentration_Month_1_Day_Monday_Hour_8".to_string(),
                "feature_vector_Month_1_Day_Monday_Hour_8".to_string(),
                "feature_vector_Month_1_Day_Tuesday_Hour_8".to_string(),
                "grids".to_string(),
            ]
        );
        assert!(store.table_exists("grids").unwrap());
        assert!(!store.table_exists("grids\"; DROP TABLE grids; --").unwrap());

        drop(store);
        std::fs::remove_file(&path).unwrap();
    }
}
