//! Grid geometry stored in the `grids` table.

use env_insights_pollution_models::{CellId, GRID_ID_COLUMN};
use env_insights_spatial::{Crs, GeometrySource, Grid, parse_geojson_to_multipolygon};

use crate::{Store, StoreError, quote_identifier};

/// Name of the geometry table.
pub const GRID_TABLE: &str = "grids";

/// Reads the grid from the store's `grids` table: one row per cell with
/// `"Grid ID"` and a `geometry_geojson` TEXT column.
pub struct GridTableSource<'a> {
    store: &'a Store,
    crs: Crs,
}

impl<'a> GridTableSource<'a> {
    /// Creates a source whose geometry is in `crs`.
    #[must_use]
    pub const fn new(store: &'a Store, crs: Crs) -> Self {
        Self { store, crs }
    }
}

impl GeometrySource for GridTableSource<'_> {
    type Error = StoreError;

    fn load(&self) -> Result<Grid, StoreError> {
        if !self.store.table_exists(GRID_TABLE)? {
            return Err(StoreError::TableNotFound {
                bucket: "grid".to_string(),
                table: GRID_TABLE.to_string(),
            });
        }

        let conn = self.store.pool().acquire();
        let mut stmt = conn.prepare(&format!(
            "SELECT CAST({} AS VARCHAR), geometry_geojson FROM {} \
             WHERE geometry_geojson IS NOT NULL",
            quote_identifier(GRID_ID_COLUMN),
            quote_identifier(GRID_TABLE)
        ))?;
        let mut rows = stmt.query([])?;

        let mut cells = Vec::new();
        while let Some(row) = rows.next()? {
            let id: Option<String> = row.get(0)?;
            let Some(id) = id else {
                return Err(StoreError::MissingCellId {
                    table: GRID_TABLE.to_string(),
                });
            };
            let geojson: String = row.get(1)?;

            let Some(geometry) = parse_geojson_to_multipolygon(&geojson) else {
                return Err(StoreError::InvalidGeometry { cell: id });
            };
            cells.push((CellId::new(id), geometry));
        }

        let grid = Grid::new(self.crs, cells)?;
        log::info!("Loaded {} grid cells from {GRID_TABLE} ({})", grid.len(), self.crs);
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::fixture;

    #[test]
    fn loads_grid_from_table() {
        let path = fixture("grid");
        let store = Store::open(&path, 1).unwrap();

        let grid = GridTableSource::new(&store, Crs::Wgs84).load().unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.crs(), Crs::Wgs84);
        assert!(grid.contains(&CellId::from("1")));
        assert!(!grid.contains(&CellId::from("3")));

        drop(store);
        std::fs::remove_file(&path).unwrap();
    }
}
