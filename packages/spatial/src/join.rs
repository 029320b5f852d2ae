//! Joining per-cell results onto grid geometry.

use env_insights_pollution_models::{CellId, CellTable, ColumnValues, GRID_ID_COLUMN};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue, feature::Id};

use crate::{GeometryPrecision, Grid, SpatialError};

/// How many unmatched identifiers a [`JoinReport`] keeps.
const DROPPED_SAMPLE_SIZE: usize = 10;

/// Outcome of a join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Result rows that found a grid cell.
    pub matched: usize,
    /// Result rows without a grid cell, dropped from the output.
    pub dropped: usize,
    /// Up to ten of the dropped identifiers.
    pub dropped_sample: Vec<CellId>,
}

impl JoinReport {
    /// Whether every result row was matched.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

/// A serialized `FeatureCollection` and how the join went.
#[derive(Debug, Clone)]
pub struct JoinedPayload {
    /// `FeatureCollection` text.
    pub geojson: String,
    /// Join statistics.
    pub report: JoinReport,
}

/// Inner-joins `rows` onto `grid` by cell identifier.
///
/// Features follow the row order of `rows`. Each carries the cell id as its
/// `id`, and a `"Grid ID"` property followed by every column of `rows`.
/// Rows without a grid cell are dropped and counted in the report.
#[must_use]
pub fn join(
    grid: &Grid,
    rows: &CellTable,
    precision: &GeometryPrecision,
) -> (FeatureCollection, JoinReport) {
    let mut report = JoinReport::default();
    let mut features = Vec::with_capacity(rows.len());

    for (i, id) in rows.cell_ids().iter().enumerate() {
        let Some(geometry) = grid.get(id) else {
            report.dropped += 1;
            if report.dropped_sample.len() < DROPPED_SAMPLE_SIZE {
                report.dropped_sample.push(id.clone());
            }
            continue;
        };

        let rendered = precision.apply(geometry, grid.crs());

        let mut properties = JsonObject::new();
        properties.insert(GRID_ID_COLUMN.to_string(), cell_id_to_json(id));
        for column in rows.columns() {
            properties.insert(column.name.clone(), column_value(&column.values, i));
        }

        features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&rendered))),
            id: Some(cell_id_to_feature_id(id)),
            properties: Some(properties),
            foreign_members: None,
        });
        report.matched += 1;
    }

    if !report.is_complete() {
        log::warn!(
            "Geometry join incomplete: {} of {} result rows have no grid cell (e.g. {})",
            report.dropped,
            rows.len(),
            report
                .dropped_sample
                .iter()
                .map(CellId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    (
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        report,
    )
}

/// Joins `rows` onto `grid` and serializes the result.
///
/// # Errors
///
/// Returns [`SpatialError::Serialize`] if the collection cannot be written.
pub fn join_and_serialize(
    grid: &Grid,
    rows: &CellTable,
    precision: &GeometryPrecision,
) -> Result<JoinedPayload, SpatialError> {
    let (collection, report) = join(grid, rows, precision);
    let geojson = serde_json::to_string(&collection)?;

    log::debug!(
        "Serialized {} features ({} bytes)",
        report.matched,
        geojson.len()
    );

    Ok(JoinedPayload { geojson, report })
}

fn cell_id_to_json(id: &CellId) -> JsonValue {
    id.as_str()
        .parse::<i64>()
        .map_or_else(|_| JsonValue::from(id.as_str()), JsonValue::from)
}

fn cell_id_to_feature_id(id: &CellId) -> Id {
    id.as_str().parse::<i64>().map_or_else(
        |_| Id::String(id.to_string()),
        |n| Id::Number(serde_json::Number::from(n)),
    )
}

fn column_value(values: &ColumnValues, row: usize) -> JsonValue {
    match values {
        ColumnValues::Number(v) => serde_json::Number::from_f64(v[row])
            .map_or(JsonValue::Null, JsonValue::Number),
        ColumnValues::Integer(v) => JsonValue::from(v[row]),
        ColumnValues::Text(v) => JsonValue::from(v[row].as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Crs;
    use geo::{MultiPolygon, Rect, coord};
    use geojson::GeoJson;

    fn cell(x: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![
            Rect::new(coord! { x: x, y: 50.0 }, coord! { x: x + 0.01, y: 50.01 }).to_polygon(),
        ])
    }

    fn grid() -> Grid {
        Grid::new(
            Crs::Wgs84,
            vec![
                (CellId::from("1"), cell(0.0)),
                (CellId::from("2"), cell(0.01)),
                (CellId::from("3"), cell(0.02)),
            ],
        )
        .unwrap()
    }

    fn rows(ids: &[&str]) -> CellTable {
        CellTable::new(ids.iter().map(|id| CellId::from(*id)).collect())
            .with_column(
                "no2 Prediction mean",
                ColumnValues::Number((10..).take(ids.len()).map(f64::from).collect()),
            )
            .unwrap()
            .with_column("no2 AQI", ColumnValues::Integer(vec![1; ids.len()]))
            .unwrap()
            .with_column(
                "no2 AQI Band",
                ColumnValues::Text(vec!["Low".to_string(); ids.len()]),
            )
            .unwrap()
    }

    #[test]
    fn output_ids_are_the_intersection() {
        let payload =
            join_and_serialize(&grid(), &rows(&["3", "1", "99"]), &GeometryPrecision::default())
                .unwrap();

        assert_eq!(payload.report.matched, 2);
        assert_eq!(payload.report.dropped, 1);
        assert_eq!(payload.report.dropped_sample, vec![CellId::from("99")]);

        let GeoJson::FeatureCollection(parsed) = payload.geojson.parse::<GeoJson>().unwrap() else {
            panic!("expected a FeatureCollection");
        };
        let ids: Vec<_> = parsed
            .features
            .iter()
            .map(|f| f.property(GRID_ID_COLUMN).unwrap().clone())
            .collect();
        assert_eq!(ids, vec![serde_json::json!(3), serde_json::json!(1)]);
    }

    #[test]
    fn properties_carry_every_column() {
        let (collection, report) =
            join(&grid(), &rows(&["2"]), &GeometryPrecision::exact(Crs::Wgs84));
        assert!(report.is_complete());

        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(Id::Number(2.into())));
        assert_eq!(
            feature.property("no2 Prediction mean"),
            Some(&serde_json::json!(10.0))
        );
        assert_eq!(feature.property("no2 AQI"), Some(&serde_json::json!(1)));
        assert_eq!(
            feature.property("no2 AQI Band"),
            Some(&serde_json::json!("Low"))
        );
        assert!(feature.geometry.is_some());
    }

    #[test]
    fn non_finite_values_become_null() {
        let table = CellTable::new(vec![CellId::from("1")])
            .with_column("x", ColumnValues::Number(vec![f64::NAN]))
            .unwrap();
        let (collection, _) = join(&grid(), &table, &GeometryPrecision::exact(Crs::Wgs84));
        assert_eq!(
            collection.features[0].property("x"),
            Some(&serde_json::Value::Null)
        );
    }

    #[test]
    fn text_ids_stay_strings() {
        let grid = Grid::new(Crs::Wgs84, vec![(CellId::from("A7"), cell(0.0))]).unwrap();
        let (collection, _) = join(
            &grid,
            &CellTable::new(vec![CellId::from("A7")]),
            &GeometryPrecision::exact(Crs::Wgs84),
        );
        assert_eq!(collection.features[0].id, Some(Id::String("A7".to_string())));
        assert_eq!(
            collection.features[0].property(GRID_ID_COLUMN),
            Some(&serde_json::json!("A7"))
        );
    }

    #[test]
    fn empty_results_serialize_to_empty_collection() {
        let payload = join_and_serialize(
            &grid(),
            &CellTable::new(Vec::new()),
            &GeometryPrecision::default(),
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload.geojson).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        assert_eq!(parsed["features"], serde_json::json!([]));
    }
}
