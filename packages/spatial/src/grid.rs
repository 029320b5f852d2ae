//! The spatial grid: cell geometry keyed by cell identifier.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use env_insights_pollution_models::{CellId, GRID_ID_COLUMN};
use geo::{Centroid, MultiPolygon, Point};
use geojson::GeoJson;

use crate::{Crs, GeometryPrecision, SpatialError, reproject_point};

/// Immutable cell geometry for the whole service region.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    crs: Crs,
    cells: BTreeMap<CellId, MultiPolygon<f64>>,
}

impl Grid {
    /// Builds a grid from cells in `crs`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateCell`] if an identifier repeats.
    pub fn new(
        crs: Crs,
        cells: impl IntoIterator<Item = (CellId, MultiPolygon<f64>)>,
    ) -> Result<Self, SpatialError> {
        let mut map = BTreeMap::new();
        for (id, geometry) in cells {
            if map.contains_key(&id) {
                return Err(SpatialError::DuplicateCell { cell: id });
            }
            map.insert(id, geometry);
        }
        Ok(Self { crs, cells: map })
    }

    /// CRS the geometry is stored in.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Geometry of one cell.
    #[must_use]
    pub fn get(&self, id: &CellId) -> Option<&MultiPolygon<f64>> {
        self.cells.get(id)
    }

    /// Whether the grid has a cell.
    #[must_use]
    pub fn contains(&self, id: &CellId) -> bool {
        self.cells.contains_key(id)
    }

    /// All cells ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&CellId, &MultiPolygon<f64>)> {
        self.cells.iter()
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Centroid of a cell as WGS84 longitude/latitude.
    #[must_use]
    pub fn centroid_wgs84(&self, id: &CellId) -> Option<Point<f64>> {
        let centroid = self.cells.get(id)?.centroid()?;
        Some(reproject_point(centroid, self.crs, Crs::Wgs84))
    }

    /// Returns a copy with every cell reprojected and simplified per
    /// `precision`. The result is in `precision.output_crs`, so joining it
    /// with [`GeometryPrecision::exact`] in that CRS does no further
    /// geometry work.
    #[must_use]
    pub fn prepare(&self, precision: &GeometryPrecision) -> Self {
        let cells = self
            .cells
            .iter()
            .map(|(id, geometry)| (id.clone(), precision.apply(geometry, self.crs)))
            .collect();

        log::info!(
            "Prepared {} grid cells: {} -> {} (tolerance {})",
            self.cells.len(),
            self.crs,
            precision.output_crs,
            precision
                .tolerance
                .map_or_else(|| "none".to_string(), |t| t.to_string())
        );

        Self {
            crs: precision.output_crs,
            cells,
        }
    }
}

/// Anything that can produce the grid at startup.
pub trait GeometrySource {
    /// Error type of the source.
    type Error: std::error::Error;

    /// Loads every cell.
    ///
    /// # Errors
    ///
    /// Returns the source's error if the geometry cannot be read.
    fn load(&self) -> Result<Grid, Self::Error>;
}

/// Grid stored as a GeoJSON `FeatureCollection` file whose features carry
/// a `"Grid ID"` property.
#[derive(Debug, Clone)]
pub struct GeoJsonFileSource {
    path: PathBuf,
    crs: Crs,
}

impl GeoJsonFileSource {
    /// Creates a source for `path`, whose coordinates are in `crs`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, crs: Crs) -> Self {
        Self {
            path: path.into(),
            crs,
        }
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GeometrySource for GeoJsonFileSource {
    type Error = SpatialError;

    fn load(&self) -> Result<Grid, SpatialError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| SpatialError::Io {
            path: self.path.clone(),
            source,
        })?;

        let grid = parse_grid_collection(&text, self.crs)?;
        log::info!(
            "Loaded {} grid cells from {} ({})",
            grid.len(),
            self.path.display(),
            self.crs
        );
        Ok(grid)
    }
}

/// Parses a `FeatureCollection` into a grid.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidGeoJson`] if the text is not a
/// `FeatureCollection`, [`SpatialError::InvalidFeature`] for a feature
/// without a usable id or polygon geometry, and
/// [`SpatialError::DuplicateCell`] for a repeated id.
pub fn parse_grid_collection(text: &str, crs: Crs) -> Result<Grid, SpatialError> {
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| {
        SpatialError::InvalidGeoJson {
            message: e.to_string(),
        }
    })?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(SpatialError::InvalidGeoJson {
            message: "expected a FeatureCollection".to_string(),
        });
    };

    let cells = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| -> Result<_, SpatialError> {
            let id = feature
                .property(GRID_ID_COLUMN)
                .and_then(cell_id_from_json)
                .ok_or_else(|| SpatialError::InvalidFeature {
                    index,
                    message: format!("missing or non-scalar '{GRID_ID_COLUMN}' property"),
                })?;

            let geometry = feature
                .geometry
                .and_then(geometry_to_multipolygon)
                .ok_or_else(|| SpatialError::InvalidFeature {
                    index,
                    message: format!("cell {id} has no polygon geometry"),
                })?;

            Ok((id, geometry))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Grid::new(crs, cells)
}

/// Reads a cell identifier from a JSON scalar. Whole numbers are rendered
/// without a fractional part so `7` and `7.0` name the same cell.
#[must_use]
pub fn cell_id_from_json(value: &serde_json::Value) -> Option<CellId> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(CellId::new(s.as_str())),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(CellId::new(i.to_string()))
            } else if let Some(u) = n.as_u64() {
                Some(CellId::new(u.to_string()))
            } else {
                n.as_f64().map(|f| {
                    #[allow(clippy::cast_possible_truncation)]
                    let whole = f as i64;
                    if f.fract() == 0.0 && f.abs() < 9.0e15 {
                        CellId::new(whole.to_string())
                    } else {
                        CellId::new(f.to_string())
                    }
                })
            }
        }
        _ => None,
    }
}

/// Parses a `GeoJSON` geometry string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    match geojson {
        GeoJson::Geometry(geom) => geometry_to_multipolygon(geom),
        GeoJson::Feature(feature) => feature.geometry.and_then(geometry_to_multipolygon),
        GeoJson::FeatureCollection(_) => None,
    }
}

fn geometry_to_multipolygon(geom: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}
