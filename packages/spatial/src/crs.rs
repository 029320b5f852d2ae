//! Coordinate reference systems and reprojection between them.
//!
//! Only the three systems the grid data and map clients use are
//! supported. Every transform goes through geographic coordinates.

use std::{f64::consts::FRAC_PI_2, f64::consts::FRAC_PI_4, fmt, str::FromStr};

use geo::{Coord, MapCoords, MultiPolygon, Point};

use crate::SpatialError;

/// WGS84 semi-major axis in metres.
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;

/// WGS84 first eccentricity.
const ECCENTRICITY: f64 = 0.081_819_190_842_622;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326, longitude/latitude in degrees.
    #[default]
    Wgs84,
    /// EPSG:3395, ellipsoidal World Mercator in metres.
    WorldMercator,
    /// EPSG:3857, spherical Web Mercator in metres.
    WebMercator,
}

impl Crs {
    /// EPSG code.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WorldMercator => 3395,
            Self::WebMercator => 3857,
        }
    }

    /// Looks up a CRS by EPSG code.
    #[must_use]
    pub const fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Self::Wgs84),
            3395 => Some(Self::WorldMercator),
            3857 | 900_913 => Some(Self::WebMercator),
            _ => None,
        }
    }

    /// Converts a coordinate in this CRS to longitude/latitude degrees.
    #[must_use]
    pub fn to_wgs84(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Self::Wgs84 => c,
            Self::WebMercator => Coord {
                x: (c.x / SEMI_MAJOR_AXIS).to_degrees(),
                y: (2.0f64.mul_add((c.y / SEMI_MAJOR_AXIS).exp().atan(), -FRAC_PI_2))
                    .to_degrees(),
            },
            Self::WorldMercator => Coord {
                x: (c.x / SEMI_MAJOR_AXIS).to_degrees(),
                y: world_mercator_latitude(c.y).to_degrees(),
            },
        }
    }

    /// Converts longitude/latitude degrees to a coordinate in this CRS.
    #[must_use]
    pub fn project(self, c: Coord<f64>) -> Coord<f64> {
        let lon = c.x.to_radians();
        let lat = c.y.to_radians();

        match self {
            Self::Wgs84 => c,
            Self::WebMercator => Coord {
                x: SEMI_MAJOR_AXIS * lon,
                y: SEMI_MAJOR_AXIS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
            },
            Self::WorldMercator => {
                let e_sin = ECCENTRICITY * lat.sin();
                let correction = ((1.0 - e_sin) / (1.0 + e_sin)).powf(ECCENTRICITY / 2.0);
                Coord {
                    x: SEMI_MAJOR_AXIS * lon,
                    y: SEMI_MAJOR_AXIS * ((FRAC_PI_4 + lat / 2.0).tan() * correction).ln(),
                }
            }
        }
    }

    /// Converts a coordinate from this CRS to `to`.
    #[must_use]
    pub fn transform(self, to: Self, c: Coord<f64>) -> Coord<f64> {
        if self == to {
            c
        } else {
            to.project(self.to_wgs84(c))
        }
    }
}

/// Inverse of the ellipsoidal Mercator northing, by fixed-point iteration.
fn world_mercator_latitude(northing: f64) -> f64 {
    let t = (-northing / SEMI_MAJOR_AXIS).exp();
    let mut lat = 2.0f64.mul_add(-t.atan(), FRAC_PI_2);

    for _ in 0..15 {
        let e_sin = ECCENTRICITY * lat.sin();
        let next = 2.0f64.mul_add(
            -(t * ((1.0 - e_sin) / (1.0 + e_sin)).powf(ECCENTRICITY / 2.0)).atan(),
            FRAC_PI_2,
        );
        if (next - lat).abs() < 1e-12 {
            return next;
        }
        lat = next;
    }

    lat
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = SpatialError;

    /// Accepts `EPSG:3395`, `epsg:3395`, or a bare code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let code = trimmed
            .split_once(':')
            .map_or(trimmed, |(authority, code)| {
                if authority.eq_ignore_ascii_case("epsg") {
                    code
                } else {
                    ""
                }
            });

        code.parse()
            .ok()
            .and_then(Self::from_epsg)
            .ok_or_else(|| SpatialError::UnsupportedCrs {
                value: s.to_string(),
            })
    }
}

/// Reprojects a geometry between two systems.
#[must_use]
pub fn reproject(geometry: &MultiPolygon<f64>, from: Crs, to: Crs) -> MultiPolygon<f64> {
    if from == to {
        return geometry.clone();
    }
    geometry.map_coords(|c| from.transform(to, c))
}

/// Reprojects a point between two systems.
#[must_use]
pub fn reproject_point(point: Point<f64>, from: Crs, to: Crs) -> Point<f64> {
    Point::from(from.transform(to, point.0))
}
