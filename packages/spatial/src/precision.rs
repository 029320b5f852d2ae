//! Output geometry precision: simplification tolerance and output CRS.

use std::fmt;

use geo::{MultiPolygon, SimplifyVwPreserve};

use crate::{Crs, reproject};

/// A simplification tolerance in the units of a specific CRS.
///
/// `0.001` means a thousandth of a degree in EPSG:4326 but a millimetre in
/// EPSG:3395, so the value is never used without its CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Linear tolerance in `crs` units.
    pub value: f64,
    /// CRS the tolerance is expressed in, and simplification runs in.
    pub crs: Crs,
}

impl Tolerance {
    /// Triangle-area threshold used by Visvalingam-Whyatt simplification.
    ///
    /// A vertex is dropped when the triangle it forms with its neighbours
    /// is smaller than `value²`. For neighbours a chord of length `L` apart
    /// that means an offset from the chord below `2 * value² / L`, so the
    /// tolerance only matches a linear (Douglas-Peucker) distance for edges
    /// of length `2 * value`. Longer edges keep smaller deviations: at
    /// `0.001` degrees, a vertex midway along a 0.01 degree edge survives
    /// any offset of `0.0002` or more.
    #[must_use]
    pub fn area_epsilon(self) -> f64 {
        self.value * self.value
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            value: 0.001,
            crs: Crs::Wgs84,
        }
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value, self.crs)
    }
}

/// How geometry is rendered for transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryPrecision {
    /// Simplification tolerance, or `None` to keep every vertex.
    pub tolerance: Option<Tolerance>,
    /// CRS of the serialized coordinates.
    pub output_crs: Crs,
}

impl GeometryPrecision {
    /// Reprojection to `output_crs` without simplification.
    #[must_use]
    pub const fn exact(output_crs: Crs) -> Self {
        Self {
            tolerance: None,
            output_crs,
        }
    }

    /// Reprojects `geometry` from `from` into the tolerance CRS, simplifies
    /// it there preserving topology, then reprojects to the output CRS.
    #[must_use]
    pub fn apply(&self, geometry: &MultiPolygon<f64>, from: Crs) -> MultiPolygon<f64> {
        let Some(tolerance) = self.tolerance else {
            return reproject(geometry, from, self.output_crs);
        };

        let working = reproject(geometry, from, tolerance.crs);
        let simplified = working.simplify_vw_preserve(tolerance.area_epsilon());
        reproject(&simplified, tolerance.crs, self.output_crs)
    }
}

impl Default for GeometryPrecision {
    fn default() -> Self {
        Self {
            tolerance: Some(Tolerance::default()),
            output_crs: Crs::Wgs84,
        }
    }
}
