#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry capabilities used by the atlas pipeline.
//!
//! The orchestration code never calls a geometry engine directly; it goes
//! through [`GeometryProvider`]. [`GeoProvider`] is the default
//! implementation, backed by the `geo` crate and the built-in transforms in
//! [`transform`]. [`PolygonIndex`] wraps a provider with an R-tree over
//! polygon envelopes for fast point-in-union lookups.

pub mod index;
pub mod transform;

use crime_atlas_dataset_models::Crs;
use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{Area, BooleanOps, Centroid, Coord, CoordsIter, MapCoords, MultiPolygon, Point};
use thiserror::Error;

pub use index::PolygonIndex;

/// Errors that can occur during spatial operations.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The reference system is not one the provider can transform.
    #[error("Cannot transform coordinates in {crs}")]
    UnknownCrs {
        /// Display form of the offending CRS.
        crs: String,
    },

    /// The coordinate has no representation in the given system.
    #[error("Coordinate ({x}, {y}) is outside the domain of {crs}")]
    OutOfDomain {
        /// Display form of the CRS whose domain was exceeded.
        crs: String,
        x: f64,
        y: f64,
    },
}

/// Result of locating a point relative to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Inside,
    /// On an edge or vertex.
    OnBoundary,
    Outside,
    /// The test could not be decided: non-finite coordinates or a
    /// zero-area polygon.
    Indeterminate,
}

impl Containment {
    /// Boundary-inclusive containment.
    #[must_use]
    pub const fn is_contained(self) -> bool {
        matches!(self, Self::Inside | Self::OnBoundary)
    }
}

/// Geometry operations the pipeline depends on.
///
/// Implementations can wrap any geometry engine; the pipeline only sees
/// `geo-types` values going in and out.
pub trait GeometryProvider {
    /// Transforms one coordinate between reference systems.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if either CRS is unsupported or the
    /// coordinate is outside the target's domain.
    fn transform(&self, coord: Coord<f64>, from: &Crs, to: &Crs) -> Result<Coord<f64>, SpatialError>;

    /// Locates `point` relative to `polygon`.
    fn locate(&self, polygon: &MultiPolygon<f64>, point: &Point<f64>) -> Containment;

    /// Centroid of the union of `polygons`, or `None` if the union is empty.
    fn union_centroid(&self, polygons: &[&MultiPolygon<f64>]) -> Option<Point<f64>>;

    /// A single coordinate standing for `polygon` (label point), or `None`
    /// when the polygon has no usable area.
    fn representative_point(&self, polygon: &MultiPolygon<f64>) -> Option<Point<f64>>;

    /// Transforms every vertex of a multipolygon.
    ///
    /// # Errors
    ///
    /// Returns the first [`SpatialError`] raised by [`Self::transform`].
    fn transform_polygon(
        &self,
        polygon: &MultiPolygon<f64>,
        from: &Crs,
        to: &Crs,
    ) -> Result<MultiPolygon<f64>, SpatialError> {
        polygon.try_map_coords(|c| self.transform(c, from, to))
    }
}

/// [`GeometryProvider`] backed by the `geo` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoProvider;

impl GeoProvider {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Whether a polygon can take part in containment tests at all.
fn is_degenerate(polygon: &MultiPolygon<f64>) -> bool {
    if !polygon.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
        return true;
    }
    let area = polygon.unsigned_area();
    !area.is_finite() || area <= 0.0
}

impl GeometryProvider for GeoProvider {
    fn transform(&self, coord: Coord<f64>, from: &Crs, to: &Crs) -> Result<Coord<f64>, SpatialError> {
        transform::transform_coord(coord, from, to)
    }

    fn locate(&self, polygon: &MultiPolygon<f64>, point: &Point<f64>) -> Containment {
        if !point.x().is_finite() || !point.y().is_finite() || is_degenerate(polygon) {
            return Containment::Indeterminate;
        }

        match polygon.coordinate_position(&point.0) {
            CoordPos::Inside => Containment::Inside,
            CoordPos::OnBoundary => Containment::OnBoundary,
            CoordPos::Outside => Containment::Outside,
        }
    }

    fn union_centroid(&self, polygons: &[&MultiPolygon<f64>]) -> Option<Point<f64>> {
        let mut valid = polygons.iter().filter(|p| !is_degenerate(p));
        let first = (*valid.next()?).clone();
        let union = valid.fold(first, |acc, p| acc.union(*p));
        union.centroid()
    }

    fn representative_point(&self, polygon: &MultiPolygon<f64>) -> Option<Point<f64>> {
        if is_degenerate(polygon) {
            return None;
        }
        polygon.centroid()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use geo::{MultiPolygon, polygon};

    /// Axis-aligned square as a one-part multipolygon.
    pub fn square(min_x: f64, min_y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: min_x, y: min_y),
            (x: min_x + size, y: min_y),
            (x: min_x + size, y: min_y + size),
            (x: min_x, y: min_y + size),
            (x: min_x, y: min_y),
        ]])
    }
}
