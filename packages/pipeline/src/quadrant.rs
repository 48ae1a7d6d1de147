//! Quadrant labels around the centroid of the polygon union.

use std::fmt;

use crime_atlas_dataset_models::{AttributeValue, PolygonDataset};
use crime_atlas_spatial::GeometryProvider;
use geo::{MultiPolygon, Point};

/// Field written by [`classify_quadrant`].
pub const QUADRANT_FIELD: &str = "quadrant";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Quadrant {
    /// Quadrant of `point` relative to `centre`. East and north are strict,
    /// so a point level with the centre falls west or south.
    #[must_use]
    pub fn of(point: Point<f64>, centre: Point<f64>) -> Self {
        match (point.x() > centre.x(), point.y() > centre.y()) {
            (true, true) => Self::NorthEast,
            (false, true) => Self::NorthWest,
            (true, false) => Self::SouthEast,
            (false, false) => Self::SouthWest,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NorthEast => "northeast",
            Self::NorthWest => "northwest",
            Self::SouthEast => "southeast",
            Self::SouthWest => "southwest",
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels every polygon with its [`Quadrant`] in [`QUADRANT_FIELD`].
///
/// The centre is the centroid of the union of all polygons; each polygon
/// is placed by its representative point. Polygons with no representative
/// point, or every polygon when the union is empty, get `Missing`. The
/// result does not depend on polygon order.
#[must_use]
pub fn classify_quadrant<P: GeometryProvider + ?Sized>(
    mut polygons: PolygonDataset,
    provider: &P,
) -> PolygonDataset {
    let geometries: Vec<&MultiPolygon<f64>> = polygons.geometries().collect();
    let centre = provider.union_centroid(&geometries);

    let labels: Vec<AttributeValue> = geometries
        .iter()
        .map(|g| {
            centre
                .zip(provider.representative_point(g))
                .map_or(AttributeValue::Missing, |(c, rep)| {
                    Quadrant::of(rep, c).as_str().into()
                })
        })
        .collect();

    match centre {
        Some(c) => log::info!("Union centroid at ({:.1}, {:.1})", c.x(), c.y()),
        None => log::warn!("Polygon union is empty; quadrants left missing"),
    }

    for (feature, label) in polygons.features.iter_mut().zip(labels) {
        feature.attributes.insert(QUADRANT_FIELD, label);
    }
    polygons
}
