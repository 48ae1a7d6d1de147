//! R-tree over polygon envelopes for point-in-union lookups.
//!
//! The filter stage asks one question per point: is it inside any of the
//! region polygons? Envelopes narrow the candidates; the provider settles
//! containment exactly.

use geo::{BoundingRect, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};

use crate::{Containment, GeometryProvider};

/// A polygon's position in the indexed slice plus its envelope.
struct PolygonEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index for a set of polygons.
///
/// Borrows the polygons and the provider; build it once per filter pass.
pub struct PolygonIndex<'a, P: GeometryProvider + ?Sized> {
    provider: &'a P,
    polygons: Vec<&'a MultiPolygon<f64>>,
    tree: RTree<PolygonEntry>,
}

impl<'a, P: GeometryProvider + ?Sized> PolygonIndex<'a, P> {
    /// Builds the R-tree. Polygons without a bounding box (no vertices) are
    /// left out of the tree since nothing can fall inside them.
    pub fn build(provider: &'a P, polygons: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let polygons: Vec<&MultiPolygon<f64>> = polygons.into_iter().collect();
        let mut entries = Vec::with_capacity(polygons.len());

        for (index, polygon) in polygons.iter().enumerate() {
            let Some(envelope) = compute_envelope(polygon) else {
                log::warn!("Polygon {index} has no vertices; skipping in spatial index");
                continue;
            };
            entries.push(PolygonEntry { index, envelope });
        }

        log::debug!("Built polygon index with {} entries", entries.len());

        Self {
            provider,
            polygons,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Locates `point` against the union of all indexed polygons.
    ///
    /// `Inside` wins over `OnBoundary`, which wins over `Indeterminate`;
    /// a point touching no candidate envelope is `Outside`.
    #[must_use]
    pub fn locate(&self, point: &Point<f64>) -> Containment {
        if !point.x().is_finite() || !point.y().is_finite() {
            return Containment::Indeterminate;
        }

        let query_env = AABB::from_point([point.x(), point.y()]);
        let mut best = Containment::Outside;

        for entry in self.tree.locate_in_envelope_intersecting(&query_env) {
            match self.provider.locate(self.polygons[entry.index], point) {
                Containment::Inside => return Containment::Inside,
                Containment::OnBoundary => best = Containment::OnBoundary,
                Containment::Indeterminate if best == Containment::Outside => {
                    best = Containment::Indeterminate;
                }
                Containment::Indeterminate | Containment::Outside => {}
            }
        }

        best
    }

    /// Index of the first polygon (in input order) containing `point`,
    /// boundary-inclusive.
    #[must_use]
    pub fn first_containing(&self, point: &Point<f64>) -> Option<usize> {
        let query_env = AABB::from_point([point.x(), point.y()]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| {
                self.provider
                    .locate(self.polygons[entry.index], point)
                    .is_contained()
            })
            .map(|entry| entry.index)
            .min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

#[cfg(test)]
mod tests {
    use geo::MultiPolygon;

    use super::*;
    use crate::GeoProvider;
    use crate::fixtures::square;

    #[test]
    fn locate_against_union() {
        let provider = GeoProvider::new();
        let polygons = [square(0.0, 0.0, 10.0), square(10.0, 0.0, 10.0)];
        let index = PolygonIndex::build(&provider, polygons.iter());

        assert_eq!(index.len(), 2);
        assert_eq!(index.locate(&Point::new(15.0, 5.0)), Containment::Inside);
        // Shared edge between the two squares.
        assert_eq!(index.locate(&Point::new(10.0, 5.0)), Containment::OnBoundary);
        assert_eq!(index.locate(&Point::new(25.0, 5.0)), Containment::Outside);
        assert_eq!(
            index.locate(&Point::new(f64::INFINITY, 5.0)),
            Containment::Indeterminate
        );
    }

    #[test]
    fn first_containing_prefers_input_order() {
        let provider = GeoProvider::new();
        let polygons = [square(0.0, 0.0, 10.0), square(5.0, 5.0, 10.0)];
        let index = PolygonIndex::build(&provider, polygons.iter());

        assert_eq!(index.first_containing(&Point::new(7.0, 7.0)), Some(0));
        assert_eq!(index.first_containing(&Point::new(12.0, 12.0)), Some(1));
        assert_eq!(index.first_containing(&Point::new(-1.0, 0.0)), None);
    }

    #[test]
    fn empty_polygons_are_skipped() {
        let provider = GeoProvider::new();
        let polygons = [MultiPolygon::<f64>(vec![]), square(0.0, 0.0, 1.0)];
        let index = PolygonIndex::build(&provider, polygons.iter());
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }
}
