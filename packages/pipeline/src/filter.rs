//! Reprojection and point-in-polygon filtering.
//!
//! Spatial comparisons only happen between datasets in the same declared
//! CRS. Callers reproject first; [`filter_within`] and
//! [`count_points_within`] refuse mismatched inputs instead of comparing
//! coordinates from different systems.

use crime_atlas_dataset_models::{
    AttributeTable, AttributeValue, Crs, PointDataset, PointFeature, PolygonDataset,
    PolygonFeature,
};
use crime_atlas_spatial::{Containment, GeometryProvider, PolygonIndex, SpatialError};
use geo::Point;

use crate::PipelineError;

fn ensure_transformable(from: &Crs, to: &Crs) -> Result<(), PipelineError> {
    let unknown = [from, to].into_iter().find(|crs| !crs.is_known());
    match unknown {
        Some(crs) => Err(PipelineError::Projection {
            from: from.clone(),
            to: to.clone(),
            source: SpatialError::UnknownCrs {
                crs: crs.to_string(),
            },
        }),
        None => Ok(()),
    }
}

/// Both datasets must declare the same CRS, and an undeclared CRS never
/// matches anything.
fn ensure_same_crs(points: &Crs, polygons: &Crs) -> Result<(), PipelineError> {
    let undeclared = matches!(points, Crs::Unknown(d) if d.is_empty());
    if points != polygons || undeclared {
        return Err(PipelineError::CrsMismatch {
            points: points.clone(),
            polygons: polygons.clone(),
        });
    }
    Ok(())
}

/// Transforms every point into `target`.
///
/// Point ids and attributes are carried over unchanged. A dataset already
/// in `target` is returned as-is.
///
/// # Errors
///
/// Returns [`PipelineError::Projection`] if either CRS is unknown or a
/// coordinate cannot be represented in `target`.
pub fn reproject<P: GeometryProvider + ?Sized>(
    points: PointDataset,
    target: &Crs,
    provider: &P,
) -> Result<PointDataset, PipelineError> {
    let from = points.crs.clone();
    ensure_transformable(&from, target)?;
    if from == *target {
        return Ok(points);
    }

    let features = points
        .features
        .into_iter()
        .map(|f| {
            let coord = provider
                .transform(f.geometry.0, &from, target)
                .map_err(|source| PipelineError::Projection {
                    from: from.clone(),
                    to: target.clone(),
                    source,
                })?;
            Ok(PointFeature {
                geometry: Point(coord),
                ..f
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    log::info!("Reprojected {} points from {from} to {target}", features.len());
    Ok(PointDataset::new(target.clone(), features))
}

/// Transforms every polygon vertex into `target`.
///
/// # Errors
///
/// Same conditions as [`reproject`].
pub fn reproject_polygons<P: GeometryProvider + ?Sized>(
    polygons: PolygonDataset,
    target: &Crs,
    provider: &P,
) -> Result<PolygonDataset, PipelineError> {
    let from = polygons.crs.clone();
    ensure_transformable(&from, target)?;
    if from == *target {
        return Ok(polygons);
    }

    let features = polygons
        .features
        .into_iter()
        .map(|f| {
            let geometry = provider
                .transform_polygon(&f.geometry, &from, target)
                .map_err(|source| PipelineError::Projection {
                    from: from.clone(),
                    to: target.clone(),
                    source,
                })?;
            Ok(PolygonFeature { geometry, ..f })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    log::info!("Reprojected {} polygons from {from} to {target}", features.len());
    Ok(PolygonDataset::new(target.clone(), features))
}

/// Keeps the points contained in the union of `polygons`.
///
/// Containment is boundary-inclusive: a point on an edge or vertex is
/// kept. Points whose containment cannot be decided (non-finite
/// coordinates, or only degenerate candidate polygons) are dropped. The
/// result is an order-preserving subset of `points`.
///
/// # Errors
///
/// Returns [`PipelineError::CrsMismatch`] unless both datasets declare the
/// same CRS.
pub fn filter_within<P: GeometryProvider + ?Sized>(
    points: PointDataset,
    polygons: &PolygonDataset,
    provider: &P,
) -> Result<PointDataset, PipelineError> {
    ensure_same_crs(&points.crs, &polygons.crs)?;

    let index = PolygonIndex::build(provider, polygons.geometries());
    let mut indeterminate = 0_usize;
    let keep: Vec<bool> = points
        .features
        .iter()
        .map(|f| match index.locate(&f.geometry) {
            Containment::Inside | Containment::OnBoundary => true,
            Containment::Indeterminate => {
                indeterminate += 1;
                false
            }
            Containment::Outside => false,
        })
        .collect();

    let total = points.len();
    let kept = points.retain_indices(&|i| keep[i]);

    if indeterminate > 0 {
        log::warn!("Dropped {indeterminate} points with indeterminate containment");
    }
    log::info!("{} of {total} points fall within the polygons", kept.len());

    Ok(kept)
}

/// Counts the points falling in each polygon into `output_field`.
///
/// A point inside several overlapping polygons is counted once, for the
/// first of them in dataset order. Boundary points count.
///
/// # Errors
///
/// Returns [`PipelineError::CrsMismatch`] unless both datasets declare the
/// same CRS.
pub fn count_points_within<P: GeometryProvider + ?Sized>(
    mut polygons: PolygonDataset,
    points: &PointDataset,
    provider: &P,
    output_field: &str,
) -> Result<PolygonDataset, PipelineError> {
    ensure_same_crs(&points.crs, &polygons.crs)?;

    let mut counts = vec![0_i64; polygons.len()];
    {
        let index = PolygonIndex::build(provider, polygons.geometries());
        for feature in &points.features {
            if let Some(i) = index.first_containing(&feature.geometry) {
                counts[i] += 1;
            }
        }
    }

    for (feature, count) in polygons.features.iter_mut().zip(counts) {
        feature
            .attributes
            .insert(output_field, AttributeValue::Integer(count));
    }

    Ok(polygons)
}

#[cfg(test)]
mod tests {
    use crime_atlas_spatial::GeoProvider;
    use geo::{MultiPolygon, polygon};

    use super::*;
    use crate::fixtures::{boroughs, points, square};

    #[test]
    fn boundary_points_are_kept_and_outside_dropped() {
        let provider = GeoProvider::new();
        let polys = boroughs(
            Crs::BritishNationalGrid,
            vec![("A", square(0.0, 0.0, 10.0)), ("B", square(10.0, 0.0, 10.0))],
        );
        let pts = points(
            Crs::BritishNationalGrid,
            &[(5.0, 5.0), (10.0, 5.0), (20.0, 10.0), (25.0, 5.0), (f64::NAN, 1.0)],
        );

        let kept = filter_within(pts, &polys, &provider).unwrap();
        assert_eq!(kept.ids(), vec![0, 1, 2]);
        assert_eq!(kept.crs, Crs::BritishNationalGrid);
    }

    #[test]
    fn filtered_set_is_subset_and_agrees_with_direct_check() {
        let provider = GeoProvider::new();
        let polys = boroughs(
            Crs::BritishNationalGrid,
            vec![("A", square(0.0, 0.0, 4.0)), ("B", square(6.0, 6.0, 4.0))],
        );
        let coords: Vec<(f64, f64)> = (0..11)
            .flat_map(|x| (0..11).map(move |y| (f64::from(x), f64::from(y))))
            .collect();
        let pts = points(Crs::BritishNationalGrid, &coords);
        let original = pts.clone();

        let kept = filter_within(pts, &polys, &provider).unwrap();
        let kept_ids = kept.ids();

        for feature in &original.features {
            let direct = polys
                .geometries()
                .any(|g| provider.locate(g, &feature.geometry).is_contained());
            assert_eq!(kept_ids.contains(&feature.id), direct, "point {}", feature.id);
        }
        for feature in &kept.features {
            assert_eq!(Some(feature), original.features.get(feature.id));
        }
    }

    #[test]
    fn degenerate_polygons_exclude_points() {
        let provider = GeoProvider::new();
        let flat = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ]]);
        let polys = boroughs(Crs::BritishNationalGrid, vec![("Flat", flat)]);
        let pts = points(Crs::BritishNationalGrid, &[(5.0, 0.0)]);
        assert!(filter_within(pts, &polys, &provider).unwrap().is_empty());
    }

    #[test]
    fn mismatched_crs_is_refused() {
        let provider = GeoProvider::new();
        let polys = boroughs(Crs::BritishNationalGrid, vec![("A", square(0.0, 0.0, 1.0))]);
        let pts = points(Crs::Wgs84, &[(0.5, 0.5)]);
        assert!(matches!(
            filter_within(pts, &polys, &provider),
            Err(PipelineError::CrsMismatch { .. })
        ));

        let undeclared = boroughs(Crs::Unknown(String::new()), vec![]);
        let pts = points(Crs::Unknown(String::new()), &[]);
        assert!(matches!(
            filter_within(pts, &undeclared, &provider),
            Err(PipelineError::CrsMismatch { .. })
        ));
    }

    #[test]
    fn identical_unrecognized_declarations_are_comparable() {
        let provider = GeoProvider::new();
        let lambert = Crs::Unknown("EPSG:2154".to_string());
        let polys = boroughs(lambert.clone(), vec![("A", square(0.0, 0.0, 10.0))]);
        let pts = points(lambert.clone(), &[(5.0, 5.0), (15.0, 5.0)]);

        let kept = filter_within(pts, &polys, &provider).unwrap();
        assert_eq!(kept.ids(), vec![0]);
        assert_eq!(kept.crs, lambert);
    }

    #[test]
    fn unknown_source_crs_is_a_projection_error() {
        let provider = GeoProvider::new();
        let pts = points(Crs::Unknown("EPSG:2154".to_string()), &[]);
        assert!(matches!(
            reproject(pts, &Crs::BritishNationalGrid, &provider),
            Err(PipelineError::Projection { .. })
        ));
    }

    #[test]
    fn reproject_keeps_ids_and_attributes() {
        let provider = GeoProvider::new();
        let pts = points(Crs::Wgs84, &[(-0.1276, 51.5072), (-0.0886, 51.5133)]);
        let grid = reproject(pts.clone(), &Crs::BritishNationalGrid, &provider).unwrap();

        assert_eq!(grid.crs, Crs::BritishNationalGrid);
        assert_eq!(grid.ids(), pts.ids());
        assert!(grid.features[0].geometry.x() > 500_000.0);
        assert!(grid.features[0].geometry.y() > 150_000.0);

        let same = reproject(grid.clone(), &Crs::BritishNationalGrid, &provider).unwrap();
        assert_eq!(same, grid);
    }

    #[test]
    fn reproject_then_filter_matches_single_crs_check() {
        let provider = GeoProvider::new();
        // A box around central London, built in WGS84 and projected to the
        // national grid.
        let wgs_box = boroughs(Crs::Wgs84, vec![("Centre", square(-0.2, 51.45, 0.15))]);
        let grid_box = reproject_polygons(wgs_box.clone(), &Crs::BritishNationalGrid, &provider)
            .unwrap();

        let stations = points(
            Crs::Wgs84,
            &[(-0.1276, 51.5072), (-0.3, 51.5), (-0.1, 51.55), (0.0, 51.5)],
        );

        let via_grid = filter_within(
            reproject(stations.clone(), &Crs::BritishNationalGrid, &provider).unwrap(),
            &grid_box,
            &provider,
        )
        .unwrap();
        let direct = filter_within(stations, &wgs_box, &provider).unwrap();

        assert_eq!(via_grid.ids(), direct.ids());
        assert_eq!(direct.ids(), vec![0, 2]);
    }

    #[test]
    fn counts_points_per_polygon() {
        let provider = GeoProvider::new();
        let polys = boroughs(
            Crs::BritishNationalGrid,
            vec![
                ("A", square(0.0, 0.0, 10.0)),
                ("B", square(5.0, 0.0, 10.0)),
                ("C", square(50.0, 50.0, 1.0)),
            ],
        );
        let pts = points(
            Crs::BritishNationalGrid,
            &[(1.0, 1.0), (7.0, 7.0), (12.0, 3.0), (15.0, 0.0), (30.0, 30.0)],
        );

        let counted = count_points_within(polys, &pts, &provider, "stations").unwrap();
        let counts: Vec<_> = counted
            .features
            .iter()
            .map(|f| f.attributes.get("stations").cloned())
            .collect();
        assert_eq!(
            counts,
            vec![
                Some(AttributeValue::Integer(2)),
                Some(AttributeValue::Integer(2)),
                Some(AttributeValue::Integer(0)),
            ]
        );
    }
}
