//! Static choropleth with proportional circles and point markers.

use crime_atlas_dataset_models::{AttributeRecord, AttributeValue, PointDataset, PolygonDataset};
use crime_atlas_spatial::{GeoProvider, GeometryProvider};
use geo::Point;
use image::{Rgba, RgbaImage};

use crate::canvas::{Viewport, extent, fill_disk, fill_rings, pixel_rings, stroke_rings};
use crate::color::{ColorRamp, MISSING};
use crate::{RenderError, check_canvas};

pub(crate) const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone)]
pub struct StaticMapOptions {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    /// Numeric field driving the fill color.
    pub color_field: String,
    /// Numeric field driving circle area at each region's centroid.
    pub size_field: Option<String>,
    pub low_color: Rgba<u8>,
    pub high_color: Rgba<u8>,
    pub outline_color: Rgba<u8>,
    pub circle_color: Rgba<u8>,
    pub point_color: Rgba<u8>,
    /// Radius of the largest proportional circle, in pixels.
    pub max_circle_radius: f64,
    pub point_radius: f64,
}

impl Default for StaticMapOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            margin: 20,
            color_field: "CrimeCount".to_string(),
            size_field: None,
            low_color: Rgba([255, 255, 178, 255]),
            high_color: Rgba([189, 0, 38, 255]),
            outline_color: Rgba([64, 64, 64, 255]),
            circle_color: Rgba([0, 0, 0, 90]),
            point_color: Rgba([33, 102, 172, 255]),
            max_circle_radius: 18.0,
            point_radius: 2.5,
        }
    }
}

fn numeric(record: &AttributeRecord, field: &str) -> Option<f64> {
    record.get(field).and_then(AttributeValue::as_f64)
}

/// Renders `polygons` colored by `options.color_field`, with optional
/// proportional circles and the `points` drawn on top.
///
/// # Errors
///
/// Returns [`RenderError::InvalidCanvas`] for an unusable size,
/// [`RenderError::CrsMismatch`] if `points` are in another CRS, and
/// [`RenderError::EmptyExtent`] when there is nothing to draw.
pub fn render_static(
    polygons: &PolygonDataset,
    points: Option<&PointDataset>,
    options: &StaticMapOptions,
) -> Result<RgbaImage, RenderError> {
    check_canvas(options.width, options.height)?;
    if let Some(points) = points
        && points.crs != polygons.crs
    {
        return Err(RenderError::CrsMismatch {
            points: points.crs.clone(),
            polygons: polygons.crs.clone(),
        });
    }

    let point_geometries: Vec<&Point<f64>> = points
        .map(|p| p.features.iter().map(|f| &f.geometry).collect())
        .unwrap_or_default();
    let bounds = extent(polygons.geometries(), point_geometries.iter().copied())
        .ok_or(RenderError::EmptyExtent)?;
    let viewport = Viewport::fit(bounds, options.width, options.height, options.margin)?;

    let mut image = RgbaImage::from_pixel(options.width, options.height, BACKGROUND);

    let values: Vec<Option<f64>> = polygons
        .features
        .iter()
        .map(|f| numeric(&f.attributes, &options.color_field))
        .collect();
    let ramp = ColorRamp::spanning(
        options.low_color,
        options.high_color,
        values.iter().flatten().copied(),
    );
    if ramp.is_none() {
        log::warn!(
            "Field '{}' has no numeric values; every region is drawn as missing",
            options.color_field
        );
    }

    for (feature, value) in polygons.features.iter().zip(&values) {
        let rings = pixel_rings(&feature.geometry, &viewport);
        let fill = ramp.map_or(MISSING, |r| r.color(*value));
        fill_rings(&mut image, &rings, fill);
        stroke_rings(&mut image, &rings, options.outline_color);
    }

    if let Some(size_field) = &options.size_field {
        draw_circles(&mut image, polygons, size_field, &viewport, options);
    }

    for point in point_geometries {
        fill_disk(
            &mut image,
            viewport.to_pixel(point.0),
            options.point_radius,
            options.point_color,
        );
    }

    Ok(image)
}

/// Circle area is proportional to the value; zero or negative values get
/// no circle, and neither do regions without a representative point.
fn draw_circles(
    image: &mut RgbaImage,
    polygons: &PolygonDataset,
    size_field: &str,
    viewport: &Viewport,
    options: &StaticMapOptions,
) {
    let provider = GeoProvider::new();
    let sized: Vec<(Point<f64>, f64)> = polygons
        .features
        .iter()
        .filter_map(|f| {
            let value = numeric(&f.attributes, size_field).filter(|v| v.is_finite() && *v > 0.0)?;
            Some((provider.representative_point(&f.geometry)?, value))
        })
        .collect();

    let Some(max) = sized.iter().map(|(_, v)| *v).reduce(f64::max) else {
        log::warn!("Field '{size_field}' has no positive values; no circles drawn");
        return;
    };

    for (centre, value) in sized {
        let radius = options.max_circle_radius * (value / max).sqrt();
        fill_disk(image, viewport.to_pixel(centre.0), radius, options.circle_color);
    }
}

#[cfg(test)]
mod tests {
    use crime_atlas_dataset_models::Crs;
    use geo::{Coord, Rect};

    use super::*;
    use crate::fixtures::{boroughs, square, stations};

    fn pixel_at(image: &RgbaImage, viewport: &Viewport, x: f64, y: f64) -> Rgba<u8> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (px, py) = {
            let (px, py) = viewport.to_pixel(Coord { x, y });
            (px.floor() as u32, py.floor() as u32)
        };
        *image.get_pixel(px, py)
    }

    fn viewport_for(options: &StaticMapOptions) -> Viewport {
        let bounds = Rect::new(
            Coord { x: 525_000.0, y: 180_000.0 },
            Coord { x: 535_000.0, y: 185_000.0 },
        );
        Viewport::fit(bounds, options.width, options.height, options.margin).unwrap()
    }

    #[test]
    fn missing_values_are_grey_and_points_on_top() {
        let options = StaticMapOptions {
            width: 200,
            height: 120,
            ..StaticMapOptions::default()
        };
        let stations = stations();
        let image = render_static(&boroughs(), Some(&stations), &options).unwrap();
        let vp = viewport_for(&options);

        // Single numeric value: the ramp paints it with the high color.
        assert_eq!(pixel_at(&image, &vp, 526_000.0, 181_000.0), options.high_color);
        assert_eq!(pixel_at(&image, &vp, 531_000.0, 181_000.0), MISSING);
        assert_eq!(pixel_at(&image, &vp, 527_500.0, 182_500.0), options.point_color);
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn proportional_circles_darken_centroids() {
        let options = StaticMapOptions {
            width: 200,
            height: 120,
            size_field: Some("Pop_2001".to_string()),
            ..StaticMapOptions::default()
        };
        let image = render_static(&boroughs(), None, &options).unwrap();
        let vp = viewport_for(&options);

        let centre = pixel_at(&image, &vp, 532_500.0, 182_500.0);
        assert_ne!(centre, MISSING);
        assert!(centre.0[0] < MISSING.0[0]);
    }

    #[test]
    fn non_finite_region_gets_no_circle() {
        let options = StaticMapOptions {
            width: 200,
            height: 120,
            size_field: Some("Pop_2001".to_string()),
            ..StaticMapOptions::default()
        };
        let mut polygons = boroughs();
        polygons.features[1].geometry = square(f64::NAN, 180_000.0, 5_000.0);
        let image = render_static(&polygons, None, &options).unwrap();

        let bounds = Rect::new(
            Coord { x: 525_000.0, y: 180_000.0 },
            Coord { x: 530_000.0, y: 185_000.0 },
        );
        let vp = Viewport::fit(bounds, options.width, options.height, options.margin).unwrap();
        let camden = pixel_at(&image, &vp, 527_500.0, 182_500.0);
        assert!(camden.0[0] < options.high_color.0[0]);
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*image.get_pixel(199, 60), BACKGROUND);
    }

    #[test]
    fn invalid_inputs_fail() {
        let options = StaticMapOptions {
            width: 0,
            ..StaticMapOptions::default()
        };
        assert!(matches!(
            render_static(&boroughs(), None, &options),
            Err(RenderError::InvalidCanvas { .. })
        ));

        let empty = PolygonDataset::new(Crs::BritishNationalGrid, vec![]);
        assert!(matches!(
            render_static(&empty, None, &StaticMapOptions::default()),
            Err(RenderError::EmptyExtent)
        ));

        let mut wgs_points = stations();
        wgs_points.crs = Crs::Wgs84;
        assert!(matches!(
            render_static(&boroughs(), Some(&wgs_points), &StaticMapOptions::default()),
            Err(RenderError::CrsMismatch { .. })
        ));
    }
}
