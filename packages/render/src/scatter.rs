//! Attribute scatter plot: one dot per record, optionally colored and sized
//! by further fields.

use crime_atlas_dataset_models::{AttributeTable, AttributeValue};
use geo::{Coord, Rect};
use image::{Rgba, RgbaImage};

use crate::canvas::{draw_line, fill_disk};
use crate::color::ColorRamp;
use crate::static_map::BACKGROUND;
use crate::{RenderError, check_canvas};

const TICKS: u32 = 5;

#[derive(Debug, Clone)]
pub struct ScatterOptions {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub x_field: String,
    pub y_field: String,
    pub color_field: Option<String>,
    pub size_field: Option<String>,
    pub low_color: Rgba<u8>,
    pub high_color: Rgba<u8>,
    /// Dot color when no color field is set.
    pub point_color: Rgba<u8>,
    pub axis_color: Rgba<u8>,
    pub min_radius: f64,
    pub max_radius: f64,
}

impl Default for ScatterOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            margin: 40,
            x_field: "Partic_Per".to_string(),
            y_field: "Pop_2001".to_string(),
            color_field: None,
            size_field: None,
            low_color: Rgba([255, 255, 178, 255]),
            high_color: Rgba([189, 0, 38, 255]),
            point_color: Rgba([33, 102, 172, 220]),
            axis_color: Rgba([64, 64, 64, 255]),
            min_radius: 2.0,
            max_radius: 9.0,
        }
    }
}

struct Dot {
    at: Coord<f64>,
    color: Option<f64>,
    size: Option<f64>,
}

fn finite(value: Option<&AttributeValue>) -> Option<f64> {
    value.and_then(AttributeValue::as_f64).filter(|v| v.is_finite())
}

/// Plots `y_field` against `x_field` for every record where both are
/// numeric. Other records are skipped.
///
/// # Errors
///
/// Returns [`RenderError::InvalidCanvas`] for an unusable size and
/// [`RenderError::EmptyExtent`] when no record has both values.
pub fn render_scatter<D: AttributeTable>(
    dataset: &D,
    options: &ScatterOptions,
) -> Result<RgbaImage, RenderError> {
    check_canvas(options.width, options.height)?;

    let records = dataset.records();
    let dots: Vec<Dot> = records
        .iter()
        .filter_map(|record| {
            let x = finite(record.get(&options.x_field))?;
            let y = finite(record.get(&options.y_field))?;
            Some(Dot {
                at: Coord { x, y },
                color: options.color_field.as_deref().and_then(|f| finite(record.get(f))),
                size: options.size_field.as_deref().and_then(|f| finite(record.get(f))),
            })
        })
        .collect();

    if dots.len() < records.len() {
        log::debug!(
            "Scatter skipped {} records without numeric '{}'/'{}'",
            records.len() - dots.len(),
            options.x_field,
            options.y_field
        );
    }

    let bounds = dots
        .iter()
        .map(|d| Rect::new(d.at, d.at))
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
        .ok_or(RenderError::EmptyExtent)?;

    let (left, bottom) = (
        f64::from(options.margin),
        f64::from(options.height.saturating_sub(options.margin)),
    );
    let (right, top) = (
        f64::from(options.width.saturating_sub(options.margin)),
        f64::from(options.margin),
    );
    // Each axis is stretched to the plot area independently.
    let span = |lo: f64, hi: f64| if hi > lo { hi - lo } else { 1.0 };
    let (min, max) = (bounds.min(), bounds.max());
    let (span_x, span_y) = (span(min.x, max.x), span(min.y, max.y));
    let to_pixel = |c: Coord<f64>| {
        (
            ((c.x - min.x) / span_x).mul_add(right - left, left),
            ((c.y - min.y) / span_y).mul_add(top - bottom, bottom),
        )
    };

    let mut image = RgbaImage::from_pixel(options.width, options.height, BACKGROUND);
    draw_axes(&mut image, (left, top, right, bottom), options.axis_color);

    let ramp = ColorRamp::spanning(
        options.low_color,
        options.high_color,
        dots.iter().filter_map(|d| d.color),
    );
    let sizes = dots
        .iter()
        .filter_map(|d| d.size)
        .fold(None, |acc: Option<(f64, f64)>, v| {
            Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
        });

    for dot in &dots {
        let color = match (options.color_field.is_some(), ramp) {
            (true, Some(ramp)) => ramp.color(dot.color),
            _ => options.point_color,
        };
        let radius = match (dot.size, sizes) {
            (Some(v), Some((lo, hi))) if hi > lo => {
                let t = ((v - lo) / (hi - lo)).sqrt();
                (options.max_radius - options.min_radius).mul_add(t, options.min_radius)
            }
            _ => options.min_radius,
        };
        fill_disk(&mut image, to_pixel(dot.at), radius, color);
    }

    Ok(image)
}

/// Left and bottom axes with evenly spaced ticks.
fn draw_axes(image: &mut RgbaImage, (left, top, right, bottom): (f64, f64, f64, f64), color: Rgba<u8>) {
    let gap = 6.0;
    let (x_axis, y_axis) = (bottom + gap, left - gap);
    draw_line(image, (y_axis, x_axis), (right, x_axis), color);
    draw_line(image, (y_axis, top), (y_axis, x_axis), color);

    for i in 0..=TICKS {
        let t = f64::from(i) / f64::from(TICKS);
        let x = (right - left).mul_add(t, left);
        let y = (top - bottom).mul_add(t, bottom);
        draw_line(image, (x, x_axis), (x, x_axis + 4.0), color);
        draw_line(image, (y_axis - 4.0, y), (y_axis, y), color);
    }
}

#[cfg(test)]
mod tests {
    use crime_atlas_dataset_models::{AttributeRecord, Crs, PolygonDataset, PolygonFeature};
    use geo::MultiPolygon;

    use super::*;

    fn table(rows: Vec<(AttributeValue, AttributeValue)>) -> PolygonDataset {
        PolygonDataset::new(
            Crs::BritishNationalGrid,
            rows.into_iter()
                .map(|(x, y)| PolygonFeature {
                    geometry: MultiPolygon(vec![]),
                    attributes: AttributeRecord::new()
                        .with("Partic_Per", x)
                        .with("Pop_2001", y),
                })
                .collect(),
        )
    }

    #[test]
    fn corners_of_the_data_land_on_the_plot_corners() {
        let options = ScatterOptions {
            width: 100,
            height: 100,
            margin: 10,
            ..ScatterOptions::default()
        };
        let data = table(vec![
            (AttributeValue::Number(10.0), AttributeValue::Integer(100)),
            (AttributeValue::Number(30.0), AttributeValue::Integer(300)),
            ("n/a".into(), AttributeValue::Integer(200)),
        ]);

        let image = render_scatter(&data, &options).unwrap();
        // Minimum at bottom-left, maximum at top-right of the plot area.
        assert_eq!(*image.get_pixel(10, 89), blend_over_white(options.point_color));
        assert_eq!(*image.get_pixel(89, 10), blend_over_white(options.point_color));
        assert_eq!(*image.get_pixel(50, 50), BACKGROUND);
    }

    fn blend_over_white(color: Rgba<u8>) -> Rgba<u8> {
        let mut image = RgbaImage::from_pixel(1, 1, BACKGROUND);
        crate::canvas::blend(&mut image, 0, 0, color);
        *image.get_pixel(0, 0)
    }

    #[test]
    fn color_field_uses_ramp() {
        let options = ScatterOptions {
            width: 100,
            height: 100,
            margin: 10,
            color_field: Some("Partic_Per".to_string()),
            ..ScatterOptions::default()
        };
        let data = table(vec![
            (AttributeValue::Number(10.0), AttributeValue::Integer(100)),
            (AttributeValue::Number(30.0), AttributeValue::Integer(300)),
        ]);

        let image = render_scatter(&data, &options).unwrap();
        assert_eq!(*image.get_pixel(10, 89), options.low_color);
        assert_eq!(*image.get_pixel(89, 10), options.high_color);
    }

    #[test]
    fn no_numeric_pairs_is_empty_extent() {
        let data = table(vec![("a".into(), AttributeValue::Missing)]);
        assert!(matches!(
            render_scatter(&data, &ScatterOptions::default()),
            Err(RenderError::EmptyExtent)
        ));
    }
}
