//! Raster primitives on [`RgbaImage`]: viewport fitting, even-odd polygon
//! fill, lines and disks. Colors with alpha below 255 are blended over what
//! is already drawn.

use geo::{BoundingRect, Coord, MultiPolygon, Point, Rect};
use image::{Rgba, RgbaImage};

use crate::RenderError;

/// Maps world coordinates onto a pixel grid with y pointing up and the
/// aspect ratio preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    min_x: f64,
    max_y: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Viewport {
    /// Centres `bounds` in a `width` x `height` canvas, leaving `margin`
    /// pixels on every side. Zero-width or zero-height bounds are widened
    /// by one world unit.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::EmptyExtent`] if the bounds are not finite.
    pub fn fit(bounds: Rect<f64>, width: u32, height: u32, margin: u32) -> Result<Self, RenderError> {
        let (mut min, mut max) = (bounds.min(), bounds.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(RenderError::EmptyExtent);
        }
        if max.x <= min.x {
            min.x -= 0.5;
            max.x += 0.5;
        }
        if max.y <= min.y {
            min.y -= 0.5;
            max.y += 0.5;
        }

        let margin = f64::from(margin);
        let inner_w = (f64::from(width) - 2.0 * margin).max(1.0);
        let inner_h = (f64::from(height) - 2.0 * margin).max(1.0);
        let (span_x, span_y) = (max.x - min.x, max.y - min.y);
        let scale = (inner_w / span_x).min(inner_h / span_y);

        Ok(Self {
            min_x: min.x,
            max_y: max.y,
            scale,
            offset_x: span_x.mul_add(-scale, inner_w).mul_add(0.5, margin),
            offset_y: span_y.mul_add(-scale, inner_h).mul_add(0.5, margin),
        })
    }

    /// Pixel position of a world coordinate (not rounded).
    #[must_use]
    pub fn to_pixel(&self, c: Coord<f64>) -> (f64, f64) {
        (
            (c.x - self.min_x).mul_add(self.scale, self.offset_x),
            (self.max_y - c.y).mul_add(self.scale, self.offset_y),
        )
    }

    /// Pixels per world unit.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }
}

/// Smallest rectangle covering every finite rect in `rects`.
pub fn union_bounds(rects: impl IntoIterator<Item = Rect<f64>>) -> Option<Rect<f64>> {
    rects.into_iter().reduce(|a, b| {
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
}

/// Bounds of a set of polygons and points together.
pub fn extent<'a>(
    polygons: impl IntoIterator<Item = &'a MultiPolygon<f64>>,
    points: impl IntoIterator<Item = &'a Point<f64>>,
) -> Option<Rect<f64>> {
    let polygon_rects = polygons.into_iter().filter_map(BoundingRect::bounding_rect);
    let point_rects = points
        .into_iter()
        .filter(|p| p.x().is_finite() && p.y().is_finite())
        .map(|p| Rect::new(p.0, p.0));
    union_bounds(polygon_rects.chain(point_rects))
}

/// Composites `color` over the pixel at `(x, y)`. Out-of-bounds writes are
/// ignored.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn blend(image: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
        return;
    };
    if x >= image.width() || y >= image.height() {
        return;
    }

    let alpha = color.0[3];
    if alpha == 255 {
        image.put_pixel(x, y, color);
        return;
    }

    let dst = image.get_pixel_mut(x, y);
    let a = f64::from(alpha) / 255.0;
    let dst_a = f64::from(dst.0[3]) / 255.0;
    let out_a = dst_a.mul_add(1.0 - a, a);
    if out_a <= 0.0 {
        return;
    }
    for (channel, &src) in dst.0.iter_mut().zip(&color.0).take(3) {
        let under = f64::from(*channel) * dst_a * (1.0 - a);
        let over = f64::from(src) * a;
        *channel = ((over + under) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}

/// Fills the area enclosed by `rings` using the even-odd rule, so interior
/// rings become holes. Rings are closed pixel-space coordinate lists.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn fill_rings(image: &mut RgbaImage, rings: &[Vec<(f64, f64)>], color: Rgba<u8>) {
    let (min_y, max_y) = rings
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });
    if !min_y.is_finite() || !max_y.is_finite() {
        return;
    }

    let height = f64::from(image.height());
    let width = f64::from(image.width());
    let first_row = (min_y - 0.5).ceil().max(0.0);
    let last_row = (max_y - 0.5).floor().min(height - 1.0);
    if first_row > last_row {
        return;
    }

    let mut crossings = Vec::new();
    for row in first_row as u32..=last_row as u32 {
        let y = f64::from(row) + 0.5;
        crossings.clear();
        for ring in rings {
            for edge in ring.windows(2) {
                let ((x0, y0), (x1, y1)) = (edge[0], edge[1]);
                if (y0 <= y) != (y1 <= y) {
                    let t = (y - y0) / (y1 - y0);
                    let x = (x1 - x0).mul_add(t, x0);
                    if x.is_finite() {
                        crossings.push(x);
                    }
                }
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = (span[0] - 0.5).ceil().max(0.0);
            let end = (span[1] - 0.5).floor().min(width - 1.0);
            if start > end {
                continue;
            }
            for col in start as i64..=end as i64 {
                blend(image, col, i64::from(row), color);
            }
        }
    }
}

/// Draws a one-pixel line between two pixel positions.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_line(image: &mut RgbaImage, from: (f64, f64), to: (f64, f64), color: Rgba<u8>) {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
        return;
    }

    let (mut x, mut y) = (from.0.floor() as i64, from.1.floor() as i64);
    let (x1, y1) = (to.0.floor() as i64, to.1.floor() as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        blend(image, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Draws every edge of every ring.
pub fn stroke_rings(image: &mut RgbaImage, rings: &[Vec<(f64, f64)>], color: Rgba<u8>) {
    for ring in rings {
        for edge in ring.windows(2) {
            draw_line(image, edge[0], edge[1], color);
        }
    }
}

/// Fills a disk of `radius` pixels centred on `centre`. Disks smaller than
/// a pixel still cover the pixel under the centre.
#[allow(clippy::cast_possible_truncation)]
pub fn fill_disk(image: &mut RgbaImage, centre: (f64, f64), radius: f64, color: Rgba<u8>) {
    if !(centre.0.is_finite() && centre.1.is_finite() && radius.is_finite()) {
        return;
    }
    let radius = radius.max(0.75);
    let r2 = radius * radius;

    let (x0, x1) = ((centre.0 - radius).floor() as i64, (centre.0 + radius).ceil() as i64);
    let (y0, y1) = ((centre.1 - radius).floor() as i64, (centre.1 + radius).ceil() as i64);
    for y in y0..=y1 {
        for x in x0..=x1 {
            #[allow(clippy::cast_precision_loss)]
            let (px, py) = (x as f64 + 0.5 - centre.0, y as f64 + 0.5 - centre.1);
            if px.mul_add(px, py * py) <= r2 {
                blend(image, x, y, color);
            }
        }
    }
}

/// Projects every ring of `polygon` through `viewport`.
pub fn pixel_rings(polygon: &MultiPolygon<f64>, viewport: &Viewport) -> Vec<Vec<(f64, f64)>> {
    polygon
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .map(|ring| ring.coords().map(|c| viewport.to_pixel(*c)).collect())
        .collect()
}
