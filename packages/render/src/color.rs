//! Color parsing and value-to-color ramps.

use image::Rgba;

use crate::RenderError;

/// Fill for regions whose value is missing or not numeric.
pub const MISSING: Rgba<u8> = Rgba([189, 189, 189, 255]);

/// Parses `#rrggbb` or `#rrggbbaa` (the `#` is optional).
///
/// # Errors
///
/// Returns [`RenderError::InvalidColor`] for anything else.
pub fn hex_to_rgba(hex: &str) -> Result<Rgba<u8>, RenderError> {
    let digits = hex.trim().trim_start_matches('#');
    let invalid = || RenderError::InvalidColor {
        value: hex.to_string(),
    };

    if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
        return Err(invalid());
    }

    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

/// `#rrggbb` form of a color, alpha dropped.
#[must_use]
pub fn to_hex(color: Rgba<u8>) -> String {
    let [r, g, b, _] = color.0;
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Linear interpolation between two colors, `t` clamped to `[0, 1]`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn lerp(a: Rgba<u8>, b: Rgba<u8>, t: f64) -> Rgba<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let mix = |x: u8, y: u8| (f64::from(y) - f64::from(x)).mul_add(t, f64::from(x)).round() as u8;
    Rgba([
        mix(a.0[0], b.0[0]),
        mix(a.0[1], b.0[1]),
        mix(a.0[2], b.0[2]),
        mix(a.0[3], b.0[3]),
    ])
}

/// Maps the observed range of a numeric field onto a two-color ramp.
#[derive(Debug, Clone, Copy)]
pub struct ColorRamp {
    low: Rgba<u8>,
    high: Rgba<u8>,
    min: f64,
    max: f64,
}

impl ColorRamp {
    /// Builds a ramp spanning the finite values in `values`. `None` if
    /// there are none.
    pub fn spanning(
        low: Rgba<u8>,
        high: Rgba<u8>,
        values: impl IntoIterator<Item = f64>,
    ) -> Option<Self> {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| {
                Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
            })?;
        Some(Self {
            low,
            high,
            min,
            max,
        })
    }

    /// Color for `value`. Missing or non-finite values get [`MISSING`]; a
    /// ramp over a single value paints everything `high`.
    #[must_use]
    pub fn color(&self, value: Option<f64>) -> Rgba<u8> {
        value
            .filter(|v| v.is_finite())
            .map_or(MISSING, |v| lerp(self.low, self.high, self.fraction(v)))
    }

    /// Position of `value` in the ramp, `0.0..=1.0`. Values outside the
    /// spanned range are clamped to the nearest end.
    #[must_use]
    pub fn fraction(&self, value: f64) -> f64 {
        if self.max <= self.min {
            1.0
        } else {
            ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(hex_to_rgba("#ff8000").unwrap(), Rgba([255, 128, 0, 255]));
        assert_eq!(hex_to_rgba("00000080").unwrap(), Rgba([0, 0, 0, 128]));
        assert!(hex_to_rgba("#fff").is_err());
        assert!(hex_to_rgba("#gg0000").is_err());
        assert!(hex_to_rgba("#ÿÿÿ").is_err());
    }

    #[test]
    fn hex_roundtrip_without_alpha() {
        assert_eq!(to_hex(Rgba([189, 0, 38, 255])), "#bd0026");
        assert_eq!(hex_to_rgba(&to_hex(Rgba([1, 2, 3, 9]))).unwrap(), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn ramp_ends_and_missing() {
        let low = Rgba([255, 255, 255, 255]);
        let high = Rgba([255, 0, 0, 255]);
        let ramp = ColorRamp::spanning(low, high, [10.0, 20.0, f64::NAN]).unwrap();

        assert_eq!(ramp.color(Some(10.0)), low);
        assert_eq!(ramp.color(Some(20.0)), high);
        assert_eq!(ramp.color(Some(15.0)), Rgba([255, 128, 128, 255]));
        assert_eq!(ramp.color(None), MISSING);
        assert!((ramp.fraction(12.5) - 0.25).abs() < 1e-12);
        assert_eq!(ramp.color(Some(40.0)), high);
        assert_eq!(ramp.color(Some(-5.0)), low);
    }

    #[test]
    fn single_value_ramp() {
        let ramp = ColorRamp::spanning(MISSING, Rgba([0, 0, 0, 255]), [3.0]).unwrap();
        assert_eq!(ramp.color(Some(3.0)), Rgba([0, 0, 0, 255]));
        assert!(ColorRamp::spanning(MISSING, MISSING, []).is_none());
    }
}
