#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Renderers for the final atlas datasets.
//!
//! Renderers only read the datasets they are given. [`render_static`] and
//! [`render_scatter`] rasterize into an [`image::RgbaImage`];
//! [`render_interactive`] produces a standalone Leaflet HTML page.

pub mod canvas;
pub mod color;
pub mod interactive;
pub mod scatter;
pub mod static_map;

use std::path::Path;

use crime_atlas_dataset_models::Crs;
use image::RgbaImage;
use thiserror::Error;

pub use interactive::{InteractiveOptions, render_interactive};
pub use scatter::{ScatterOptions, render_scatter};
pub use static_map::{StaticMapOptions, render_static};

/// Largest accepted canvas edge, in pixels.
pub const MAX_CANVAS_EDGE: u32 = 16_384;

/// Errors that can occur while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid canvas size {width}x{height} (each edge must be 1..={MAX_CANVAS_EDGE})")]
    InvalidCanvas { width: u32, height: u32 },

    /// Nothing with finite coordinates to draw.
    #[error("Nothing to draw: the dataset has no finite extent")]
    EmptyExtent,

    #[error("Invalid color '{value}' (expected #rrggbb or #rrggbbaa)")]
    InvalidColor { value: String },

    #[error("Points are in {points} but polygons are in {polygons}")]
    CrsMismatch { points: Crs, polygons: Crs },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The interactive map only takes longitude/latitude data.
    #[error("Interactive maps need WGS84 coordinates, got {crs}")]
    NotGeographic { crs: Crs },
}

pub(crate) const fn check_canvas(width: u32, height: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 || width > MAX_CANVAS_EDGE || height > MAX_CANVAS_EDGE {
        return Err(RenderError::InvalidCanvas { width, height });
    }
    Ok(())
}

/// Writes `image` as a PNG, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`RenderError::Image`] if the directory or file cannot be
/// written.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), RenderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(image::ImageError::IoError)?;
    }
    image.save_with_format(path, image::ImageFormat::Png)?;
    log::info!(
        "Wrote {}x{} image to {}",
        image.width(),
        image.height(),
        path.display()
    );
    Ok(())
}
