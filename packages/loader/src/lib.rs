#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loaders for the atlas input datasets.
//!
//! Geometry datasets come from shapefiles or `GeoJSON`; the crime table is
//! delimited text. Every loader opens its files, reads them fully into an
//! in-memory dataset, and closes them before returning. Failures are fatal
//! to the run and always name the offending path.

pub mod geojson_io;
mod shp;
mod table;

use std::path::{Path, PathBuf};

use crime_atlas_crime_models::CrimeRecord;
use crime_atlas_dataset_models::{PointDataset, PolygonDataset};
use thiserror::Error;

/// Errors that can occur while reading or writing datasets.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The path does not resolve to a readable dataset.
    #[error("Dataset not found: {}", .path.display())]
    DataNotFound {
        /// The path that could not be resolved.
        path: PathBuf,
    },

    /// The data exists but cannot be parsed into geometries/attributes.
    #[error("Failed to parse {}: {message}", .path.display())]
    Format {
        /// The file being parsed.
        path: PathBuf,
        /// What went wrong, including row numbers where known.
        message: String,
    },

    /// Writing an output dataset failed.
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        /// The destination path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl LoadError {
    pub(crate) fn format(path: &Path, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(path: &Path) -> Self {
        Self::DataNotFound {
            path: path.to_path_buf(),
        }
    }

    /// Maps an open/read error: missing or unreadable files are
    /// `DataNotFound`, anything else is a format problem.
    pub(crate) fn from_io(path: &Path, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Self::not_found(path)
            }
            _ => Self::format(path, err.to_string()),
        }
    }
}

/// Where a geometry dataset actually lives once a path is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GeometrySource {
    Shapefile(PathBuf),
    GeoJson(PathBuf),
}

/// Resolves a geometry dataset path.
///
/// Accepts a `.shp`, `.geojson` or `.json` file; a directory holding
/// exactly one shapefile; or a shapefile path with the extension left off
/// (`data/london_sport`).
fn resolve_geometry(path: &Path) -> Result<GeometrySource, LoadError> {
    if path.is_dir() {
        let entries = std::fs::read_dir(path).map_err(|e| LoadError::from_io(path, &e))?;
        let mut shapefiles: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| has_extension(p, "shp"))
            .collect();
        shapefiles.sort();

        return match shapefiles.len() {
            0 => Err(LoadError::not_found(path)),
            1 => Ok(GeometrySource::Shapefile(shapefiles.remove(0))),
            _ => {
                let names: Vec<String> = shapefiles
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect();
                Err(LoadError::format(
                    path,
                    format!(
                        "directory holds several shapefiles ({}); name one explicitly",
                        names.join(", ")
                    ),
                ))
            }
        };
    }

    if !path.exists() {
        let with_shp = path.with_extension("shp");
        if path.extension().is_none() && with_shp.is_file() {
            return Ok(GeometrySource::Shapefile(with_shp));
        }
        return Err(LoadError::not_found(path));
    }

    if has_extension(path, "shp") {
        Ok(GeometrySource::Shapefile(path.to_path_buf()))
    } else if has_extension(path, "geojson") || has_extension(path, "json") {
        Ok(GeometrySource::GeoJson(path.to_path_buf()))
    } else {
        Err(LoadError::format(
            path,
            "unsupported geometry format (expected .shp, .geojson or .json)",
        ))
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Loads a polygon dataset.
///
/// # Errors
///
/// Returns [`LoadError::DataNotFound`] if the path does not resolve to a
/// readable dataset, or [`LoadError::Format`] if it holds something other
/// than polygons or cannot be parsed.
pub fn load_polygons(path: &Path) -> Result<PolygonDataset, LoadError> {
    let dataset = match resolve_geometry(path)? {
        GeometrySource::Shapefile(shp) => shp::read_polygons(&shp)?,
        GeometrySource::GeoJson(json) => geojson_io::read_polygons(&json)?,
    };
    log::info!(
        "Loaded {} polygons from {} ({})",
        dataset.len(),
        path.display(),
        dataset.crs
    );
    Ok(dataset)
}

/// Loads a point dataset. Point ids are the zero-based record positions in
/// the source file, except that a `GeoJSON` feature with a non-negative
/// integer `id` keeps that id, so saved points reload with their
/// provenance.
///
/// # Errors
///
/// Same conditions as [`load_polygons`], for point geometries.
pub fn load_points(path: &Path) -> Result<PointDataset, LoadError> {
    let dataset = match resolve_geometry(path)? {
        GeometrySource::Shapefile(shp) => shp::read_points(&shp)?,
        GeometrySource::GeoJson(json) => geojson_io::read_points(&json)?,
    };
    log::info!(
        "Loaded {} points from {} ({})",
        dataset.len(),
        path.display(),
        dataset.crs
    );
    Ok(dataset)
}

/// Loads the crime table.
///
/// # Errors
///
/// Returns [`LoadError::DataNotFound`] if the file cannot be opened, or
/// [`LoadError::Format`] if a required column is missing or a row does not
/// parse.
pub fn load_table(path: &Path) -> Result<Vec<CrimeRecord>, LoadError> {
    let records = table::read_crime_table(path)?;
    log::info!("Loaded {} crime rows from {}", records.len(), path.display());
    Ok(records)
}

/// Loads a pre-built polygon dataset saved by [`save_polygons`], bypassing
/// the normalize/join/filter stages.
///
/// # Errors
///
/// Returns [`LoadError::Format`] if the path is not `GeoJSON`, plus the
/// usual [`load_polygons`] failures.
pub fn load_prebuilt(path: &Path) -> Result<PolygonDataset, LoadError> {
    if !path.exists() {
        return Err(LoadError::not_found(path));
    }
    if !(has_extension(path, "geojson") || has_extension(path, "json")) {
        return Err(LoadError::format(path, "pre-built datasets are GeoJSON files"));
    }
    let dataset = geojson_io::read_polygons(path)?;
    log::info!(
        "Loaded pre-built dataset with {} polygons from {}",
        dataset.len(),
        path.display()
    );
    Ok(dataset)
}

/// Writes a polygon dataset as a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`LoadError::Write`] if the file cannot be written.
pub fn save_polygons(dataset: &PolygonDataset, path: &Path) -> Result<(), LoadError> {
    geojson_io::write_collection(&geojson_io::polygons_to_collection(dataset), path)?;
    log::info!("Wrote {} polygons to {}", dataset.len(), path.display());
    Ok(())
}

/// Writes a point dataset as a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns [`LoadError::Write`] if the file cannot be written.
pub fn save_points(dataset: &PointDataset, path: &Path) -> Result<(), LoadError> {
    geojson_io::write_collection(&geojson_io::points_to_collection(dataset), path)?;
    log::info!("Wrote {} points to {}", dataset.len(), path.display());
    Ok(())
}
