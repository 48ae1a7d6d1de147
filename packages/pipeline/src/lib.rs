#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The transforming stages of the atlas pipeline.
//!
//! Every stage takes the previous stage's dataset by value and returns a
//! new one:
//!
//! 1. [`normalize`]: fixes misinferred attribute types.
//! 2. [`aggregate`] and [`join`]: sums crime counts per region and
//!    left-joins them onto the polygons.
//! 3. [`filter`]: reprojects points and keeps those inside the polygons.
//! 4. [`quadrant`]: labels polygons by their position around the union
//!    centroid.

pub mod aggregate;
pub mod filter;
pub mod join;
pub mod normalize;
pub mod quadrant;

use crime_atlas_dataset_models::{Crs, FieldType};
use crime_atlas_spatial::SpatialError;
use thiserror::Error;

pub use aggregate::{AggregatedCrime, aggregate, aggregate_category};
pub use filter::{count_points_within, filter_within, reproject, reproject_polygons};
pub use join::join_attributes;
pub use normalize::{normalize_field, rename_field, select_by_range};
pub use quadrant::{QUADRANT_FIELD, Quadrant, classify_quadrant};

/// Errors raised by the pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Values that cannot be converted to the requested type.
    #[error("Cannot convert field '{field}' to {target}: offending record(s) {indices:?}")]
    TypeCoercion {
        field: String,
        target: FieldType,
        /// Every offending record index, ascending.
        indices: Vec<usize>,
    },

    /// A summed count no longer fits the type that stores it.
    #[error("Count for '{key}' overflows {limit}")]
    CountOverflow { key: String, limit: u64 },

    /// Several polygons share a join key but disagree on their attributes.
    #[error("Join key '{key}' is shared by polygons {indices:?} with different attributes")]
    JoinKeyCollision { key: String, indices: Vec<usize> },

    #[error("Cannot reproject from {from} to {to}: {source}")]
    Projection {
        from: Crs,
        to: Crs,
        #[source]
        source: SpatialError,
    },

    /// A spatial comparison was attempted across reference systems.
    #[error("Points are in {points} but polygons are in {polygons}; reproject the points first")]
    CrsMismatch { points: Crs, polygons: Crs },
}
