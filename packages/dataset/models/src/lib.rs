#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dataset types shared by every stage of the atlas pipeline.
//!
//! A [`PolygonDataset`] pairs each region polygon with an attribute record;
//! a [`PointDataset`] does the same for point locations. Both carry the
//! [`Crs`] their coordinates are expressed in. Stages never mutate a
//! dataset they were handed by reference: they consume it and return a new
//! one.

pub mod crs;
pub mod progress;

use std::collections::BTreeMap;
use std::fmt;

use geo::{MultiPolygon, Point};
use serde::Serialize;

pub use crs::Crs;

/// A single attribute value.
///
/// `Missing` is the explicit marker for absent data (a null dBase field or
/// an unmatched join) and serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Missing,
}

impl AttributeValue {
    /// Numeric view of the value. Text is never parsed here; use the
    /// normalizer for that.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            Self::Text(_) | Self::Missing => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// The string form used to match this value against join keys.
    ///
    /// Text is trimmed, integral numbers drop their fractional part, and
    /// blank text or `Missing` produce no key at all.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn join_key(&self) -> Option<String> {
        match self {
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Integer(i) => Some(i.to_string()),
            Self::Number(n) if n.is_finite() => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Some((*n as i64).to_string())
                } else {
                    Some(n.to_string())
                }
            }
            Self::Number(_) | Self::Missing => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Missing => f.write_str("NA"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Target type for attribute normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Number,
    Integer,
    Text,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Text => "text",
        })
    }
}

/// Field name -> value mapping attached to one geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeRecord(BTreeMap<String, AttributeValue>);

impl AttributeRecord {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert, mostly for fixtures.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&AttributeValue> {
        self.0.get(field)
    }

    /// Inserts or replaces a field, returning the previous value.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<AttributeValue> {
        self.0.remove(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, AttributeValue)> for AttributeRecord {
    fn from_iter<I: IntoIterator<Item = (K, AttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A region polygon with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonFeature {
    pub geometry: MultiPolygon<f64>,
    pub attributes: AttributeRecord,
}

/// Ordered collection of region polygons sharing one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonDataset {
    pub crs: Crs,
    pub features: Vec<PolygonFeature>,
}

impl PolygonDataset {
    #[must_use]
    pub const fn new(crs: Crs, features: Vec<PolygonFeature>) -> Self {
        Self { crs, features }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterates the geometries in dataset order.
    pub fn geometries(&self) -> impl Iterator<Item = &MultiPolygon<f64>> {
        self.features.iter().map(|f| &f.geometry)
    }
}

/// A point location with its attributes.
///
/// `id` is the zero-based position the point had when it was loaded. It is
/// carried through reprojection and filtering unchanged so a filtered
/// dataset can be traced back to its source rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    pub id: usize,
    pub geometry: Point<f64>,
    pub attributes: AttributeRecord,
}

/// Ordered collection of points sharing one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDataset {
    pub crs: Crs,
    pub features: Vec<PointFeature>,
}

impl PointDataset {
    #[must_use]
    pub const fn new(crs: Crs, features: Vec<PointFeature>) -> Self {
        Self { crs, features }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Provenance ids of the points in this dataset, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<usize> {
        self.features.iter().map(|f| f.id).collect()
    }
}

/// Uniform access to the attribute records of either dataset kind.
pub trait AttributeTable {
    /// Records in dataset order.
    fn records(&self) -> Vec<&AttributeRecord>;

    /// Mutable records in dataset order. Only used by stages that own the
    /// dataset they are transforming.
    fn records_mut(&mut self) -> Vec<&mut AttributeRecord>;

    /// Keeps only the features whose index satisfies `keep`.
    #[must_use]
    fn retain_indices(self, keep: &dyn Fn(usize) -> bool) -> Self;
}

impl AttributeTable for PolygonDataset {
    fn records(&self) -> Vec<&AttributeRecord> {
        self.features.iter().map(|f| &f.attributes).collect()
    }

    fn records_mut(&mut self) -> Vec<&mut AttributeRecord> {
        self.features.iter_mut().map(|f| &mut f.attributes).collect()
    }

    fn retain_indices(self, keep: &dyn Fn(usize) -> bool) -> Self {
        let features = self
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(i, f)| keep(i).then_some(f))
            .collect();
        Self::new(self.crs, features)
    }
}

impl AttributeTable for PointDataset {
    fn records(&self) -> Vec<&AttributeRecord> {
        self.features.iter().map(|f| &f.attributes).collect()
    }

    fn records_mut(&mut self) -> Vec<&mut AttributeRecord> {
        self.features.iter_mut().map(|f| &mut f.attributes).collect()
    }

    fn retain_indices(self, keep: &dyn Fn(usize) -> bool) -> Self {
        let features = self
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(i, f)| keep(i).then_some(f))
            .collect();
        Self::new(self.crs, features)
    }
}
