//! Shapefile reading.
//!
//! Geometry comes from the `.shp`, attributes from the `.dbf`, and the CRS
//! declaration from the optional `.prj`. Attribute values are copied
//! without type guessing: a numeric-looking `Character` field stays text
//! until it is normalized explicitly.

use std::path::Path;

use crime_atlas_dataset_models::{
    AttributeRecord, AttributeValue, Crs, PointDataset, PointFeature, PolygonDataset,
    PolygonFeature,
};
use geo::{MultiPolygon, Point};
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};

use crate::LoadError;

/// Reads the CRS declaration next to a shapefile.
fn read_crs(shp: &Path) -> Crs {
    let prj = shp.with_extension("prj");
    match std::fs::read_to_string(&prj) {
        Ok(wkt) => Crs::from_declaration(&wkt),
        Err(e) => {
            log::warn!(
                "No usable CRS declaration at {} ({e}); coordinates are untagged",
                prj.display()
            );
            Crs::Unknown(String::new())
        }
    }
}

/// Opens the shapefile pair, checking the sidecars exist first so a
/// missing `.dbf` is reported as not found rather than a parse failure.
fn open(
    shp: &Path,
) -> Result<Reader<std::io::BufReader<std::fs::File>, std::io::BufReader<std::fs::File>>, LoadError>
{
    for required in [shp.to_path_buf(), shp.with_extension("dbf")] {
        if !required.is_file() {
            return Err(LoadError::not_found(&required));
        }
    }

    Reader::from_path(shp).map_err(|e| LoadError::format(shp, e.to_string()))
}

fn attribute_value(value: FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) => AttributeValue::Text(s.trim_end().to_string()),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            AttributeValue::Number(n)
        }
        FieldValue::Float(Some(f)) => AttributeValue::Number(f64::from(f)),
        FieldValue::Integer(i) => AttributeValue::Integer(i64::from(i)),
        FieldValue::Logical(Some(b)) => AttributeValue::Text(b.to_string()),
        FieldValue::Date(Some(d)) => {
            AttributeValue::Text(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        FieldValue::Memo(s) => AttributeValue::Text(s),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => AttributeValue::Missing,
        #[allow(unreachable_patterns)]
        other => AttributeValue::Text(format!("{other:?}")),
    }
}

fn attributes(record: shapefile::dbase::Record) -> AttributeRecord {
    record
        .into_iter()
        .map(|(name, value)| (name, attribute_value(value)))
        .collect()
}

fn to_multipolygon(shp: &Path, index: usize, shape: Shape) -> Result<MultiPolygon<f64>, LoadError> {
    let converted: Result<MultiPolygon<f64>, String> = match shape {
        Shape::Polygon(p) => p.try_into().map_err(|e| format!("{e:?}")),
        Shape::PolygonM(p) => p.try_into().map_err(|e| format!("{e:?}")),
        Shape::PolygonZ(p) => p.try_into().map_err(|e| format!("{e:?}")),
        // Null shapes keep their record so the attribute table stays aligned.
        Shape::NullShape => Ok(MultiPolygon(vec![])),
        other => {
            return Err(LoadError::format(
                shp,
                format!("record {index}: expected a polygon, found {:?}", other.shapetype()),
            ));
        }
    };

    converted.map_err(|e| LoadError::format(shp, format!("record {index}: {e}")))
}

pub fn read_polygons(shp: &Path) -> Result<PolygonDataset, LoadError> {
    let crs = read_crs(shp);
    let mut reader = open(shp)?;
    let mut features = Vec::new();

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) =
            result.map_err(|e| LoadError::format(shp, format!("record {index}: {e}")))?;
        features.push(PolygonFeature {
            geometry: to_multipolygon(shp, index, shape)?,
            attributes: attributes(record),
        });
    }

    Ok(PolygonDataset::new(crs, features))
}

pub fn read_points(shp: &Path) -> Result<PointDataset, LoadError> {
    let crs = read_crs(shp);
    let mut reader = open(shp)?;
    let mut features = Vec::new();

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) =
            result.map_err(|e| LoadError::format(shp, format!("record {index}: {e}")))?;

        let geometry = match shape {
            Shape::Point(p) => Point::new(p.x, p.y),
            Shape::PointM(p) => Point::new(p.x, p.y),
            Shape::PointZ(p) => Point::new(p.x, p.y),
            Shape::NullShape => {
                log::warn!("{}: record {index} has no geometry; skipping", shp.display());
                continue;
            }
            other => {
                return Err(LoadError::format(
                    shp,
                    format!("record {index}: expected a point, found {:?}", other.shapetype()),
                ));
            }
        };

        features.push(PointFeature {
            id: index,
            geometry,
            attributes: attributes(record),
        });
    }

    Ok(PointDataset::new(crs, features))
}
