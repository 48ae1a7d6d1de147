//! `GeoJSON` reading and writing.
//!
//! Files without a `crs` member are WGS84, per RFC 7946. Datasets in any
//! other system are written with the legacy named-CRS member so they load
//! back with the same tag.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crime_atlas_dataset_models::{
    AttributeRecord, AttributeValue, Crs, PointDataset, PointFeature, PolygonDataset,
    PolygonFeature,
};
use geo::MultiPolygon;
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};

use crate::LoadError;

fn read_collection(path: &Path) -> Result<(Crs, Vec<Feature>), LoadError> {
    let file = File::open(path).map_err(|e| LoadError::from_io(path, &e))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .map_err(|e| LoadError::format(path, e.to_string()))?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(LoadError::format(path, "expected a FeatureCollection"));
    };

    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(serde_json::Value::as_str)
        .map_or(Crs::Wgs84, Crs::from_declaration);

    Ok((crs, collection.features))
}

fn json_to_attribute(value: serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Missing,
        serde_json::Value::String(s) => AttributeValue::Text(s),
        serde_json::Value::Number(n) => n.as_i64().map_or_else(
            || n.as_f64().map_or(AttributeValue::Missing, AttributeValue::Number),
            AttributeValue::Integer,
        ),
        serde_json::Value::Bool(b) => AttributeValue::Text(b.to_string()),
        other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
            AttributeValue::Text(other.to_string())
        }
    }
}

fn attributes(properties: Option<JsonObject>) -> AttributeRecord {
    properties
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, json_to_attribute(v)))
        .collect()
}

pub(crate) fn read_polygons(path: &Path) -> Result<PolygonDataset, LoadError> {
    let (crs, features) = read_collection(path)?;
    let mut polygons = Vec::with_capacity(features.len());

    for (index, feature) in features.into_iter().enumerate() {
        let geometry = match feature.geometry {
            None => MultiPolygon(vec![]),
            Some(geometry) => {
                let geo_geom: geo::Geometry<f64> = geometry
                    .value
                    .try_into()
                    .map_err(|e| LoadError::format(path, format!("feature {index}: {e}")))?;
                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
                    _ => {
                        return Err(LoadError::format(
                            path,
                            format!("feature {index}: expected a polygon geometry"),
                        ));
                    }
                }
            }
        };

        polygons.push(PolygonFeature {
            geometry,
            attributes: attributes(feature.properties),
        });
    }

    Ok(PolygonDataset::new(crs, polygons))
}

/// A non-negative integer `id` member, as written by [`points_to_collection`].
fn feature_id(id: Option<&Id>) -> Option<usize> {
    match id? {
        Id::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Id::String(_) => None,
    }
}

pub(crate) fn read_points(path: &Path) -> Result<PointDataset, LoadError> {
    let (crs, features) = read_collection(path)?;
    let mut points = Vec::with_capacity(features.len());

    for (index, feature) in features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            log::warn!("{}: feature {index} has no geometry; skipping", path.display());
            continue;
        };

        let geo_geom: geo::Geometry<f64> = geometry
            .value
            .try_into()
            .map_err(|e| LoadError::format(path, format!("feature {index}: {e}")))?;
        let geo::Geometry::Point(point) = geo_geom else {
            return Err(LoadError::format(
                path,
                format!("feature {index}: expected a point geometry"),
            ));
        };

        points.push(PointFeature {
            id: feature_id(feature.id.as_ref()).unwrap_or(index),
            geometry: point,
            attributes: attributes(feature.properties),
        });
    }

    Ok(PointDataset::new(crs, points))
}

/// Converts attributes to `GeoJSON` properties. Non-finite numbers become
/// `null`.
#[must_use]
pub fn properties(record: &AttributeRecord) -> JsonObject {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => JsonObject::new(),
    }
}

fn crs_member(crs: &Crs) -> Option<JsonObject> {
    let name = match crs {
        Crs::Wgs84 => return None,
        Crs::Unknown(declaration) if declaration.is_empty() => return None,
        Crs::Unknown(declaration) => declaration.clone(),
        known => format!("urn:ogc:def:crs:EPSG::{}", known.epsg().unwrap_or_default()),
    };

    let mut members = JsonObject::new();
    members.insert(
        "crs".to_string(),
        serde_json::json!({ "type": "name", "properties": { "name": name } }),
    );
    Some(members)
}

fn feature(geometry: geojson::Geometry, record: &AttributeRecord) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties(record)),
        foreign_members: None,
    }
}

/// Builds a `FeatureCollection` from a polygon dataset, coordinates as-is.
#[must_use]
pub fn polygons_to_collection(dataset: &PolygonDataset) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: dataset
            .features
            .iter()
            .map(|f| {
                feature(
                    geojson::Geometry::new(geojson::Value::from(&f.geometry)),
                    &f.attributes,
                )
            })
            .collect(),
        foreign_members: crs_member(&dataset.crs),
    }
}

/// Builds a `FeatureCollection` from a point dataset. Each feature's `id`
/// member carries the point's provenance id.
#[must_use]
pub fn points_to_collection(dataset: &PointDataset) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: dataset
            .features
            .iter()
            .map(|f| {
                let mut out = feature(
                    geojson::Geometry::new(geojson::Value::from(&f.geometry)),
                    &f.attributes,
                );
                out.id = Some(Id::Number(f.id.into()));
                out
            })
            .collect(),
        foreign_members: crs_member(&dataset.crs),
    }
}

pub(crate) fn write_collection(collection: &FeatureCollection, path: &Path) -> Result<(), LoadError> {
    let write_err = |source| LoadError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let json = serde_json::to_string(collection).map_err(|e| write_err(e.into()))?;
    std::fs::write(path, json).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use geo::Point;

    use super::*;
    use crate::{load_points, load_polygons, load_prebuilt, save_points, save_polygons, scratch};

    const BOROUGHS: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::27700" } },
        "features": [
            {
                "type": "Feature",
                "properties": { "name": "Camden", "Partic_Per": "21.7", "Pop_2001": 198020, "code": null },
                "geometry": { "type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]] }
            },
            {
                "type": "Feature",
                "properties": { "name": "Islington", "Partic_Per": "19.0", "Pop_2001": 175797, "code": null },
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn reads_polygons_with_named_crs() {
        let dir = scratch::dir("geojson_polygons");
        let path = dir.join("boroughs.geojson");
        fs::write(&path, BOROUGHS).unwrap();

        let dataset = load_polygons(&path).unwrap();
        assert_eq!(dataset.crs, Crs::BritishNationalGrid);
        assert_eq!(dataset.len(), 2);

        let camden = &dataset.features[0].attributes;
        assert_eq!(camden.get("Partic_Per"), Some(&AttributeValue::from("21.7")));
        assert_eq!(camden.get("Pop_2001"), Some(&AttributeValue::Integer(198_020)));
        assert_eq!(camden.get("code"), Some(&AttributeValue::Missing));
        // A null geometry keeps its record.
        assert!(dataset.features[1].geometry.0.is_empty());
    }

    #[test]
    fn point_file_in_polygon_loader_is_rejected() {
        let dir = scratch::dir("geojson_wrong_kind");
        let path = dir.join("stations.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1,2]}}
            ]}"#,
        )
        .unwrap();

        let err = load_polygons(&path).unwrap_err();
        assert!(err.to_string().contains("feature 0"), "{err}");
    }

    #[test]
    fn reads_points_as_wgs84_and_keeps_positions() {
        let dir = scratch::dir("geojson_points");
        let path = dir.join("stations.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"NAME":"Bank"},"geometry":{"type":"Point","coordinates":[-0.0886,51.5133]}},
                {"type":"Feature","properties":{"NAME":"Ghost"},"geometry":null},
                {"type":"Feature","properties":{"NAME":"Angel"},"geometry":{"type":"Point","coordinates":[-0.1058,51.5322]}}
            ]}"#,
        )
        .unwrap();

        let points = load_points(&path).unwrap();
        assert_eq!(points.crs, Crs::Wgs84);
        assert_eq!(points.ids(), vec![0, 2]);
        assert_eq!(
            points.features[1].attributes.get("NAME"),
            Some(&AttributeValue::from("Angel"))
        );
    }

    #[test]
    fn malformed_json_is_format_error() {
        let dir = scratch::dir("geojson_malformed");
        let path = dir.join("broken.geojson");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_polygons(&path).unwrap_err(),
            LoadError::Format { .. }
        ));
    }

    #[test]
    fn saved_dataset_loads_back_as_prebuilt() {
        let dir = scratch::dir("geojson_prebuilt");
        let source = dir.join("boroughs.geojson");
        fs::write(&source, BOROUGHS).unwrap();
        let mut dataset = load_polygons(&source).unwrap();
        dataset.features[0]
            .attributes
            .insert("CrimeCount", AttributeValue::Integer(120));
        dataset.features[1]
            .attributes
            .insert("CrimeCount", AttributeValue::Missing);

        let out = dir.join("nested").join("joined.geojson");
        save_polygons(&dataset, &out).unwrap();
        let reloaded = load_prebuilt(&out).unwrap();

        assert_eq!(reloaded.crs, Crs::BritishNationalGrid);
        assert_eq!(
            reloaded.features[0].attributes.get("CrimeCount"),
            Some(&AttributeValue::Integer(120))
        );
        assert_eq!(
            reloaded.features[1].attributes.get("CrimeCount"),
            Some(&AttributeValue::Missing)
        );
    }

    #[test]
    fn wgs84_collections_have_no_crs_member() {
        let dataset = PolygonDataset::new(Crs::Wgs84, vec![]);
        assert!(polygons_to_collection(&dataset).foreign_members.is_none());

        let points = PointDataset::new(
            Crs::WebMercator,
            vec![PointFeature {
                id: 7,
                geometry: Point::new(1.0, 2.0),
                attributes: AttributeRecord::new(),
            }],
        );
        let collection = points_to_collection(&points);
        assert!(collection.foreign_members.is_some());
        assert_eq!(
            collection.features[0].id,
            Some(Id::Number(7.into()))
        );
    }

    #[test]
    fn saved_point_ids_survive_a_reload() {
        let dir = scratch::dir("geojson_point_ids");
        let points = PointDataset::new(
            Crs::BritishNationalGrid,
            [(3, 527_500.0), (7, 531_000.0)]
                .into_iter()
                .map(|(id, x)| PointFeature {
                    id,
                    geometry: Point::new(x, 182_500.0),
                    attributes: AttributeRecord::new().with("NAME", format!("station {id}")),
                })
                .collect(),
        );
        let path = dir.join("points_within.geojson");
        save_points(&points, &path).unwrap();

        let reloaded = load_points(&path).unwrap();
        assert_eq!(reloaded.crs, Crs::BritishNationalGrid);
        assert_eq!(reloaded.ids(), [3, 7]);
        assert_eq!(
            reloaded.features[1].attributes.get("NAME"),
            Some(&AttributeValue::from("station 7"))
        );
    }

    #[test]
    fn string_or_negative_ids_fall_back_to_position() {
        let dir = scratch::dir("geojson_odd_ids");
        let path = dir.join("stations.geojson");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","id":"bank","properties":{},"geometry":{"type":"Point","coordinates":[0,0]}},
                {"type":"Feature","id":-4,"properties":{},"geometry":{"type":"Point","coordinates":[1,1]}},
                {"type":"Feature","id":12,"properties":{},"geometry":{"type":"Point","coordinates":[2,2]}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(load_points(&path).unwrap().ids(), [0, 1, 12]);
    }
}
