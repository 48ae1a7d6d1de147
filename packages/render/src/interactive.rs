//! Standalone Leaflet page over OpenStreetMap tiles.
//!
//! Polygons and points arrive already in WGS84 and are exported as
//! `GeoJSON` embedded in the page. Each polygon carries its fill in a `_fill`
//! property; properties starting with `_` are left out of the popups.

use crime_atlas_dataset_models::{AttributeValue, Crs, PointDataset, PolygonDataset};
use crime_atlas_loader::geojson_io::{points_to_collection, polygons_to_collection};
use geo::BoundingRect;
use geojson::FeatureCollection;
use image::Rgba;

use crate::RenderError;
use crate::canvas::union_bounds;
use crate::color::{ColorRamp, MISSING, to_hex};

const TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{TITLE}}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map { height: 100%; margin: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const polygons = {{POLYGONS}};
const points = {{POINTS}};
const bounds = {{BOUNDS}};

function escapeHtml(value) {
  return String(value).replace(/[&<>"']/g, (c) => ({
    "&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;", "'": "&#39;"
  })[c]);
}

function popup(properties) {
  return Object.entries(properties || {})
    .filter(([key]) => !key.startsWith("_"))
    .map(([key, value]) => "<b>" + escapeHtml(key) + "</b>: " + (value === null ? "NA" : escapeHtml(value)))
    .join("<br>");
}

const map = L.map("map");
L.tileLayer("https://tile.openstreetmap.org/{z}/{x}/{y}.png", {
  maxZoom: 19,
  attribution: "&copy; OpenStreetMap contributors"
}).addTo(map);

L.geoJSON(polygons, {
  style: (feature) => ({
    color: "#404040",
    weight: 1,
    fillColor: feature.properties._fill,
    fillOpacity: 0.7
  }),
  onEachFeature: (feature, layer) => layer.bindPopup(popup(feature.properties))
}).addTo(map);

L.geoJSON(points, {
  pointToLayer: (feature, latlng) => L.circleMarker(latlng, {
    radius: 4, color: "#2166ac", weight: 1, fillOpacity: 0.9
  }),
  onEachFeature: (feature, layer) => layer.bindPopup(popup(feature.properties))
}).addTo(map);

map.fitBounds(bounds);
</script>
</body>
</html>
"##;

#[derive(Debug, Clone)]
pub struct InteractiveOptions {
    pub title: String,
    /// Numeric field driving polygon fill; `None` fills everything grey.
    pub color_field: Option<String>,
    pub low_color: Rgba<u8>,
    pub high_color: Rgba<u8>,
}

impl Default for InteractiveOptions {
    fn default() -> Self {
        Self {
            title: "Crime atlas".to_string(),
            color_field: Some("CrimeCount".to_string()),
            low_color: Rgba([255, 255, 178, 255]),
            high_color: Rgba([189, 0, 38, 255]),
        }
    }
}

/// Leaflet places `GeoJSON` coordinates as longitude/latitude.
fn ensure_geographic(crs: &Crs) -> Result<(), RenderError> {
    if crs.is_geographic() {
        Ok(())
    } else {
        Err(RenderError::NotGeographic { crs: crs.clone() })
    }
}

fn add_fills(collection: &mut FeatureCollection, polygons: &PolygonDataset, options: &InteractiveOptions) {
    let values: Vec<Option<f64>> = polygons
        .features
        .iter()
        .map(|f| {
            options
                .color_field
                .as_deref()
                .and_then(|field| f.attributes.get(field))
                .and_then(AttributeValue::as_f64)
        })
        .collect();
    let ramp = ColorRamp::spanning(
        options.low_color,
        options.high_color,
        values.iter().flatten().copied(),
    );

    for (feature, value) in collection.features.iter_mut().zip(values) {
        let fill = ramp.map_or(MISSING, |r| r.color(value));
        feature
            .properties
            .get_or_insert_with(Default::default)
            .insert("_fill".to_string(), serde_json::Value::String(to_hex(fill)));
    }
}

/// JSON that can sit inside a `<script>` element. `{{` only ever occurs
/// inside JSON strings, so escaping it keeps placeholders out of the data.
fn script_json(value: &impl serde::Serialize) -> Result<String, RenderError> {
    Ok(serde_json::to_string(value)?
        .replace("</", "<\\/")
        .replace("{{", "{\\u007b"))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('{', "&#123;")
}

/// Builds the interactive map page for `polygons` and optional `points`,
/// both in WGS84.
///
/// # Errors
///
/// Returns [`RenderError::NotGeographic`] if either dataset is in another
/// CRS, [`RenderError::EmptyExtent`] if nothing has coordinates, and
/// [`RenderError::Json`] if serialization fails.
pub fn render_interactive(
    polygons: &PolygonDataset,
    points: Option<&PointDataset>,
    options: &InteractiveOptions,
) -> Result<String, RenderError> {
    ensure_geographic(&polygons.crs)?;
    let no_points = PointDataset::new(Crs::Wgs84, vec![]);
    let points = points.unwrap_or(&no_points);
    ensure_geographic(&points.crs)?;

    let bounds = union_bounds(
        polygons
            .geometries()
            .filter_map(BoundingRect::bounding_rect)
            .chain(points.features.iter().map(|f| geo::Rect::new(f.geometry.0, f.geometry.0))),
    )
    .filter(|r| {
        [r.min().x, r.min().y, r.max().x, r.max().y]
            .iter()
            .all(|v| v.is_finite())
    })
    .ok_or(RenderError::EmptyExtent)?;

    let mut polygon_collection = polygons_to_collection(polygons);
    add_fills(&mut polygon_collection, polygons, options);
    let point_collection = points_to_collection(points);

    // Leaflet wants [[south, west], [north, east]].
    let leaflet_bounds = [
        [bounds.min().y, bounds.min().x],
        [bounds.max().y, bounds.max().x],
    ];

    let html = TEMPLATE
        .replace("{{TITLE}}", &escape_html(&options.title))
        .replace("{{POLYGONS}}", &script_json(&polygon_collection)?)
        .replace("{{POINTS}}", &script_json(&point_collection)?)
        .replace("{{BOUNDS}}", &script_json(&leaflet_bounds)?);

    log::info!(
        "Built interactive map with {} polygons and {} points",
        polygons.len(),
        points.len()
    );
    Ok(html)
}
