//! Left join of aggregated counts onto polygon attributes.

use std::collections::BTreeMap;

use crime_atlas_dataset_models::{AttributeValue, PolygonDataset};

use crate::PipelineError;
use crate::aggregate::AggregatedCrime;

/// Rejects datasets where one key names polygons with different records.
fn check_collisions(dataset: &PolygonDataset, polygon_key: &str) -> Result<(), PipelineError> {
    let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, feature) in dataset.features.iter().enumerate() {
        if let Some(key) = feature.attributes.get(polygon_key).and_then(AttributeValue::join_key) {
            by_key.entry(key).or_default().push(index);
        }
    }

    for (key, indices) in by_key {
        let first = &dataset.features[indices[0]].attributes;
        let differs = indices[1..]
            .iter()
            .any(|&i| dataset.features[i].attributes != *first);
        if differs {
            return Err(PipelineError::JoinKeyCollision { key, indices });
        }
    }

    Ok(())
}

/// Writes `mapping[key]` into `output_field` of every polygon, where `key`
/// is the polygon's `polygon_key` attribute.
///
/// Every polygon is kept. Polygons without a match, or without a usable
/// key, get [`AttributeValue::Missing`]. Keys are compared after trimming;
/// numeric keys compare by their integer form (`1.0` matches `"1"`).
///
/// # Errors
///
/// Returns [`PipelineError::JoinKeyCollision`] if two polygons share a key
/// but have different attribute records. Identical duplicates are joined
/// like any other polygon. Returns [`PipelineError::CountOverflow`] if a
/// matched count does not fit an integer attribute.
pub fn join_attributes(
    mut dataset: PolygonDataset,
    mapping: &AggregatedCrime,
    polygon_key: &str,
    output_field: &str,
) -> Result<PolygonDataset, PipelineError> {
    check_collisions(&dataset, polygon_key)?;

    let mut unmatched = Vec::new();
    for feature in &mut dataset.features {
        let key = feature
            .attributes
            .get(polygon_key)
            .and_then(AttributeValue::join_key);
        let value = match key.as_ref().and_then(|k| Some((k, mapping.get(k)?))) {
            Some((k, &count)) => AttributeValue::Integer(i64::try_from(count).map_err(|_| {
                PipelineError::CountOverflow {
                    key: k.clone(),
                    limit: i64::MAX.unsigned_abs(),
                }
            })?),
            None => AttributeValue::Missing,
        };

        if value.is_missing() {
            unmatched.push(key.unwrap_or_else(|| "<no key>".to_string()));
        }
        feature.attributes.insert(output_field, value);
    }

    log::info!(
        "Joined '{output_field}' onto {} polygons ({} unmatched)",
        dataset.len(),
        unmatched.len()
    );
    if !unmatched.is_empty() {
        log::debug!("Unmatched regions: {}", unmatched.join(", "));
    }

    Ok(dataset)
}
