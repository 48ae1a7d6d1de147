//! Attribute type normalization and attribute-only table operations.

use std::ops::RangeBounds;

use crime_atlas_dataset_models::{AttributeTable, AttributeValue, FieldType};

use crate::PipelineError;

/// Converts one value to `target`, or `None` if it cannot be represented.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn coerce(value: &AttributeValue, target: FieldType) -> Option<AttributeValue> {
    use AttributeValue::{Integer, Missing, Number, Text};

    match (value, target) {
        (Missing, _) => Some(Missing),

        (Text(s), FieldType::Text) => Some(Text(s.trim().to_string())),
        (Number(n), FieldType::Text) => Some(Text(n.to_string())),
        (Integer(i), FieldType::Text) => Some(Text(i.to_string())),

        (Text(s), FieldType::Number) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Number),
        (Number(n), FieldType::Number) => n.is_finite().then_some(Number(*n)),
        (Integer(i), FieldType::Number) => Some(Number(*i as f64)),

        (Text(s), FieldType::Integer) => {
            let s = s.trim();
            s.parse::<i64>().ok().map(Integer).or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .and_then(|n| coerce(&Number(n), FieldType::Integer))
            })
        }
        (Number(n), FieldType::Integer) => {
            let integral = n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15;
            integral.then_some(Integer(*n as i64))
        }
        (Integer(i), FieldType::Integer) => Some(Integer(*i)),
    }
}

/// Reparses `field` in every record as `target`.
///
/// `Missing` values stay missing. Nothing is written unless every record
/// converts, so a failure leaves no half-normalized dataset behind.
/// Normalizing an already-normalized field returns it unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::TypeCoercion`] listing every record whose value
/// does not convert, or that has no `field` at all.
pub fn normalize_field<D: AttributeTable>(
    mut dataset: D,
    field: &str,
    target: FieldType,
) -> Result<D, PipelineError> {
    let mut converted = Vec::new();
    let mut offending = Vec::new();

    for (index, record) in dataset.records().into_iter().enumerate() {
        match record.get(field).and_then(|v| coerce(v, target)) {
            Some(value) => converted.push(value),
            None => offending.push(index),
        }
    }

    if !offending.is_empty() {
        return Err(PipelineError::TypeCoercion {
            field: field.to_string(),
            target,
            indices: offending,
        });
    }

    for (record, value) in dataset.records_mut().into_iter().zip(converted) {
        record.insert(field, value);
    }

    log::debug!("Normalized field '{field}' to {target}");
    Ok(dataset)
}

/// Renames `from` to `to` in every record holding `from`, replacing any
/// existing `to` value.
#[must_use]
pub fn rename_field<D: AttributeTable>(mut dataset: D, from: &str, to: &str) -> D {
    if from == to {
        return dataset;
    }

    for record in dataset.records_mut() {
        if let Some(value) = record.remove(from) {
            record.insert(to, value);
        }
    }
    dataset
}

/// Keeps the features whose numeric `field` lies within `range`.
///
/// Records with a missing, textual or absent value are dropped. Normalize
/// the field first if it was loaded as text.
#[must_use]
pub fn select_by_range<D: AttributeTable>(
    dataset: D,
    field: &str,
    range: impl RangeBounds<f64>,
) -> D {
    let keep: Vec<bool> = dataset
        .records()
        .into_iter()
        .map(|record| {
            record
                .get(field)
                .and_then(AttributeValue::as_f64)
                .is_some_and(|v| range.contains(&v))
        })
        .collect();

    let before = keep.len();
    let selected = dataset.retain_indices(&|i| keep[i]);
    log::debug!(
        "Selected {} of {before} records by '{field}'",
        selected.records().len()
    );
    selected
}

#[cfg(test)]
mod tests {
    use std::ops::Bound;

    use crime_atlas_dataset_models::{AttributeRecord, Crs, PolygonDataset, PolygonFeature};
    use geo::MultiPolygon;

    use super::*;

    fn dataset(values: Vec<AttributeValue>) -> PolygonDataset {
        PolygonDataset::new(
            Crs::BritishNationalGrid,
            values
                .into_iter()
                .map(|v| PolygonFeature {
                    geometry: MultiPolygon(vec![]),
                    attributes: AttributeRecord::new().with("Partic_Per", v),
                })
                .collect(),
        )
    }

    fn values(ds: &PolygonDataset, field: &str) -> Vec<AttributeValue> {
        ds.records()
            .into_iter()
            .map(|r| r.get(field).cloned().unwrap_or(AttributeValue::Missing))
            .collect()
    }

    #[test]
    fn text_numbers_become_numbers() {
        let ds = dataset(vec![" 21.7".into(), "19".into(), AttributeValue::Missing]);
        let out = normalize_field(ds, "Partic_Per", FieldType::Number).unwrap();
        assert_eq!(
            values(&out, "Partic_Per"),
            vec![
                AttributeValue::Number(21.7),
                AttributeValue::Number(19.0),
                AttributeValue::Missing
            ]
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let ds = dataset(vec!["21.7".into(), AttributeValue::Integer(3), "1e2".into()]);
        let once = normalize_field(ds, "Partic_Per", FieldType::Number).unwrap();
        let twice = normalize_field(once.clone(), "Partic_Per", FieldType::Number).unwrap();
        assert_eq!(once, twice);

        let ints = dataset(vec!["198020".into(), AttributeValue::Number(4.0)]);
        let once = normalize_field(ints, "Partic_Per", FieldType::Integer).unwrap();
        let twice = normalize_field(once.clone(), "Partic_Per", FieldType::Integer).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            values(&once, "Partic_Per"),
            vec![AttributeValue::Integer(198_020), AttributeValue::Integer(4)]
        );
    }

    #[test]
    fn every_unparseable_index_is_reported() {
        let ds = dataset(vec!["12".into(), "n/a".into(), "".into(), "NaN".into()]);
        match normalize_field(ds, "Partic_Per", FieldType::Number) {
            Err(PipelineError::TypeCoercion { field, indices, .. }) => {
                assert_eq!(field, "Partic_Per");
                assert_eq!(indices, vec![1, 2, 3]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn integer_target_rejects_fractions() {
        let ds = dataset(vec!["3.5".into(), AttributeValue::Number(2.0)]);
        match normalize_field(ds, "Partic_Per", FieldType::Integer) {
            Err(PipelineError::TypeCoercion { indices, .. }) => assert_eq!(indices, vec![0]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn absent_field_is_an_error() {
        let ds = dataset(vec!["1".into()]);
        assert!(matches!(
            normalize_field(ds, "Pop_2001", FieldType::Integer),
            Err(PipelineError::TypeCoercion { ref indices, .. }) if indices == &[0]
        ));
    }

    #[test]
    fn rename_moves_values() {
        let ds = dataset(vec!["1".into(), "2".into()]);
        let out = rename_field(ds, "Partic_Per", "participation");
        assert!(out.records().iter().all(|r| !r.contains("Partic_Per")));
        assert_eq!(
            values(&out, "participation"),
            vec![AttributeValue::from("1"), AttributeValue::from("2")]
        );
    }

    #[test]
    fn select_by_exclusive_range() {
        let ds = dataset(vec![
            AttributeValue::Number(20.0),
            AttributeValue::Number(21.7),
            AttributeValue::Number(24.9),
            AttributeValue::Number(25.0),
            AttributeValue::Missing,
            "22".into(),
        ]);
        let out = select_by_range(ds, "Partic_Per", (Bound::Excluded(20.0), Bound::Excluded(25.0)));
        assert_eq!(
            values(&out, "Partic_Per"),
            vec![AttributeValue::Number(21.7), AttributeValue::Number(24.9)]
        );
    }
}
