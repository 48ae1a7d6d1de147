//! Grouped sums over tabular records.

use std::collections::BTreeMap;

use crime_atlas_crime_models::CrimeRecord;

use crate::PipelineError;

/// Region name to summed count. Regions with no matching records are
/// absent rather than zero.
pub type AggregatedCrime = BTreeMap<String, u64>;

/// Filters `records` by `predicate`, groups them by `group_key` and sums
/// `sum_field` per group.
///
/// Keys are trimmed so `"Camden "` and `"Camden"` land in the same group.
///
/// # Errors
///
/// Returns [`PipelineError::CountOverflow`] if a group's sum exceeds
/// `u64::MAX`.
pub fn aggregate<R>(
    records: &[R],
    predicate: impl Fn(&R) -> bool,
    group_key: impl Fn(&R) -> &str,
    sum_field: impl Fn(&R) -> u64,
) -> Result<AggregatedCrime, PipelineError> {
    let mut groups = AggregatedCrime::new();

    for record in records.iter().filter(|r| predicate(r)) {
        let key = group_key(record).trim();
        let total = groups.entry(key.to_string()).or_insert(0);
        *total = total
            .checked_add(sum_field(record))
            .ok_or_else(|| PipelineError::CountOverflow {
                key: key.to_string(),
                limit: u64::MAX,
            })?;
    }

    Ok(groups)
}

/// Sums `CrimeCount` per `Borough` over the rows whose `CrimeType` equals
/// `category`.
///
/// # Errors
///
/// Returns [`PipelineError::CountOverflow`] if a region's sum exceeds
/// `u64::MAX`.
pub fn aggregate_category(
    records: &[CrimeRecord],
    category: &str,
) -> Result<AggregatedCrime, PipelineError> {
    let groups = aggregate(
        records,
        |r| r.is_category(category),
        |r| r.borough.as_str(),
        |r| r.crime_count,
    )?;

    if groups.is_empty() {
        log::warn!("No crime rows matched category '{category}'");
    } else {
        log::info!(
            "Aggregated '{category}' into {} regions ({} total)",
            groups.len(),
            groups.values().map(|&v| u128::from(v)).sum::<u128>()
        );
    }

    Ok(groups)
}
