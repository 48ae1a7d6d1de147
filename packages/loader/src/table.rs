//! Delimited crime table reading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crime_atlas_crime_models::CrimeRecord;

use crate::{LoadError, has_extension};

const REQUIRED_COLUMNS: [&str; 3] = ["Borough", "CrimeType", "CrimeCount"];

pub fn read_crime_table(path: &Path) -> Result<Vec<CrimeRecord>, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::from_io(path, &e))?;
    let delimiter = if has_extension(path, "tsv") { b'\t' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader
        .headers()
        .map_err(|e| LoadError::format(path, e.to_string()))?
        .clone();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::format(
            path,
            format!("missing required column(s): {}", missing.join(", ")),
        ));
    }

    let mut records = Vec::new();
    for (i, result) in reader.deserialize::<CrimeRecord>().enumerate() {
        // Row 1 is the header.
        let record =
            result.map_err(|e| LoadError::format(path, format!("row {}: {e}", i + 2)))?;
        records.push(record);
    }

    Ok(records)
}
