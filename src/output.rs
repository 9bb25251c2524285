//! Output formatting and persistence.
//!
//! Supports JSON logging of query results and CSV append/reload for the
//! position sample log.

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use csv::WriterBuilder;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &Path, record: &impl Serialize) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Reads every row of a CSV file written by [`append_record`].
///
/// A missing file yields no rows.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let record: T = result?;
        rows.push(record);
    }

    Ok(rows)
}
