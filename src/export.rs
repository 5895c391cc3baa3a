use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::record::TestCaseRecord;

pub const CSV_HEADER: [&str; 4] = ["Test Case", "Description", "Steps", "Expected Outcome"];

/// Writes `records` as CSV rows under [`CSV_HEADER`] to any writer.
pub fn write_records<W: Write>(records: &[TestCaseRecord], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;
    for record in records {
        csv_writer.write_record([
            record.title.trim(),
            record.description.trim(),
            record.steps.trim(),
            record.expected_outcome.trim(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Exports `records` to `destination`. Returns the number of rows written;
/// an empty input writes nothing and returns 0.
pub fn export_csv(records: &[TestCaseRecord], destination: &Path) -> Result<usize> {
    if records.is_empty() {
        warn!("No test cases to write to CSV.");
        return Ok(0);
    }

    if let Err(e) = write_file(records, destination) {
        error!(
            "Error writing test cases to '{}': {}",
            destination.display(),
            e
        );
        return Err(e);
    }

    info!(
        "{} test cases successfully written to '{}'.",
        records.len(),
        destination.display()
    );
    Ok(records.len())
}

fn write_file(records: &[TestCaseRecord], destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(destination)?;
    write_records(records, file)
}
