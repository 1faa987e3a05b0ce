//! CSV export of a user's measurement history

use crate::error::{Error, Result};
use crate::model::{MeasurementEntry, UserId};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Row {
    date: String,
    first: String,
    second: String,
}

pub fn export_file_name(user_id: UserId) -> String {
    format!("measurements_{}.csv", user_id)
}

/// Render `entries` as CSV with a `date,first,second` header
pub fn history_csv(entries: &[MeasurementEntry]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for entry in entries {
        writer.serialize(Row {
            date: entry.display_date(),
            first: entry.first.to_string(),
            second: entry.second.to_string(),
        })?;
    }
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}
