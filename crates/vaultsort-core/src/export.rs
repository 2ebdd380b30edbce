//! CSV output
//!
//! Rows follow the Bitwarden CSV import layout with the classification
//! columns in front, so the file can be reviewed and re-imported.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{Classification, Record};

/// Column order of the output file
pub const HEADER: [&str; 15] = [
    "id",
    "name",
    "category",
    "confidence",
    "reason",
    "folder",
    "favorite",
    "type",
    "notes",
    "fields",
    "reprompt",
    "login_uri",
    "login_username",
    "login_password",
    "login_totp",
];

/// One output line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub confidence: u8,
    pub reason: String,
    pub folder: String,
    pub favorite: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub notes: String,
    pub fields: String,
    pub reprompt: i64,
    pub login_uri: String,
    pub login_username: String,
    pub login_password: String,
    pub login_totp: String,
}

/// Output switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Put the category in the folder column unless it is Uncategorized
    pub category_as_folder: bool,
}

/// Build the output row for one classified record
pub fn assemble_row(
    record: &Record,
    classification: &Classification,
    options: ExportOptions,
) -> OutputRow {
    let folder = if options.category_as_folder && !classification.category.is_uncategorized() {
        classification.category.label().to_string()
    } else {
        record.folder_name.clone()
    };

    OutputRow {
        id: record.id.clone(),
        name: record.name.clone(),
        category: classification.category.label().to_string(),
        confidence: classification.confidence,
        reason: classification.reason.clone(),
        folder,
        favorite: if record.favorite { "1" } else { "" }.to_string(),
        item_type: record.item_type.as_str().into_owned(),
        notes: record.notes.clone(),
        fields: record
            .fields
            .iter()
            .map(|f| format!("{}: {}", f.name, f.value))
            .collect::<Vec<_>>()
            .join("\n"),
        reprompt: record.reprompt,
        login_uri: record.login_uris.join(","),
        login_username: record.username.clone(),
        login_password: record.password.clone(),
        login_totp: record.totp.clone(),
    }
}

/// Pair records with their ordered classifications
pub fn assemble_rows(
    records: &[Record],
    classifications: &[Classification],
    options: ExportOptions,
) -> Result<Vec<OutputRow>> {
    if records.len() != classifications.len() {
        return Err(Error::InternalConsistency(format!(
            "{} records but {} classifications",
            records.len(),
            classifications.len()
        )));
    }
    records
        .iter()
        .zip(classifications)
        .map(|(record, classification)| {
            if record.id != classification.item_id {
                return Err(Error::InternalConsistency(format!(
                    "Row for {} paired with classification for {}",
                    record.id, classification.item_id
                )));
            }
            Ok(assemble_row(record, classification, options))
        })
        .collect()
}

/// Render rows as CSV text with the header line
pub fn to_csv_string(rows: &[OutputRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_all(&mut writer, rows)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::InvalidData(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("CSV is not UTF-8: {}", e)))
}

/// Write rows to `path`
///
/// The file is written next to its destination and moved into place, so a
/// failed write never leaves a truncated CSV behind.
pub fn write_rows(path: &Path, rows: &[OutputRow]) -> Result<()> {
    let dir = output_dir(path)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        write_all(&mut writer, rows)?;
        writer.flush()?;
    }
    temp.as_file_mut().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    info!(path = %path.display(), rows = rows.len(), "Wrote categorized CSV");
    Ok(())
}

/// Check that the output location can be written before doing any work
pub fn validate_output_path(path: &Path) -> Result<()> {
    output_dir(path).map(|_| ())
}

fn output_dir(path: &Path) -> Result<&Path> {
    if path.as_os_str().is_empty() {
        return Err(Error::Configuration("Output path is empty".into()));
    }
    if path.is_dir() {
        return Err(Error::Configuration(format!(
            "Output path is a directory: {}",
            path.display()
        )));
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(dir),
        _ => Err(Error::Configuration(format!(
            "Output directory does not exist: {}",
            dir.display()
        ))),
    }
}

fn write_all<W: Write>(writer: &mut csv::Writer<W>, rows: &[OutputRow]) -> Result<()> {
    if rows.is_empty() {
        // serialize() only emits the header alongside the first row
        writer.write_record(HEADER)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    Ok(())
}
