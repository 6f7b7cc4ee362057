//! Column extraction from spreadsheets.
//!
//! Workbooks (xlsx, xls, ods) are read through calamine from their first
//! sheet; anything without a workbook signature is parsed as CSV.

use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::errors::DedupError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Read `column` from a spreadsheet file with a header row.
///
/// Returns `(row_index, text)` in file order; `row_index` is the 1-based
/// data row number.
pub fn read_column(path: &Path, column: &str) -> Result<Vec<(usize, String)>, DedupError> {
    let bytes = std::fs::read(path)
        .map_err(|e| DedupError::Input(format!("cannot open {}: {e}", path.display())))?;
    read_column_bytes(&bytes, column)
}

/// Same as [`read_column`] for an in-memory upload.
pub fn read_column_bytes(bytes: &[u8], column: &str) -> Result<Vec<(usize, String)>, DedupError> {
    if is_workbook(bytes) {
        read_workbook_column(bytes, column)
    } else {
        read_column_from(bytes, column)
    }
}

fn is_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC)
}

fn unreadable(err: impl std::fmt::Display) -> DedupError {
    DedupError::Input(format!("unreadable spreadsheet: {err}"))
}

fn locate_column(headers: &[&str], column: &str) -> Result<usize, DedupError> {
    headers
        .iter()
        .position(|header| header.trim() == column.trim())
        .ok_or_else(|| {
            DedupError::Input(format!(
                "column '{column}' not found, available columns: {}",
                headers.join(", ")
            ))
        })
}

fn read_workbook_column(bytes: &[u8], column: &str) -> Result<Vec<(usize, String)>, DedupError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(unreadable)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DedupError::Input("workbook has no sheets".to_string()))?;
    let range = workbook.worksheet_range(&sheet).map_err(unreadable)?;

    let mut grid = range.rows();
    let headers: Vec<String> = grid
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default();
    let names: Vec<&str> = headers.iter().map(String::as_str).collect();
    let position = locate_column(&names, column)?;

    let rows: Vec<(usize, String)> = grid
        .enumerate()
        .map(|(i, row)| (i + 1, row.get(position).map(cell_text).unwrap_or_default()))
        .collect();

    log::info!("read {} rows from column '{column}' of sheet '{sheet}'", rows.len());
    Ok(rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// CSV variant of [`read_column`].
pub fn read_column_from<R: Read>(
    reader: R,
    column: &str,
) -> Result<Vec<(usize, String)>, DedupError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers().map_err(unreadable)?.clone();
    let names: Vec<&str> = headers.iter().collect();
    let position = locate_column(&names, column)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(unreadable)?;
        let text = record.get(position).unwrap_or_default().to_string();
        rows.push((i + 1, text));
    }

    log::info!("read {} rows from column '{column}'", rows.len());
    Ok(rows)
}
