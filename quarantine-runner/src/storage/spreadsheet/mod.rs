// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The spreadsheet storage backend.
//!
//! Each table is a worksheet whose first row names the columns. Records are
//! matched to rows by the `id` column: matching rows are overwritten cell by
//! cell, and records without a match are appended after the last row.
//!
//! The header row defines the schema. Record fields without a matching header
//! are dropped on write, and read back as absent. Columns that aren't record
//! fields are left untouched on existing rows and written empty on new rows.

mod json_workbook;
mod memory;
mod worksheet;

pub use json_workbook::JsonWorkbookClient;
pub use memory::MemoryWorkbookClient;
pub use worksheet::Worksheet;

use super::{BackendKind, StoragePort};
use crate::errors::{MalformedRecordError, StorageError};
use chrono::DateTime;
use quarantine_metadata::{ExtraAttributes, TestRecord, TestStatus};
use std::collections::HashMap;
use tracing::debug;

/// The primitives a spreadsheet service must provide.
///
/// Remote spreadsheet services usually apply a saved worksheet as a series of
/// cell updates, so a save that fails midway may leave some rows written.
pub trait WorkbookClient: Send + Sync {
    /// Loads the worksheet with the given title.
    fn load_worksheet(
        &self,
        title: &str,
    ) -> impl Future<Output = Result<Worksheet, StorageError>> + Send;

    /// Saves a worksheet previously returned by
    /// [`load_worksheet`](Self::load_worksheet).
    fn save_worksheet(
        &self,
        worksheet: &Worksheet,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// A [`StoragePort`] over a [`WorkbookClient`].
#[derive(Debug)]
pub struct SpreadsheetBackend<W> {
    client: W,
}

impl<W: WorkbookClient> SpreadsheetBackend<W> {
    /// Creates a new backend over `client`.
    pub fn new(client: W) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &W {
        &self.client
    }
}

impl<W: WorkbookClient> StoragePort for SpreadsheetBackend<W> {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Spreadsheet
    }

    async fn fetch_items(&self, table: &str) -> Result<Vec<TestRecord>, StorageError> {
        let worksheet = self.client.load_worksheet(table).await?;
        parse_rows(&worksheet).map_err(|error| StorageError::Malformed {
            backend: BackendKind::Spreadsheet,
            table: table.to_owned(),
            error,
        })
    }

    async fn write_items(&self, table: &str, records: &[TestRecord]) -> Result<(), StorageError> {
        let mut worksheet = self.client.load_worksheet(table).await?;
        if worksheet.headers().is_none_or(|headers| headers.is_empty()) {
            debug!("worksheet `{table}` has no header row, initializing it");
            let headers = TestRecord::FIELDS.iter().map(|&f| f.to_owned()).collect();
            worksheet.insert_rows(1, vec![headers]);
        }

        let headers = worksheet.headers().map(<[_]>::to_vec).unwrap_or_default();
        let id_col = id_column(&headers).ok_or_else(|| StorageError::Malformed {
            backend: BackendKind::Spreadsheet,
            table: table.to_owned(),
            error: MalformedRecordError::MissingIdColumn,
        })?;

        // Map existing ids to their 1-based row numbers.
        let existing: HashMap<String, usize> = worksheet
            .rows()
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(idx, row)| {
                let id = row.get(id_col).filter(|id| !id.is_empty())?;
                Some((id.clone(), idx + 1))
            })
            .collect();

        let mut new_rows: Vec<Vec<String>> = Vec::new();
        let mut pending: HashMap<&str, usize> = HashMap::new();

        for record in records {
            let cells: Vec<Option<String>> = headers
                .iter()
                .map(|header| cell_value(record, header))
                .collect();

            if let Some(&row) = existing.get(record.id.as_str()) {
                // Overwrite the existing row.
                for (col_idx, cell) in cells.into_iter().enumerate() {
                    if let Some(cell) = cell {
                        worksheet.set_cell(row, col_idx + 1, cell);
                    }
                }
            } else {
                let cells = cells.into_iter().map(Option::unwrap_or_default).collect();
                // A record repeated within the batch replaces its pending row
                // rather than appending a duplicate.
                match pending.get(record.id.as_str()) {
                    Some(&idx) => new_rows[idx] = cells,
                    None => {
                        pending.insert(record.id.as_str(), new_rows.len());
                        new_rows.push(cells);
                    }
                }
            }
        }

        // Insert records whose ids weren't found after the last existing row.
        worksheet.insert_rows(worksheet.num_rows() + 1, new_rows);

        self.client.save_worksheet(&worksheet).await
    }
}

fn id_column(headers: &[String]) -> Option<usize> {
    headers.iter().position(|h| h == TestRecord::ID)
}

/// Returns the cell contents for `header`, or `None` if the header isn't a
/// record field.
fn cell_value(record: &TestRecord, header: &str) -> Option<String> {
    let value = match header {
        TestRecord::ID => record.id.as_str().to_owned(),
        TestRecord::STATUS => record.status.as_str().to_owned(),
        TestRecord::CONSECUTIVE_PASSES => record.consecutive_passes.to_string(),
        TestRecord::FULL_DESCRIPTION => record.full_description.clone().unwrap_or_default(),
        TestRecord::LOCATION => record.location.clone().unwrap_or_default(),
        TestRecord::EXTRA_ATTRIBUTES => match &record.extra_attributes {
            Some(attributes) => serde_json::Value::Object(attributes.clone()).to_string(),
            None => String::new(),
        },
        TestRecord::UPDATED_AT => record
            .updated_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        _ => return None,
    };
    Some(value)
}

fn parse_rows(worksheet: &Worksheet) -> Result<Vec<TestRecord>, MalformedRecordError> {
    let Some((headers, rows)) = worksheet.rows().split_first() else {
        return Ok(Vec::new());
    };
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    if id_column(headers).is_none() {
        return Err(MalformedRecordError::MissingIdColumn);
    }

    let mut records = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        // Blank rows are common at the end of hand-edited sheets.
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        // Data rows start at row 2.
        records.push(parse_row(headers, row, idx + 2)?);
    }
    Ok(records)
}

fn parse_row(
    headers: &[String],
    row: &[String],
    row_number: usize,
) -> Result<TestRecord, MalformedRecordError> {
    let cells = RowCells { headers, row };

    let id = cells
        .non_empty(TestRecord::ID)
        .ok_or(MalformedRecordError::MissingId { row: row_number })?;
    let status: TestStatus =
        cells
            .get(TestRecord::STATUS)
            .parse()
            .map_err(|error| MalformedRecordError::Status {
                row: row_number,
                error,
            })?;
    let consecutive_passes = match cells.non_empty(TestRecord::CONSECUTIVE_PASSES) {
        Some(value) => value
            .parse()
            .map_err(|_| MalformedRecordError::ConsecutivePasses {
                row: row_number,
                value: value.to_owned(),
            })?,
        None => 0,
    };
    let extra_attributes = cells
        .non_empty(TestRecord::EXTRA_ATTRIBUTES)
        .map(serde_json::from_str::<ExtraAttributes>)
        .transpose()
        .map_err(|error| MalformedRecordError::ExtraAttributes {
            row: row_number,
            error,
        })?;
    let updated_at = cells.non_empty(TestRecord::UPDATED_AT).and_then(|value| {
        match DateTime::parse_from_rfc3339(value) {
            Ok(t) => Some(t.to_utc()),
            Err(error) => {
                debug!("ignoring unparseable updated_at `{value}` in row {row_number}: {error}");
                None
            }
        }
    });

    Ok(TestRecord {
        id: id.into(),
        status,
        consecutive_passes,
        full_description: cells.non_empty(TestRecord::FULL_DESCRIPTION).map(str::to_owned),
        location: cells.non_empty(TestRecord::LOCATION).map(str::to_owned),
        extra_attributes,
        updated_at,
    })
}

/// Looks up cells in a data row by header name. Missing cells read as empty.
struct RowCells<'a> {
    headers: &'a [String],
    row: &'a [String],
}

impl<'a> RowCells<'a> {
    fn get(&self, name: &str) -> &'a str {
        self.headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| self.row.get(idx))
            .map_or("", String::as_str)
    }

    fn non_empty(&self, name: &str) -> Option<&'a str> {
        Some(self.get(name)).filter(|s| !s.is_empty())
    }
}
