// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// A grid of string cells, as exchanged with a
/// [`WorkbookClient`](super::WorkbookClient).
///
/// The first row holds the headers. Row and column numbers passed to
/// [`set_cell`](Self::set_cell) and [`insert_rows`](Self::insert_rows) are
/// 1-based, matching spreadsheet conventions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Worksheet {
    title: String,
    rows: Vec<Vec<String>>,
}

impl Worksheet {
    /// Creates a worksheet with the given title and rows.
    pub fn new(title: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            title: title.into(),
            rows,
        }
    }

    /// Returns the worksheet's title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns all rows, including the header row.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Consumes the worksheet, returning its rows.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    /// Returns the header row, if there is one.
    pub fn headers(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Returns the number of rows, including the header row.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Sets a single cell, growing the grid if necessary.
    ///
    /// Does nothing if `row` or `col` is zero.
    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        let (Some(row_idx), Some(col_idx)) = (row.checked_sub(1), col.checked_sub(1)) else {
            return;
        };
        if self.rows.len() <= row_idx {
            self.rows.resize_with(row_idx + 1, Vec::new);
        }
        let cells = &mut self.rows[row_idx];
        if cells.len() <= col_idx {
            cells.resize_with(col_idx + 1, String::new);
        }
        cells[col_idx] = value.into();
    }

    /// Inserts `rows` so that the first of them becomes row number `at`.
    ///
    /// `at` is clamped to one past the last row.
    pub fn insert_rows(&mut self, at: usize, rows: Vec<Vec<String>>) {
        let idx = at.saturating_sub(1).min(self.rows.len());
        self.rows.splice(idx..idx, rows);
    }
}
