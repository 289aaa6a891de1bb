// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{WorkbookClient, Worksheet};
use crate::{
    errors::{MalformedRecordError, StorageError},
    storage::{BackendKind, helpers},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// On-disk layout of a workbook file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkbookFile {
    /// Worksheets by title, each a list of rows of cells.
    #[serde(default)]
    worksheets: IndexMap<String, Vec<Vec<String>>>,
}

/// A [`WorkbookClient`] backed by a single JSON workbook file.
///
/// Saving a worksheet rewrites the whole file atomically, so unlike remote
/// spreadsheet services a failed save leaves the previous contents intact.
#[derive(Clone, Debug)]
pub struct JsonWorkbookClient {
    path: Utf8PathBuf,
}

impl JsonWorkbookClient {
    /// Creates a new client for the workbook at `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the workbook file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Adds an empty worksheet, creating the workbook file if necessary.
    ///
    /// Does nothing if the worksheet already exists.
    pub async fn create_worksheet(&self, title: &str) -> Result<(), StorageError> {
        let mut workbook = self.read().await?.unwrap_or_default();
        if workbook.worksheets.contains_key(title) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StorageError::from_io(BackendKind::Spreadsheet, parent.as_str(), error))?;
        }
        workbook.worksheets.insert(title.to_owned(), Vec::new());
        self.write(&workbook).await
    }

    async fn read(&self) -> Result<Option<WorkbookFile>, StorageError> {
        let Some(contents) = helpers::read_optional(&self.path)
            .await
            .map_err(|error| self.io_error(error))?
        else {
            return Ok(None);
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|error| StorageError::Malformed {
                backend: BackendKind::Spreadsheet,
                table: self.path.to_string(),
                error: MalformedRecordError::Workbook(error),
            })
    }

    async fn write(&self, workbook: &WorkbookFile) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(workbook).map_err(|error| StorageError::Malformed {
            backend: BackendKind::Spreadsheet,
            table: self.path.to_string(),
            error: MalformedRecordError::Workbook(error),
        })?;
        helpers::write_atomic(self.path.clone(), bytes)
            .await
            .map_err(|error| self.io_error(error))
    }

    fn io_error(&self, error: std::io::Error) -> StorageError {
        StorageError::from_io(BackendKind::Spreadsheet, self.path.as_str(), error)
    }

    fn not_found(title: &str) -> StorageError {
        StorageError::NotFound {
            backend: BackendKind::Spreadsheet,
            table: title.to_owned(),
        }
    }
}

impl WorkbookClient for JsonWorkbookClient {
    async fn load_worksheet(&self, title: &str) -> Result<Worksheet, StorageError> {
        let mut workbook = self.read().await?.ok_or_else(|| Self::not_found(title))?;
        let rows = workbook
            .worksheets
            .shift_remove(title)
            .ok_or_else(|| Self::not_found(title))?;
        Ok(Worksheet::new(title, rows))
    }

    async fn save_worksheet(&self, worksheet: &Worksheet) -> Result<(), StorageError> {
        // Re-read so that other worksheets edited since the load are kept.
        let mut workbook = self
            .read()
            .await?
            .ok_or_else(|| Self::not_found(worksheet.title()))?;
        let rows = workbook
            .worksheets
            .get_mut(worksheet.title())
            .ok_or_else(|| Self::not_found(worksheet.title()))?;
        *rows = worksheet.rows().to_vec();
        self.write(&workbook).await
    }
}
