// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{WorkbookClient, Worksheet};
use crate::{errors::StorageError, storage::BackendKind};
use indexmap::IndexMap;
use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
};

/// An in-process [`WorkbookClient`], for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryWorkbookClient {
    worksheets: Mutex<IndexMap<String, Vec<Vec<String>>>>,
    save_calls: AtomicUsize,
}

impl MemoryWorkbookClient {
    /// Creates a new client with no worksheets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a worksheet.
    pub fn put_worksheet(&self, worksheet: Worksheet) {
        let title = worksheet.title().to_owned();
        self.lock().insert(title, worksheet.into_rows());
    }

    /// Returns a copy of the worksheet with the given title.
    pub fn worksheet(&self, title: &str) -> Option<Worksheet> {
        self.lock()
            .get(title)
            .map(|rows| Worksheet::new(title, rows.clone()))
    }

    /// Returns the number of saves so far.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Vec<Vec<String>>>> {
        self.worksheets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn not_found(title: &str) -> StorageError {
        StorageError::NotFound {
            backend: BackendKind::Spreadsheet,
            table: title.to_owned(),
        }
    }
}

impl WorkbookClient for MemoryWorkbookClient {
    async fn load_worksheet(&self, title: &str) -> Result<Worksheet, StorageError> {
        self.worksheet(title).ok_or_else(|| Self::not_found(title))
    }

    async fn save_worksheet(&self, worksheet: &Worksheet) -> Result<(), StorageError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let mut worksheets = self.lock();
        let rows = worksheets
            .get_mut(worksheet.title())
            .ok_or_else(|| Self::not_found(worksheet.title()))?;
        *rows = worksheet.rows().to_vec();
        Ok(())
    }
}
