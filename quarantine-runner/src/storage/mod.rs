// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent storage for test records.
//!
//! The engine talks to storage through the [`StoragePort`] trait. Two backends
//! implement it, with different update semantics:
//!
//! - [`KeyValueBackend`]: keyed puts of JSON documents, chunked into batches
//!   and retried with backoff when throttled.
//! - [`SpreadsheetBackend`]: positional rows under a header row. Existing rows
//!   are overwritten cell by cell and new rows are appended after the last one.
//!
//! [`Database`] selects one of these from configuration.

mod helpers;
mod key_value;
mod spreadsheet;

pub use key_value::*;
pub use spreadsheet::*;
pub(crate) use helpers::check_table_name;

use crate::{config::DatabaseConfig, errors::StorageError};
use camino::Utf8Path;
use quarantine_metadata::TestRecord;
use std::{fmt, sync::Arc};

/// Read and write access to tables of [`TestRecord`]s.
///
/// Implementations must uphold these rules:
///
/// - [`fetch_items`](Self::fetch_items) returns every record currently in the
///   table.
/// - [`write_items`](Self::write_items) overwrites the record with a matching
///   id in place, or appends the record if no match exists. Records that exist
///   in storage but are absent from the input are left alone: writing never
///   deletes.
/// - A write that only partially succeeds is reported as a failure of the
///   whole call.
pub trait StoragePort: Send + Sync {
    /// The kind of backend, used in diagnostics.
    fn backend_kind(&self) -> BackendKind;

    /// Fetches all records in the named table.
    fn fetch_items(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<TestRecord>, StorageError>> + Send;

    /// Writes a batch of records to the named table, matched by id.
    fn write_items(
        &self,
        table: &str,
        records: &[TestRecord],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl<T: StoragePort> StoragePort for &T {
    fn backend_kind(&self) -> BackendKind {
        (**self).backend_kind()
    }

    fn fetch_items(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<TestRecord>, StorageError>> + Send {
        (**self).fetch_items(table)
    }

    fn write_items(
        &self,
        table: &str,
        records: &[TestRecord],
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).write_items(table, records)
    }
}

impl<T: StoragePort> StoragePort for Arc<T> {
    fn backend_kind(&self) -> BackendKind {
        (**self).backend_kind()
    }

    fn fetch_items(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<TestRecord>, StorageError>> + Send {
        (**self).fetch_items(table)
    }

    fn write_items(
        &self,
        table: &str,
        records: &[TestRecord],
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).write_items(table, records)
    }
}

/// The kind of a storage backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// A key-value table.
    KeyValue,

    /// A spreadsheet with a header row.
    Spreadsheet,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyValue => write!(f, "key-value"),
            Self::Spreadsheet => write!(f, "spreadsheet"),
        }
    }
}

/// A storage operation, used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageOperation {
    /// Reading a table.
    Fetch,

    /// Writing a batch of records.
    Write,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// The configured storage backend.
///
/// The client is opened once at construction and reused for every call made
/// during the session.
#[derive(Debug)]
pub enum Database {
    /// A key-value table stored as JSON files in a directory.
    KeyValue(KeyValueBackend<JsonDirClient>),

    /// A spreadsheet stored as a JSON workbook file.
    Spreadsheet(SpreadsheetBackend<JsonWorkbookClient>),
}

impl Database {
    /// Opens the backend described by `config`.
    ///
    /// Relative paths in the config are resolved against `workspace_root`.
    pub fn from_config(config: &DatabaseConfig, workspace_root: &Utf8Path) -> Self {
        match config {
            DatabaseConfig::KeyValue {
                dir,
                batch_size,
                retries,
            } => {
                let client = JsonDirClient::new(workspace_root.join(dir));
                Self::KeyValue(
                    KeyValueBackend::new(client)
                        .with_batch_size(*batch_size)
                        .with_retry_policy(*retries),
                )
            }
            DatabaseConfig::Spreadsheet { path } => {
                let client = JsonWorkbookClient::new(workspace_root.join(path));
                Self::Spreadsheet(SpreadsheetBackend::new(client))
            }
        }
    }

    /// Creates the named table (or worksheet) if it doesn't exist yet.
    ///
    /// Sessions never create tables on their own: a missing table is reported
    /// as [`NotFound`](crate::errors::StorageErrorKind::NotFound).
    pub async fn create_table(&self, table: &str) -> Result<(), StorageError> {
        match self {
            Self::KeyValue(backend) => backend.client().create_table(table).await,
            Self::Spreadsheet(backend) => backend.client().create_worksheet(table).await,
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyValue(backend) => write!(f, "key-value at {}", backend.client().dir()),
            Self::Spreadsheet(backend) => write!(f, "spreadsheet at {}", backend.client().path()),
        }
    }
}

impl StoragePort for Database {
    fn backend_kind(&self) -> BackendKind {
        match self {
            Self::KeyValue(backend) => backend.backend_kind(),
            Self::Spreadsheet(backend) => backend.backend_kind(),
        }
    }

    async fn fetch_items(&self, table: &str) -> Result<Vec<TestRecord>, StorageError> {
        match self {
            Self::KeyValue(backend) => backend.fetch_items(table).await,
            Self::Spreadsheet(backend) => backend.fetch_items(table).await,
        }
    }

    async fn write_items(&self, table: &str, records: &[TestRecord]) -> Result<(), StorageError> {
        match self {
            Self::KeyValue(backend) => backend.write_items(table, records).await,
            Self::Spreadsheet(backend) => backend.write_items(table, records).await,
        }
    }
}
