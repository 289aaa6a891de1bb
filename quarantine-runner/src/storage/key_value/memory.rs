// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{KeyValueClient, KeyValueClientError, KeyValueItem};
use crate::{errors::StorageError, storage::BackendKind};
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    io,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
};

/// An in-process [`KeyValueClient`], for tests and dry runs.
///
/// Failures can be injected with [`throttle_next_puts`](Self::throttle_next_puts)
/// and [`fail_next_scan`](Self::fail_next_scan).
#[derive(Debug, Default)]
pub struct MemoryKeyValueClient {
    tables: Mutex<HashMap<String, IndexMap<String, serde_json::Value>>>,
    throttled_puts: AtomicU32,
    scan_failure: Mutex<Option<io::ErrorKind>>,
    put_calls: AtomicUsize,
}

impl MemoryKeyValueClient {
    /// Creates a new client with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty table.
    pub fn with_table(self, table: &str) -> Self {
        self.lock_tables().entry(table.to_owned()).or_default();
        self
    }

    /// Stores a raw document, bypassing record serialization.
    pub fn insert_raw(&self, table: &str, key: &str, document: serde_json::Value) {
        self.lock_tables()
            .entry(table.to_owned())
            .or_default()
            .insert(key.to_owned(), document);
    }

    /// Makes the next `count` batch puts fail as throttled.
    pub fn throttle_next_puts(&self, count: u32) {
        self.throttled_puts.store(count, Ordering::SeqCst);
    }

    /// Makes the next scan fail with an I/O error of the given kind.
    pub fn fail_next_scan(&self, kind: io::ErrorKind) {
        *self
            .scan_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(kind);
    }

    /// Returns the number of batch puts attempted so far, including throttled
    /// ones.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    fn lock_tables(&self) -> MutexGuard<'_, HashMap<String, IndexMap<String, serde_json::Value>>> {
        // Table state is only mutated by whole inserts, so it stays
        // consistent even if a holder panicked.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn not_found(table: &str) -> StorageError {
        StorageError::NotFound {
            backend: BackendKind::KeyValue,
            table: table.to_owned(),
        }
    }
}

impl KeyValueClient for MemoryKeyValueClient {
    async fn scan(&self, table: &str) -> Result<Vec<serde_json::Value>, KeyValueClientError> {
        let failure = self
            .scan_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(kind) = failure {
            return Err(StorageError::from_io(
                BackendKind::KeyValue,
                format!("memory:{table}"),
                io::Error::from(kind),
            )
            .into());
        }

        let tables = self.lock_tables();
        let contents = tables.get(table).ok_or_else(|| Self::not_found(table))?;
        Ok(contents.values().cloned().collect())
    }

    async fn batch_put(&self, table: &str, items: &[KeyValueItem]) -> Result<(), KeyValueClientError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let throttled = self
            .throttled_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(KeyValueClientError::Throttled);
        }

        let mut tables = self.lock_tables();
        let contents = tables.get_mut(table).ok_or_else(|| Self::not_found(table))?;
        for item in items {
            contents.insert(item.key.clone(), item.document.clone());
        }
        Ok(())
    }
}
