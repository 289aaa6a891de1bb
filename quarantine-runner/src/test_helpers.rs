// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test helpers shared by unit tests.

use crate::{
    errors::StorageError,
    storage::{BackendKind, StoragePort},
};
use indexmap::IndexMap;
use proptest::prelude::*;
use quarantine_metadata::{TestId, TestRecord, TestStatus};
use std::{
    io,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// A single-table [`StoragePort`] that counts calls and can be told to fail.
#[derive(Debug)]
pub(crate) struct TestStorage {
    table: String,
    records: Mutex<IndexMap<TestId, TestRecord>>,
    failing_fetches: AtomicU32,
    fail_writes: AtomicBool,
    delay: Mutex<Option<Duration>>,
    fetch_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl TestStorage {
    pub(crate) const TABLE: &'static str = "test_statuses";

    pub(crate) fn new() -> Self {
        Self {
            table: Self::TABLE.to_owned(),
            records: Mutex::new(IndexMap::new()),
            failing_fetches: AtomicU32::new(0),
            fail_writes: AtomicBool::new(false),
            delay: Mutex::new(None),
            fetch_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_records(self, records: impl IntoIterator<Item = TestRecord>) -> Self {
        self.set_records(records);
        self
    }

    pub(crate) fn set_records(&self, records: impl IntoIterator<Item = TestRecord>) {
        let mut stored = self.lock_records();
        for record in records {
            stored.insert(record.id.clone(), record);
        }
    }

    pub(crate) fn record(&self, id: &str) -> Option<TestRecord> {
        self.lock_records().get(id).cloned()
    }

    pub(crate) fn records(&self) -> Vec<TestRecord> {
        self.lock_records().values().cloned().collect()
    }

    /// Makes the next `count` fetches fail with a connection error.
    pub(crate) fn fail_next_fetches(&self, count: u32) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every call sleep for `delay` before doing anything.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn lock_records(&self) -> MutexGuard<'_, IndexMap<TestId, TestRecord>> {
        self.records.lock().unwrap()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_table(&self, table: &str) -> Result<(), StorageError> {
        if table == self.table {
            Ok(())
        } else {
            Err(StorageError::NotFound {
                backend: BackendKind::KeyValue,
                table: table.to_owned(),
            })
        }
    }
}

impl StoragePort for TestStorage {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    async fn fetch_items(&self, table: &str) -> Result<Vec<TestRecord>, StorageError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        let failed = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StorageError::from_io(
                BackendKind::KeyValue,
                "test-storage",
                io::Error::from(io::ErrorKind::ConnectionRefused),
            ));
        }
        self.check_table(table)?;
        Ok(self.records())
    }

    async fn write_items(&self, table: &str, records: &[TestRecord]) -> Result<(), StorageError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::from_io(
                BackendKind::KeyValue,
                "test-storage",
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        self.check_table(table)?;
        self.set_records(records.iter().cloned());
        Ok(())
    }
}

/// Strategy for generating arbitrary [`TestStatus`] values.
pub(crate) fn arb_test_status() -> impl Strategy<Value = TestStatus> {
    prop_oneof![
        Just(TestStatus::Passing),
        Just(TestStatus::Failing),
        Just(TestStatus::Quarantined),
    ]
}

/// Strategy for a sequence of `record_test` calls over a small set of ids, so
/// that repeated observations of the same test are common.
pub(crate) fn arb_recorded_outcomes() -> impl Strategy<Value = Vec<(TestId, TestStatus, bool)>> {
    prop::collection::vec(
        ("t[0-7]", arb_test_status(), any::<bool>())
            .prop_map(|(id, status, passed)| (TestId::new(id), status, passed)),
        0..64,
    )
}
