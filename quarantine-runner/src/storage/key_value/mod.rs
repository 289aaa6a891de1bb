// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The key-value storage backend.
//!
//! Records are stored as JSON documents keyed by test id. There is no notion of
//! row position: writing a record is a keyed put that replaces any previous
//! document with the same id. `extra_attributes` is kept as a nested document.

mod json_dir;
mod memory;

pub use json_dir::JsonDirClient;
pub use memory::MemoryKeyValueClient;

use super::{BackendKind, StoragePort};
use crate::{
    config::{Backoff, RetryPolicy},
    errors::{MalformedRecordError, StorageError},
};
use quarantine_metadata::TestRecord;
use rand::{RngExt, distr::OpenClosed01};
use std::{num::NonZeroUsize, time::Duration};
use tracing::debug;

/// A single document to put into a key-value table.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValueItem {
    /// The key: the test id.
    pub key: String,

    /// The document stored under the key.
    pub document: serde_json::Value,
}

/// An error returned by a [`KeyValueClient`].
#[derive(Debug)]
pub enum KeyValueClientError {
    /// The service asked the client to slow down. The backend retries the
    /// batch according to its [`RetryPolicy`].
    Throttled,

    /// Any other failure. Not retried.
    Storage(StorageError),
}

impl From<StorageError> for KeyValueClientError {
    fn from(error: StorageError) -> Self {
        Self::Storage(error)
    }
}

/// The primitives a key-value service must provide.
pub trait KeyValueClient: Send + Sync {
    /// Returns every document in the table.
    fn scan(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, KeyValueClientError>> + Send;

    /// Puts a batch of documents, replacing existing documents with the same
    /// key. A batch is applied entirely or not at all.
    fn batch_put(
        &self,
        table: &str,
        items: &[KeyValueItem],
    ) -> impl Future<Output = Result<(), KeyValueClientError>> + Send;
}

/// A [`StoragePort`] over a [`KeyValueClient`].
///
/// Writes are split into batches of at most `batch_size` documents. Each batch
/// is all-or-nothing, but a write spanning several batches is not: if a later
/// batch fails, earlier batches stay written and the call reports failure.
#[derive(Debug)]
pub struct KeyValueBackend<C> {
    client: C,
    batch_size: NonZeroUsize,
    retry_policy: RetryPolicy,
}

impl<C: KeyValueClient> KeyValueBackend<C> {
    /// The default number of documents per batch.
    pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(25).unwrap();

    /// Creates a new backend over `client` with the default batch size and
    /// retry policy.
    pub fn new(client: C) -> Self {
        Self {
            client,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            retry_policy: RetryPolicy::default_throttle_policy(),
        }
    }

    /// Sets the maximum number of documents per batch.
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the policy used to retry throttled batches.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn put_with_retry(&self, table: &str, batch: &[KeyValueItem]) -> Result<(), StorageError> {
        let mut backoff = BackoffIter::new(self.retry_policy);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.client.batch_put(table, batch).await {
                Ok(()) => return Ok(()),
                Err(KeyValueClientError::Throttled) => match backoff.next() {
                    Some(delay) => {
                        debug!(
                            "writes to `{table}` throttled (attempt {attempts}), \
                             retrying in {}",
                            humantime::format_duration(delay)
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(StorageError::Throttled {
                            backend: BackendKind::KeyValue,
                            table: table.to_owned(),
                            attempts,
                        });
                    }
                },
                Err(KeyValueClientError::Storage(error)) => return Err(error),
            }
        }
    }
}

impl<C: KeyValueClient> StoragePort for KeyValueBackend<C> {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    async fn fetch_items(&self, table: &str) -> Result<Vec<TestRecord>, StorageError> {
        let documents = self.client.scan(table).await.map_err(|error| match error {
            // Reads aren't retried: a throttled scan fails like any other
            // transport error.
            KeyValueClientError::Throttled => StorageError::Throttled {
                backend: BackendKind::KeyValue,
                table: table.to_owned(),
                attempts: 1,
            },
            KeyValueClientError::Storage(error) => error,
        })?;

        documents
            .into_iter()
            .map(|document| {
                serde_json::from_value(document).map_err(|error| StorageError::Malformed {
                    backend: BackendKind::KeyValue,
                    table: table.to_owned(),
                    error: MalformedRecordError::Document(error),
                })
            })
            .collect()
    }

    async fn write_items(&self, table: &str, records: &[TestRecord]) -> Result<(), StorageError> {
        let items = records
            .iter()
            .map(|record| {
                let document =
                    serde_json::to_value(record).map_err(|error| StorageError::Malformed {
                        backend: BackendKind::KeyValue,
                        table: table.to_owned(),
                        error: MalformedRecordError::Document(error),
                    })?;
                Ok(KeyValueItem {
                    key: record.id.as_str().to_owned(),
                    document,
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        for batch in items.chunks(self.batch_size.get()) {
            self.put_with_retry(table, batch).await?;
        }
        Ok(())
    }
}

/// Yields the delays to wait between retries of a throttled batch.
#[derive(Debug)]
struct BackoffIter {
    policy: RetryPolicy,
    current_factor: f64,
    remaining_attempts: u32,
}

impl BackoffIter {
    const BACKOFF_EXPONENT: f64 = 2.;

    fn new(policy: RetryPolicy) -> Self {
        let remaining_attempts = policy.count;
        Self {
            policy,
            current_factor: 1.,
            remaining_attempts,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let Backoff::Exponential { max_delay } = self.policy.backoff else {
            return self.policy.delay;
        };

        let delay = self.policy.delay.mul_f64(self.current_factor);
        match max_delay {
            Some(max_delay) if delay > max_delay => max_delay,
            _ => {
                self.current_factor *= Self::BACKOFF_EXPONENT;
                delay
            }
        }
    }

    fn apply_jitter(duration: Duration) -> Duration {
        let jitter: f64 = rand::rng().sample(OpenClosed01);
        // Apply jitter in the range (0.5, 1].
        duration.mul_f64(0.5 + jitter / 2.)
    }
}

impl Iterator for BackoffIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_attempts > 0 {
            let mut delay = self.next_delay();
            if self.policy.jitter {
                delay = Self::apply_jitter(delay);
            }
            self.remaining_attempts -= 1;
            Some(delay)
        } else {
            None
        }
    }
}
