// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::RetryPolicy;
use crate::storage::BackendKind;
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::num::NonZeroUsize;

/// Type for the `[database]` config table: which storage backend to use, and
/// its options.
///
/// Selected by the `type` key. An unrecognized type fails config parsing.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DatabaseConfig {
    /// A key-value table kept as JSON files in a directory.
    #[serde(rename_all = "kebab-case")]
    KeyValue {
        /// The directory containing the tables, relative to the workspace
        /// root.
        dir: Utf8PathBuf,

        /// The maximum number of records written per batch.
        #[serde(default = "default_batch_size")]
        batch_size: NonZeroUsize,

        /// How throttled batches are retried.
        #[serde(default = "RetryPolicy::default_throttle_policy")]
        retries: RetryPolicy,
    },

    /// A spreadsheet kept as a JSON workbook file.
    #[serde(rename_all = "kebab-case")]
    Spreadsheet {
        /// The workbook file, relative to the workspace root.
        path: Utf8PathBuf,
    },
}

impl DatabaseConfig {
    /// The directory used for the default key-value backend.
    pub const DEFAULT_DIR: &'static str = "target/quarantine";

    /// Returns the kind of backend this config selects.
    pub fn backend_kind(&self) -> BackendKind {
        match self {
            Self::KeyValue { .. } => BackendKind::KeyValue,
            Self::Spreadsheet { .. } => BackendKind::Spreadsheet,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::KeyValue {
            dir: Self::DEFAULT_DIR.into(),
            batch_size: default_batch_size(),
            retries: RetryPolicy::default_throttle_policy(),
        }
    }
}

fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(25).unwrap_or(NonZeroUsize::MIN)
}
