// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::FailsafeLimit,
    errors::{DisplayErrorChain, StorageError},
    storage::BackendKind,
};
use quarantine_metadata::TestId;
use std::{fmt, sync::Arc};

/// A problem the engine recovered from.
///
/// Warnings never affect the outcome of a test run, but they should be shown
/// to the user.
#[derive(Clone, Debug)]
pub enum QuarantineWarning {
    /// The baseline could not be read. No tests were treated as quarantined.
    FetchFailed {
        /// The table that was read.
        table: String,

        /// The backend in use.
        backend: BackendKind,

        /// The underlying error.
        error: Arc<StorageError>,
    },

    /// The table could not be re-read before uploading. The baseline was
    /// merged against instead.
    RefetchFailed {
        /// The table that was read.
        table: String,

        /// The backend in use.
        backend: BackendKind,

        /// The underlying error.
        error: Arc<StorageError>,
    },

    /// The run's observations could not be written.
    UploadFailed {
        /// The table that was written.
        table: String,

        /// The backend in use.
        backend: BackendKind,

        /// The underlying error.
        error: Arc<StorageError>,
    },

    /// More tests would have been quarantined than the failsafe limit allows.
    /// The excess new entries were recorded as failing instead.
    FailsafeExceeded {
        /// The configured limit.
        limit: FailsafeLimit,

        /// How many records would have been written as quarantined.
        attempted: usize,

        /// The tests that were not quarantined.
        rejected: Vec<TestId>,
    },
}

impl QuarantineWarning {
    /// Returns the storage error behind this warning, if any.
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::FetchFailed { error, .. }
            | Self::RefetchFailed { error, .. }
            | Self::UploadFailed { error, .. } => Some(error.as_ref()),
            Self::FailsafeExceeded { .. } => None,
        }
    }
}

impl fmt::Display for QuarantineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed {
                table,
                backend,
                error,
            } => write!(
                f,
                "failed to fetch test statuses from `{table}` ({backend}), \
                 no tests are quarantined for this run: {}",
                DisplayErrorChain(error.as_ref()),
            ),
            Self::RefetchFailed {
                table,
                backend,
                error,
            } => write!(
                f,
                "failed to re-read `{table}` ({backend}) before upload, \
                 merging against the baseline: {}",
                DisplayErrorChain(error.as_ref()),
            ),
            Self::UploadFailed {
                table,
                backend,
                error,
            } => write!(
                f,
                "failed to upload test statuses to `{table}` ({backend}): {}",
                DisplayErrorChain(error.as_ref()),
            ),
            Self::FailsafeExceeded {
                limit,
                attempted,
                rejected,
            } => {
                write!(
                    f,
                    "failsafe limit of {limit} quarantined tests exceeded \
                     ({attempted} attempted), {} new {} not quarantined",
                    rejected.len(),
                    plural(rejected.len(), "entry was", "entries were"),
                )
            }
        }
    }
}

/// The result of [`Quarantine::fetch_test_statuses`](super::Quarantine::fetch_test_statuses).
#[derive(Clone, Debug, Default)]
pub struct FetchReport {
    /// The number of records in the baseline.
    pub baseline_len: usize,

    /// The number of baseline records that are quarantined.
    pub quarantined: usize,

    /// Set if the fetch failed and the baseline was left empty.
    pub warning: Option<QuarantineWarning>,
}

/// The result of [`Quarantine::upload_tests`](super::Quarantine::upload_tests).
#[derive(Clone, Debug, Default)]
pub struct UploadReport {
    /// Whether uploading is disabled by configuration.
    pub skipped: bool,

    /// The number of records written. Zero if the write failed.
    pub written: usize,

    /// Tests released from quarantine by this upload.
    pub released: Vec<TestId>,

    /// Tests that the failsafe kept from being quarantined.
    pub rejected: Vec<TestId>,

    /// Problems encountered during the upload.
    pub warnings: Vec<QuarantineWarning>,
}

impl UploadReport {
    /// The report returned when uploading is disabled.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Returns true if the observations were written, or there were none to
    /// write.
    pub fn is_success(&self) -> bool {
        !self
            .warnings
            .iter()
            .any(|w| matches!(w, QuarantineWarning::UploadFailed { .. }))
    }
}

pub(super) fn plural(n: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if n == 1 { singular } else { plural }
}
