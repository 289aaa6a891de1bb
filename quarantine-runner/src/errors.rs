// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by quarantine.

use crate::storage::{BackendKind, StorageOperation};
use camino::Utf8PathBuf;
use config::ConfigError;
use quarantine_metadata::TestStatusParseError;
use std::{error, fmt, time::Duration};
use thiserror::Error;

/// An error that occurred while reading or writing test records.
///
/// Storage errors never fail a test run: the engine catches them at its
/// boundary and turns them into [`QuarantineWarning`](crate::engine::QuarantineWarning)s.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The storage could not be reached, or a transport-level I/O error
    /// occurred.
    #[error("error communicating with {backend} storage at `{location}`")]
    Connection {
        /// The backend that failed.
        backend: BackendKind,

        /// Where the backend was trying to read or write.
        location: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The storage rejected the credentials it was accessed with.
    #[error("{backend} storage at `{location}` denied access")]
    Auth {
        /// The backend that failed.
        backend: BackendKind,

        /// Where the backend was trying to read or write.
        location: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The named table or worksheet does not exist.
    #[error("table `{table}` not found in {backend} storage")]
    NotFound {
        /// The backend that failed.
        backend: BackendKind,

        /// The table that was looked up.
        table: String,
    },

    /// The table name can't be used by the backend.
    #[error("invalid table name `{table}` for {backend} storage: {reason}")]
    InvalidTableName {
        /// The backend that rejected the name.
        backend: BackendKind,

        /// The rejected name.
        table: String,

        /// Why the name was rejected.
        reason: &'static str,
    },

    /// A stored record could not be decoded.
    #[error("malformed record in table `{table}` of {backend} storage")]
    Malformed {
        /// The backend that failed.
        backend: BackendKind,

        /// The table containing the record.
        table: String,

        /// What was wrong with the record.
        #[source]
        error: MalformedRecordError,
    },

    /// The storage kept throttling writes until retries were exhausted.
    #[error("{backend} storage throttled writes to `{table}`, gave up after {attempts} attempts")]
    Throttled {
        /// The backend that failed.
        backend: BackendKind,

        /// The table being written.
        table: String,

        /// The number of attempts made.
        attempts: u32,
    },

    /// A storage operation did not finish within the configured timeout.
    #[error(
        "{operation} on table `{table}` of {backend} storage timed out after {}",
        humantime::format_duration(*timeout)
    )]
    TimedOut {
        /// The backend that failed.
        backend: BackendKind,

        /// The operation that timed out.
        operation: StorageOperation,

        /// The table being accessed.
        table: String,

        /// The timeout that elapsed.
        timeout: Duration,
    },
}

impl StorageError {
    /// Creates a storage error from an I/O error, classifying permission
    /// failures as [`StorageErrorKind::Auth`] and everything else as
    /// [`StorageErrorKind::Connection`].
    pub(crate) fn from_io(
        backend: BackendKind,
        location: impl Into<String>,
        error: std::io::Error,
    ) -> Self {
        let location = location.into();
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Auth {
                backend,
                location,
                error,
            },
            _ => Self::Connection {
                backend,
                location,
                error,
            },
        }
    }

    /// The backend that produced this error.
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Connection { backend, .. }
            | Self::Auth { backend, .. }
            | Self::NotFound { backend, .. }
            | Self::InvalidTableName { backend, .. }
            | Self::Malformed { backend, .. }
            | Self::Throttled { backend, .. }
            | Self::TimedOut { backend, .. } => *backend,
        }
    }

    /// The category of this error.
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            Self::Connection { .. } => StorageErrorKind::Connection,
            Self::Auth { .. } => StorageErrorKind::Auth,
            Self::NotFound { .. } => StorageErrorKind::NotFound,
            Self::InvalidTableName { .. } => StorageErrorKind::InvalidTableName,
            Self::Malformed { .. } => StorageErrorKind::Malformed,
            Self::Throttled { .. } => StorageErrorKind::Throttled,
            Self::TimedOut { .. } => StorageErrorKind::TimedOut,
        }
    }
}

/// The category of a [`StorageError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Network or transport failure.
    Connection,

    /// Bad or missing credentials.
    Auth,

    /// The table or worksheet does not exist.
    NotFound,

    /// The table name can't be used by the backend.
    InvalidTableName,

    /// A stored record could not be decoded.
    Malformed,

    /// Retries after throttling were exhausted.
    Throttled,

    /// The operation exceeded its timeout.
    TimedOut,
}

/// Describes why a stored record could not be decoded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MalformedRecordError {
    /// A key-value document did not deserialize into a record.
    #[error("invalid record document")]
    Document(#[source] serde_json::Error),

    /// A table file was not a valid JSON object of documents.
    #[error("invalid table contents")]
    Table(#[source] serde_json::Error),

    /// A worksheet's header row has no `id` column.
    #[error("header row has no `id` column")]
    MissingIdColumn,

    /// A worksheet row had an empty `id` cell.
    #[error("row {row} has no id")]
    MissingId {
        /// The 1-based row number in the worksheet.
        row: usize,
    },

    /// A worksheet row had an unparseable status.
    #[error("row {row} has an invalid status")]
    Status {
        /// The 1-based row number in the worksheet.
        row: usize,

        /// The parse error.
        #[source]
        error: TestStatusParseError,
    },

    /// A worksheet row had a non-numeric pass counter.
    #[error("row {row} has an invalid consecutive pass count `{value}`")]
    ConsecutivePasses {
        /// The 1-based row number in the worksheet.
        row: usize,

        /// The cell contents.
        value: String,
    },

    /// A worksheet row's extra attributes cell was not a JSON object.
    #[error("row {row} has invalid extra attributes")]
    ExtraAttributes {
        /// The 1-based row number in the worksheet.
        row: usize,

        /// The parse error.
        #[source]
        error: serde_json::Error,
    },

    /// A workbook file was not valid JSON.
    #[error("invalid workbook contents")]
    Workbook(#[source] serde_json::Error),
}

/// An error that occurred while loading quarantine configuration.
///
/// Configuration errors are fatal: a misconfigured backend must not silently
/// turn quarantine off.
#[derive(Debug, Error)]
#[error("failed to parse quarantine config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &camino::Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A value deserialized but is not acceptable.
    #[error("invalid value for `{key}`: {message}")]
    InvalidValue {
        /// The config key.
        key: &'static str,

        /// What is wrong with it.
        message: String,
    },
}

/// An error that occurs while parsing a
/// [`FailsafeLimit`](crate::config::FailsafeLimit) from a string.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for failsafe-limit: {reason}")]
pub struct FailsafeLimitParseError {
    reason: String,
}

impl FailsafeLimitParseError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Displays an error along with its chain of sources, separated by `: `.
pub(crate) struct DisplayErrorChain<'a>(pub(crate) &'a (dyn error::Error + 'static));

impl fmt::Display for DisplayErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut curr = self.0.source();
        while let Some(source) = curr {
            write!(f, ": {source}")?;
            curr = source.source();
        }
        Ok(())
    }
}
