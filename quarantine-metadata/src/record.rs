// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::TestStatusParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt, str::FromStr};

/// Arbitrary structured attributes attached to a test record.
///
/// Stored as an embedded JSON document. Row-oriented backends serialize this
/// to a single cell.
pub type ExtraAttributes = serde_json::Map<String, serde_json::Value>;

/// The stable identifier of a test, used to match it across runs.
///
/// A test framework that already exposes a stable id (for example a file path
/// plus the example's position in the file) can use it directly through
/// [`TestId::new`]. Otherwise [`TestId::fingerprint`] derives one from the
/// test's file and full description.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    /// Creates a new `TestId` from an existing stable identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an identifier from the file a test lives in and its full
    /// description.
    ///
    /// The result is `"{file}[{hash}]"`, where `hash` is the xxh3 hash of the
    /// description rendered as 16 hex digits. It does not depend on the order
    /// in which tests execute.
    pub fn fingerprint(file: &str, description: &str) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_64(description.as_bytes());
        Self(format!("{file}[{hash:016x}]"))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TestId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The status of a test, both as persisted and as observed during a run.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// The test passed.
    Passing,

    /// The test failed and was not quarantined.
    Failing,

    /// The test is quarantined: its failures do not block the build.
    Quarantined,
}

impl TestStatus {
    /// All known statuses, in display order.
    pub const ALL: &'static [Self] = &[Self::Passing, Self::Failing, Self::Quarantined];

    /// Returns the string form of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passing => "passing",
            Self::Failing => "failing",
            Self::Quarantined => "quarantined",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = TestStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TestStatusParseError::new(s))
    }
}

/// A single persisted row: the last known status of one test.
///
/// At most one record per [`TestId`] exists in a table. Writers merge into the
/// existing row rather than appending a new one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    /// The test's identifier; unique within a table.
    pub id: TestId,

    /// The last recorded status.
    pub status: TestStatus,

    /// How many runs in a row this test has passed.
    ///
    /// Reset to zero whenever the test fails, including failures that were
    /// suppressed by quarantine.
    #[serde(default)]
    pub consecutive_passes: u32,

    /// The test's full human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_description: Option<String>,

    /// Where the test is defined, e.g. `./spec/models/user_spec.rb:12`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Free-form attributes supplied by the test-framework adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_attributes: Option<ExtraAttributes>,

    /// When this record was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TestRecord {
    /// Field name of [`TestRecord::id`].
    pub const ID: &'static str = "id";
    /// Field name of [`TestRecord::status`].
    pub const STATUS: &'static str = "status";
    /// Field name of [`TestRecord::consecutive_passes`].
    pub const CONSECUTIVE_PASSES: &'static str = "consecutive_passes";
    /// Field name of [`TestRecord::full_description`].
    pub const FULL_DESCRIPTION: &'static str = "full_description";
    /// Field name of [`TestRecord::location`].
    pub const LOCATION: &'static str = "location";
    /// Field name of [`TestRecord::extra_attributes`].
    pub const EXTRA_ATTRIBUTES: &'static str = "extra_attributes";
    /// Field name of [`TestRecord::updated_at`].
    pub const UPDATED_AT: &'static str = "updated_at";

    /// Every field, in the order used for freshly created tables.
    pub const FIELDS: &'static [&'static str] = &[
        Self::ID,
        Self::STATUS,
        Self::CONSECUTIVE_PASSES,
        Self::FULL_DESCRIPTION,
        Self::LOCATION,
        Self::EXTRA_ATTRIBUTES,
        Self::UPDATED_AT,
    ];

    /// Creates a record with only an id and a status.
    pub fn new(id: impl Into<TestId>, status: TestStatus) -> Self {
        Self {
            id: id.into(),
            status,
            consecutive_passes: 0,
            full_description: None,
            location: None,
            extra_attributes: None,
            updated_at: None,
        }
    }

    /// Returns true if this record is quarantined.
    pub fn is_quarantined(&self) -> bool {
        self.status == TestStatus::Quarantined
    }
}
