// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use quarantine_metadata::{ExtraAttributes, TestId, TestStatus};

/// Identifies a test, plus the descriptive metadata written alongside its
/// record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestIdentity {
    /// The stable identifier of the test.
    pub id: TestId,

    /// The test's full description.
    pub full_description: Option<String>,

    /// Where the test is defined.
    pub location: Option<String>,

    /// Attributes supplied by the adapter, persisted with the record.
    pub extra_attributes: Option<ExtraAttributes>,
}

impl TestIdentity {
    /// Creates an identity with no metadata.
    pub fn new(id: impl Into<TestId>) -> Self {
        Self {
            id: id.into(),
            full_description: None,
            location: None,
            extra_attributes: None,
        }
    }

    /// Creates an identity whose id is [fingerprinted](TestId::fingerprint)
    /// from `file` and `description`. The description is also kept as
    /// [`full_description`](Self::full_description).
    pub fn fingerprint(file: &str, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            id: TestId::fingerprint(file, &description),
            full_description: Some(description),
            location: None,
            extra_attributes: None,
        }
    }

    /// Sets the full description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.full_description = Some(description.into());
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the extra attributes.
    pub fn with_extra_attributes(mut self, extra_attributes: ExtraAttributes) -> Self {
        self.extra_attributes = Some(extra_attributes);
        self
    }
}

impl From<TestId> for TestIdentity {
    fn from(id: TestId) -> Self {
        Self::new(id)
    }
}

impl From<&str> for TestIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A single observation made during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// The test that was observed.
    pub identity: TestIdentity,

    /// The status to record for it.
    pub outcome: TestStatus,

    /// Whether the test is considered successful for the build.
    pub passed: bool,
}

impl RunOutcome {
    /// Returns the id of the observed test.
    #[inline]
    pub fn id(&self) -> &TestId {
        &self.identity.id
    }
}

/// The raw signals an adapter has about one execution of an example.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExampleSignals {
    /// Whether this attempt failed.
    pub failed: bool,

    /// The 1-based attempt number.
    pub attempt: u32,

    /// The number of attempts the retry mechanism allows.
    pub max_attempts: u32,

    /// Whether the adapter considers the example flaky on its own, e.g. from
    /// a tag in the test's metadata.
    pub flaky: bool,
}

impl ExampleSignals {
    /// Signals for an example that ran once and passed.
    pub fn passed() -> Self {
        Self {
            failed: false,
            attempt: 1,
            max_attempts: 1,
            flaky: false,
        }
    }

    /// Signals for an example that ran once and failed.
    pub fn failed() -> Self {
        Self {
            failed: true,
            ..Self::passed()
        }
    }

    /// Sets the attempt number and the maximum attempt count.
    pub fn with_attempt(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.attempt = attempt;
        self.max_attempts = max_attempts;
        self
    }

    /// Marks the example as flaky.
    pub fn with_flaky(mut self, flaky: bool) -> Self {
        self.flaky = flaky;
        self
    }

    /// Returns true if no further attempts will be made.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns true if this attempt passed after earlier ones failed.
    pub fn is_retried_pass(&self) -> bool {
        !self.failed && self.attempt > 1
    }
}

/// What to record for an example, and whether the adapter should hide its
/// failure from the build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    /// The status to record.
    pub outcome: TestStatus,

    /// The `passed` flag to record.
    pub passed: bool,

    /// If true, the adapter should report this example as passing.
    pub suppress_failure: bool,
}

/// Decides what to record for an example.
///
/// `quarantined` is whether the baseline (or the adapter) has the test
/// quarantined. A quarantined test's final failure is only recorded as
/// quarantined when `skip_quarantined` is set; otherwise it is failing.
/// Returns `None` for a failing attempt that will be retried: nothing is
/// recorded until the final attempt.
pub fn classify(
    signals: ExampleSignals,
    quarantined: bool,
    skip_quarantined: bool,
) -> Option<Classification> {
    let quarantined = quarantined || signals.flaky;

    let classification = if signals.failed {
        if !signals.is_final_attempt() {
            return None;
        }
        // With skipping off, a quarantined test's failure counts like any
        // other and is recorded as failing.
        if quarantined && skip_quarantined {
            Classification {
                outcome: TestStatus::Quarantined,
                passed: false,
                suppress_failure: true,
            }
        } else {
            Classification {
                outcome: TestStatus::Failing,
                passed: false,
                suppress_failure: false,
            }
        }
    } else if signals.is_retried_pass() {
        // Green for the build, but flaky: this is what enters quarantine.
        Classification {
            outcome: TestStatus::Quarantined,
            passed: false,
            suppress_failure: false,
        }
    } else if quarantined {
        Classification {
            outcome: TestStatus::Quarantined,
            passed: true,
            suppress_failure: false,
        }
    } else {
        Classification {
            outcome: TestStatus::Passing,
            passed: true,
            suppress_failure: false,
        }
    };

    Some(classification)
}
