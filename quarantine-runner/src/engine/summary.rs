// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{QuarantineWarning, report::plural};
use quarantine_metadata::{TestId, TestStatus};
use std::fmt;

/// Counts of recorded outcomes by status.
///
/// Every call to [`record_test`](super::Quarantine::record_test) is counted,
/// including repeated observations of the same test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    /// Outcomes recorded as passing.
    pub passing: usize,

    /// Outcomes recorded as failing.
    pub failing: usize,

    /// Outcomes recorded as quarantined.
    pub quarantined: usize,
}

impl OutcomeCounts {
    /// Returns the total number of recorded outcomes.
    pub fn total(&self) -> usize {
        self.passing + self.failing + self.quarantined
    }

    /// Returns the count for `status`.
    pub fn get(&self, status: TestStatus) -> usize {
        match status {
            TestStatus::Passing => self.passing,
            TestStatus::Failing => self.failing,
            TestStatus::Quarantined => self.quarantined,
        }
    }

    pub(super) fn add(&mut self, status: TestStatus) {
        match status {
            TestStatus::Passing => self.passing += 1,
            TestStatus::Failing => self.failing += 1,
            TestStatus::Quarantined => self.quarantined += 1,
        }
    }
}

/// A tally of the run, returned by [`Quarantine::summary`](super::Quarantine::summary).
///
/// Independent of whether the upload succeeded.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Outcome counts by status.
    pub counts: OutcomeCounts,

    /// Tests recorded as quarantined this run, in the order they were first
    /// recorded.
    pub quarantined_tests: Vec<TestId>,

    /// Warnings collected by the session so far.
    pub warnings: Vec<QuarantineWarning>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.counts.total();
        write!(
            f,
            "quarantine: {total} {} recorded",
            plural(total, "test", "tests")
        )?;
        if total > 0 {
            let parts: Vec<_> = TestStatus::ALL
                .iter()
                .map(|&status| format!("{} {status}", self.counts.get(status)))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }

        for id in &self.quarantined_tests {
            write!(f, "\n  quarantined: {id}")?;
        }
        for warning in &self.warnings {
            write!(f, "\n  warning: {warning}")?;
        }
        Ok(())
    }
}
