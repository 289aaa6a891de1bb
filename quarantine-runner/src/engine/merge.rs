// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging a run's observations into the stored records.

use super::RunOutcome;
use crate::config::FailsafeLimit;
use chrono::{DateTime, Utc};
use quarantine_metadata::{TestId, TestRecord, TestStatus};
use std::{collections::HashMap, num::NonZeroU32};

/// Policies applied while merging.
#[derive(Clone, Copy, Debug)]
pub(super) struct MergePolicy {
    pub(super) failsafe_limit: FailsafeLimit,
    pub(super) release_at_consecutive_passes: Option<NonZeroU32>,
    pub(super) now: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(super) struct MergedBatch {
    /// The records to write, in observation order.
    pub(super) records: Vec<TestRecord>,
    pub(super) released: Vec<TestId>,
    pub(super) rejected: Vec<TestId>,
    /// How many records would have been quarantined without the failsafe.
    pub(super) attempted_quarantines: usize,
}

/// Builds the records to write for `observed`, one per test.
///
/// `previous` is the most recent known state of the table. Only observed tests
/// produce records: anything else in the table is left alone.
pub(super) fn merge_outcomes(
    observed: impl IntoIterator<Item = RunOutcome>,
    previous: &HashMap<TestId, TestRecord>,
    policy: MergePolicy,
) -> MergedBatch {
    let mut batch = MergedBatch::default();

    // Indexes into batch.records of new quarantine entries.
    let mut new_quarantines = Vec::new();
    let mut existing_quarantines = 0_usize;

    for outcome in observed {
        let prev = previous.get(outcome.id());
        let record = merge_one(outcome, prev, policy, &mut batch.released);
        if record.is_quarantined() {
            if prev.is_some_and(TestRecord::is_quarantined) {
                existing_quarantines += 1;
            } else {
                new_quarantines.push(batch.records.len());
            }
        }
        batch.records.push(record);
    }

    batch.attempted_quarantines = existing_quarantines + new_quarantines.len();
    if policy
        .failsafe_limit
        .is_exceeded(batch.attempted_quarantines)
    {
        // Existing entries are kept. New ones are admitted in observation
        // order until the limit is reached.
        let admitted = policy
            .failsafe_limit
            .get()
            .saturating_sub(existing_quarantines);
        for &idx in new_quarantines.iter().skip(admitted) {
            let record = &mut batch.records[idx];
            record.status = TestStatus::Failing;
            record.consecutive_passes = 0;
            batch.rejected.push(record.id.clone());
        }
    }

    batch
}

fn merge_one(
    outcome: RunOutcome,
    prev: Option<&TestRecord>,
    policy: MergePolicy,
    released: &mut Vec<TestId>,
) -> TestRecord {
    let RunOutcome {
        identity,
        outcome: mut status,
        passed,
    } = outcome;

    let consecutive_passes = if passed {
        prev.map_or(0, |prev| prev.consecutive_passes)
            .saturating_add(1)
    } else {
        0
    };

    if status == TestStatus::Quarantined
        && policy
            .release_at_consecutive_passes
            .is_some_and(|threshold| consecutive_passes >= threshold.get())
    {
        status = TestStatus::Passing;
        released.push(identity.id.clone());
    }

    let (prev_description, prev_location, prev_attributes) = match prev {
        Some(prev) => (
            prev.full_description.clone(),
            prev.location.clone(),
            prev.extra_attributes.clone(),
        ),
        None => (None, None, None),
    };

    TestRecord {
        id: identity.id,
        status,
        consecutive_passes,
        full_description: identity.full_description.or(prev_description),
        location: identity.location.or(prev_location),
        extra_attributes: identity.extra_attributes.or(prev_attributes),
        updated_at: Some(policy.now),
    }
}
