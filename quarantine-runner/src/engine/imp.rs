// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    Classification, ExampleSignals, FetchReport, OutcomeCounts, QuarantineWarning, RunOutcome,
    RunSummary, TestIdentity, UploadReport, classify,
    merge::{MergePolicy, merge_outcomes},
};
use crate::{
    config::QuarantineOptions,
    errors::{DisplayErrorChain, StorageError},
    storage::{StorageOperation, StoragePort},
};
use chrono::Utc;
use indexmap::{IndexMap, IndexSet};
use quarantine_metadata::{TestId, TestRecord, TestStatus};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};
use tracing::{debug, error, info, warn};

/// The lifecycle state of a [`Quarantine`] session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has happened yet.
    Idle,

    /// The baseline has been fetched (or the fetch failed and the baseline is
    /// empty).
    Fetched,

    /// At least one outcome has been recorded since the last upload.
    Recording,

    /// Observations have been uploaded.
    Uploaded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetched => write!(f, "fetched"),
            Self::Recording => write!(f, "recording"),
            Self::Uploaded => write!(f, "uploaded"),
        }
    }
}

/// A quarantine session for one CI run.
///
/// All methods take `&self`: a session can be shared between the test
/// framework's workers, and [`record_test`](Self::record_test) may be called
/// from several threads at once.
#[derive(Debug)]
pub struct Quarantine<S> {
    storage: S,
    options: QuarantineOptions,
    baseline: OnceLock<HashMap<TestId, TestRecord>>,
    session: Mutex<Session>,
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    // Last outcome per test, in order of first observation.
    observed: IndexMap<TestId, RunOutcome>,
    counts: OutcomeCounts,
    quarantined_tests: IndexSet<TestId>,
    warnings: Vec<QuarantineWarning>,
}

impl<S: StoragePort> Quarantine<S> {
    /// Creates a new session over `storage`.
    pub fn new(storage: S, options: QuarantineOptions) -> Self {
        Self {
            storage,
            options,
            baseline: OnceLock::new(),
            session: Mutex::new(Session {
                state: SessionState::Idle,
                observed: IndexMap::new(),
                counts: OutcomeCounts::default(),
                quarantined_tests: IndexSet::new(),
                warnings: Vec::new(),
            }),
        }
    }

    /// Returns the storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the options for this session.
    pub fn options(&self) -> &QuarantineOptions {
        &self.options
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lock_session().state
    }

    /// Loads the baseline of known test statuses.
    ///
    /// Never fails: if storage cannot be read, the baseline is left empty, so
    /// that no test is treated as quarantined, and the returned report carries
    /// a warning. Only the first call reads from storage.
    pub async fn fetch_test_statuses(&self) -> FetchReport {
        if let Some(baseline) = self.baseline.get() {
            debug!("test statuses already fetched, reusing baseline");
            return FetchReport {
                baseline_len: baseline.len(),
                quarantined: count_quarantined(baseline),
                warning: None,
            };
        }

        let table = &self.options.test_statuses_table;
        let (baseline, warning) = match self.fetch_with_timeout().await {
            Ok(records) => {
                let baseline = index_records(records);
                debug!(
                    "loaded {} test statuses from `{table}` ({}), {} quarantined",
                    baseline.len(),
                    self.storage.backend_kind(),
                    count_quarantined(&baseline),
                );
                (baseline, None)
            }
            Err(error) => {
                let warning = QuarantineWarning::FetchFailed {
                    table: table.clone(),
                    backend: self.storage.backend_kind(),
                    error: Arc::new(error),
                };
                warn!("{warning}");
                (HashMap::new(), Some(warning))
            }
        };

        // A concurrent call may have won the race; its baseline is kept.
        let baseline = self.baseline.get_or_init(|| baseline);

        let mut session = self.lock_session();
        if session.state == SessionState::Idle {
            session.state = SessionState::Fetched;
        }
        if let Some(warning) = &warning {
            session.warnings.push(warning.clone());
        }

        FetchReport {
            baseline_len: baseline.len(),
            quarantined: count_quarantined(baseline),
            warning,
        }
    }

    /// Returns true if the baseline has `id` quarantined.
    ///
    /// Always false before [`fetch_test_statuses`](Self::fetch_test_statuses)
    /// has completed, or if it failed.
    pub fn test_quarantined(&self, id: &TestId) -> bool {
        self.baseline
            .get()
            .and_then(|baseline| baseline.get(id))
            .is_some_and(TestRecord::is_quarantined)
    }

    /// Records the outcome of a test.
    ///
    /// If a test is recorded more than once, the last outcome is the one
    /// uploaded. Every call is counted in the [summary](Self::summary).
    pub fn record_test(
        &self,
        identity: impl Into<TestIdentity>,
        outcome: TestStatus,
        passed: bool,
    ) {
        let identity = identity.into();
        let mut session = self.lock_session();
        session.state = SessionState::Recording;
        session.counts.add(outcome);
        if outcome == TestStatus::Quarantined {
            session.quarantined_tests.insert(identity.id.clone());
        }
        session.observed.insert(
            identity.id.clone(),
            RunOutcome {
                identity,
                outcome,
                passed,
            },
        );
    }

    /// Classifies an example from its raw signals and records the result.
    ///
    /// Returns `None` if nothing was recorded because the example will be
    /// retried. Otherwise, the adapter should hide the example's failure if
    /// [`suppress_failure`](Classification::suppress_failure) is set.
    pub fn record_example(
        &self,
        identity: impl Into<TestIdentity>,
        signals: ExampleSignals,
    ) -> Option<Classification> {
        let identity = identity.into();
        let quarantined = self.test_quarantined(&identity.id);
        let classification =
            classify(signals, quarantined, self.options.skip_quarantined_tests)?;
        self.record_test(identity, classification.outcome, classification.passed);
        Some(classification)
    }

    /// Merges this run's observations into storage.
    ///
    /// The table is re-read first so that records written by concurrent runs
    /// since the baseline was fetched aren't clobbered. Observations are
    /// consumed: calling this again without recording anything new writes
    /// nothing.
    ///
    /// Never fails. Storage errors are logged and returned as warnings.
    pub async fn upload_tests(&self) -> UploadReport {
        let observed = {
            let mut session = self.lock_session();
            session.state = SessionState::Uploaded;
            std::mem::take(&mut session.observed)
        };

        if !self.options.record_tests {
            debug!(
                "recording test statuses is disabled, discarding {} outcomes",
                observed.len()
            );
            return UploadReport::skipped();
        }
        if observed.is_empty() {
            debug!("no test outcomes to upload");
            return UploadReport::default();
        }

        let table = &self.options.test_statuses_table;
        let backend = self.storage.backend_kind();
        let mut report = UploadReport::default();

        let previous = match self.fetch_with_timeout().await {
            Ok(records) => index_records(records),
            Err(error) => {
                let warning = QuarantineWarning::RefetchFailed {
                    table: table.clone(),
                    backend,
                    error: Arc::new(error),
                };
                warn!("{warning}");
                report.warnings.push(warning);
                self.baseline.get().cloned().unwrap_or_default()
            }
        };

        let batch = merge_outcomes(
            observed.into_values(),
            &previous,
            MergePolicy {
                failsafe_limit: self.options.failsafe_limit,
                release_at_consecutive_passes: self.options.release_at_consecutive_passes,
                now: Utc::now(),
            },
        );

        if !batch.rejected.is_empty() {
            let warning = QuarantineWarning::FailsafeExceeded {
                limit: self.options.failsafe_limit,
                attempted: batch.attempted_quarantines,
                rejected: batch.rejected.clone(),
            };
            warn!("{warning}");
            report.warnings.push(warning);
        }
        if !batch.released.is_empty() {
            info!(
                "releasing {} tests from quarantine: {}",
                batch.released.len(),
                batch
                    .released
                    .iter()
                    .map(TestId::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        match self.write_with_timeout(&batch.records).await {
            Ok(()) => {
                debug!(
                    "wrote {} test statuses to `{table}` ({backend})",
                    batch.records.len()
                );
                report.written = batch.records.len();
            }
            Err(err) => {
                error!(
                    table = %table,
                    backend = %backend,
                    "failed to upload test statuses: {}",
                    DisplayErrorChain(&err),
                );
                report.warnings.push(QuarantineWarning::UploadFailed {
                    table: table.clone(),
                    backend,
                    error: Arc::new(err),
                });
            }
        }

        report.released = batch.released;
        report.rejected = batch.rejected;
        self.lock_session()
            .warnings
            .extend(report.warnings.iter().cloned());
        report
    }

    /// Returns a tally of the outcomes recorded so far.
    pub fn summary(&self) -> RunSummary {
        let session = self.lock_session();
        RunSummary {
            counts: session.counts,
            quarantined_tests: session.quarantined_tests.iter().cloned().collect(),
            warnings: session.warnings.clone(),
        }
    }

    // ---
    // Helper methods
    // ---

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_with_timeout(&self) -> Result<Vec<TestRecord>, StorageError> {
        let table = &self.options.test_statuses_table;
        match tokio::time::timeout(self.options.storage_timeout, self.storage.fetch_items(table))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(self.timed_out(StorageOperation::Fetch)),
        }
    }

    async fn write_with_timeout(&self, records: &[TestRecord]) -> Result<(), StorageError> {
        let table = &self.options.test_statuses_table;
        match tokio::time::timeout(
            self.options.storage_timeout,
            self.storage.write_items(table, records),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(self.timed_out(StorageOperation::Write)),
        }
    }

    fn timed_out(&self, operation: StorageOperation) -> StorageError {
        StorageError::TimedOut {
            backend: self.storage.backend_kind(),
            operation,
            table: self.options.test_statuses_table.clone(),
            timeout: self.options.storage_timeout,
        }
    }
}

// If a table somehow holds more than one record for an id, the last one wins.
fn index_records(records: Vec<TestRecord>) -> HashMap<TestId, TestRecord> {
    records.into_iter().map(|r| (r.id.clone(), r)).collect()
}

fn count_quarantined(baseline: &HashMap<TestId, TestRecord>) -> usize {
    baseline.values().filter(|r| r.is_quarantined()).count()
}
