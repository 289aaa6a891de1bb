// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-session behavior across successive runs.

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use pretty_assertions::assert_eq;
use quarantine_metadata::{TestId, TestRecord, TestStatus};
use quarantine_runner::{
    config::QuarantineOptions,
    engine::{ExampleSignals, Quarantine, QuarantineWarning},
    errors::StorageErrorKind,
    storage::{KeyValueBackend, MemoryKeyValueClient, StoragePort},
};
use std::{collections::BTreeMap, io};

const KEY_VALUE_CONFIG: &str = indoc! {r#"
    [database]
    type = "key-value"
    dir = "quarantine-db"
"#};

async fn stored_statuses(
    workspace: &TestWorkspace,
) -> Result<BTreeMap<String, (TestStatus, u32)>> {
    let config = workspace.load_config()?;
    let records = config
        .open_database()
        .fetch_items(&config.options().test_statuses_table)
        .await?;
    Ok(records
        .into_iter()
        .map(|r| (r.id.to_string(), (r.status, r.consecutive_passes)))
        .collect())
}

#[tokio::test]
async fn merge_leaves_unobserved_tests_alone() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(KEY_VALUE_CONFIG)?;
    workspace.create_table().await?;

    let config = workspace.load_config()?;
    let table = &config.options().test_statuses_table;
    config
        .open_database()
        .write_items(
            table,
            &[
                TestRecord::new("A", TestStatus::Quarantined),
                TestRecord::new("B", TestStatus::Passing),
            ],
        )
        .await?;

    let quarantine = Quarantine::new(config.open_database(), config.options().clone());
    quarantine.fetch_test_statuses().await;
    ensure!(
        quarantine.test_quarantined(&TestId::new("A")),
        "A is quarantined in the baseline"
    );
    quarantine.record_test("A", TestStatus::Passing, true);
    quarantine.record_test("C", TestStatus::Quarantined, false);
    let report = quarantine.upload_tests().await;
    ensure!(report.is_success(), "upload failed: {:?}", report.warnings);

    assert_eq!(
        stored_statuses(&workspace).await?,
        BTreeMap::from([
            ("A".to_owned(), (TestStatus::Passing, 1)),
            ("B".to_owned(), (TestStatus::Passing, 0)),
            ("C".to_owned(), (TestStatus::Quarantined, 0)),
        ])
    );
    Ok(())
}

#[tokio::test]
async fn failsafe_bounds_new_quarantines() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(KEY_VALUE_CONFIG)?;
    workspace.create_table().await?;

    // 15 tests that only passed on a retry: all flaky.
    let ids: Vec<String> = (0..15).map(|i| format!("spec/flaky_spec.rb[1:{i}]")).collect();
    let flaky = ExampleSignals::passed().with_attempt(2, 2);
    let examples: Vec<_> = ids.iter().map(|id| (id.as_str(), flaky)).collect();

    let run = workspace.run_suite(&examples).await?;
    assert_eq!(run.summary.counts.quarantined, 15);
    assert_eq!(run.upload.written, 15);
    assert_eq!(
        run.upload.rejected,
        ids[10..].iter().map(TestId::new).collect::<Vec<_>>()
    );
    ensure!(
        matches!(
            run.upload.warnings.as_slice(),
            [QuarantineWarning::FailsafeExceeded {
                attempted: 15,
                ..
            }]
        ),
        "expected a failsafe warning, found {:?}",
        run.upload.warnings
    );

    let stored = stored_statuses(&workspace).await?;
    let quarantined = stored
        .values()
        .filter(|(status, _)| *status == TestStatus::Quarantined)
        .count();
    assert_eq!(quarantined, 10);
    for id in &ids[10..] {
        assert_eq!(stored[id], (TestStatus::Failing, 0), "{id} was rejected");
    }
    Ok(())
}

#[tokio::test]
async fn release_after_consecutive_passes() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(indoc! {r#"
        release-at-consecutive-passes = 3

        [database]
        type = "key-value"
        dir = "quarantine-db"
    "#})?;
    workspace.create_table().await?;
    let config = workspace.load_config()?;
    config
        .open_database()
        .write_items(
            &config.options().test_statuses_table,
            &[TestRecord::new("A", TestStatus::Quarantined)],
        )
        .await?;

    let pass = [("A", ExampleSignals::passed())];
    let fail = [("A", ExampleSignals::failed())];

    workspace.run_suite(&pass).await?;
    assert_eq!(
        stored_statuses(&workspace).await?["A"],
        (TestStatus::Quarantined, 1)
    );

    // A failure resets the counter. It is suppressed since A is quarantined.
    let run = workspace.run_suite(&fail).await?;
    assert_eq!(run.suppressed, vec!["A".to_owned()]);
    assert_eq!(
        stored_statuses(&workspace).await?["A"],
        (TestStatus::Quarantined, 0)
    );

    for expected in 1..=2 {
        let run = workspace.run_suite(&pass).await?;
        ensure!(run.upload.released.is_empty(), "released too early");
        assert_eq!(
            stored_statuses(&workspace).await?["A"],
            (TestStatus::Quarantined, expected)
        );
    }

    let run = workspace.run_suite(&pass).await?;
    assert_eq!(run.upload.released, vec![TestId::new("A")]);
    assert_eq!(
        stored_statuses(&workspace).await?["A"],
        (TestStatus::Passing, 3)
    );

    // Once released, A is an ordinary test again.
    let run = workspace.run_suite(&fail).await?;
    ensure!(run.suppressed.is_empty(), "released test's failure was suppressed");
    assert_eq!(
        stored_statuses(&workspace).await?["A"],
        (TestStatus::Failing, 0)
    );
    Ok(())
}

#[tokio::test]
async fn fetch_failure_does_not_abort_the_run() -> Result<()> {
    test_init();
    let client = MemoryKeyValueClient::new();
    client.insert_raw(
        QuarantineOptions::DEFAULT_TABLE,
        "A",
        serde_json::json!({"id": "A", "status": "quarantined"}),
    );
    client.fail_next_scan(io::ErrorKind::ConnectionRefused);
    let backend = KeyValueBackend::new(client);

    let quarantine = Quarantine::new(&backend, QuarantineOptions::default());
    let report = quarantine.fetch_test_statuses().await;
    let Some(warning) = &report.warning else {
        panic!("fetch should have failed");
    };
    assert_eq!(
        warning.storage_error().map(|e| e.kind()),
        Some(StorageErrorKind::Connection)
    );

    ensure!(
        !quarantine.test_quarantined(&TestId::new("A")),
        "nothing is quarantined after a failed fetch"
    );
    let classification = quarantine
        .record_example("A", ExampleSignals::failed())
        .expect("final attempt is recorded");
    assert_eq!(classification.outcome, TestStatus::Failing);
    ensure!(!classification.suppress_failure, "failure must be reported");

    // Storage is back by the end of the run.
    let upload = quarantine.upload_tests().await;
    ensure!(upload.is_success(), "upload failed: {:?}", upload.warnings);
    let summary = quarantine.summary();
    assert_eq!(summary.counts.failing, 1);
    assert_eq!(summary.warnings.len(), 1);
    Ok(())
}

#[tokio::test]
async fn repeated_upload_is_a_no_op() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(KEY_VALUE_CONFIG)?;
    workspace.create_table().await?;

    let config = workspace.load_config()?;
    let quarantine = Quarantine::new(config.open_database(), config.options().clone());
    let run = run_suite_with(
        &quarantine,
        &[
            ("A", ExampleSignals::passed()),
            ("B", ExampleSignals::failed()),
        ],
    )
    .await;
    assert_eq!(run.upload.written, 2);

    let table_file = workspace.path("quarantine-db/test_statuses.json");
    let before = std::fs::read(&table_file)?;
    let again = quarantine.upload_tests().await;
    assert_eq!(again.written, 0);
    ensure!(again.warnings.is_empty(), "{:?}", again.warnings);
    assert_eq!(std::fs::read(&table_file)?, before);
    Ok(())
}
