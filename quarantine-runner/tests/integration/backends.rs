// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Both backends driven through configuration.

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use pretty_assertions::assert_eq;
use quarantine_metadata::{TestId, TestRecord, TestStatus};
use quarantine_runner::{
    config::{QuarantineConfig, QuarantineOptions, RetryPolicy},
    engine::{ExampleSignals, Quarantine, TestIdentity},
    errors::{ConfigParseErrorKind, StorageErrorKind},
    storage::{BackendKind, KeyValueBackend, MemoryKeyValueClient, StoragePort},
};
use serde_json::json;
use test_case::test_case;

const SPREADSHEET_CONFIG: &str = indoc! {r#"
    [database]
    type = "spreadsheet"
    path = "quarantine/workbook.json"
"#};

const KEY_VALUE_CONFIG: &str = indoc! {r#"
    [database]
    type = "key-value"
    dir = "quarantine-db"
    batch-size = 2
"#};

#[test_case(KEY_VALUE_CONFIG, BackendKind::KeyValue ; "key-value")]
#[test_case(SPREADSHEET_CONFIG, BackendKind::Spreadsheet ; "spreadsheet")]
#[tokio::test]
async fn session_round_trips_records(config: &str, backend: BackendKind) -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(config)?;
    workspace.create_table().await?;

    let config = workspace.load_config()?;
    assert_eq!(config.database().backend_kind(), backend);

    let attributes = json!({"owner": "payments", "retries": 2});
    let quarantine = Quarantine::new(config.open_database(), config.options().clone());
    quarantine.fetch_test_statuses().await;
    quarantine.record_example(
        TestIdentity::fingerprint("spec/cart_spec.rb", "Cart totals line items")
            .with_location("./spec/cart_spec.rb:10")
            .with_extra_attributes(attributes.as_object().cloned().unwrap_or_default()),
        ExampleSignals::passed().with_attempt(2, 3),
    );
    for i in 0..4 {
        let id = format!("spec/other_spec.rb[1:{i}]");
        quarantine.record_example(id.as_str(), ExampleSignals::passed());
    }
    let report = quarantine.upload_tests().await;
    ensure!(report.is_success(), "upload failed: {:?}", report.warnings);
    assert_eq!(report.written, 5);

    // A new session sees what the previous one wrote.
    let next = Quarantine::new(config.open_database(), config.options().clone());
    let fetched = next.fetch_test_statuses().await;
    assert_eq!(fetched.baseline_len, 5);
    assert_eq!(fetched.quarantined, 1);

    let records = config
        .open_database()
        .fetch_items(&config.options().test_statuses_table)
        .await?;
    let flaky = records
        .iter()
        .find(|r| r.status == TestStatus::Quarantined)
        .expect("flaky test was stored");
    assert_eq!(
        flaky.id,
        TestId::fingerprint("spec/cart_spec.rb", "Cart totals line items")
    );
    ensure!(next.test_quarantined(&flaky.id), "flaky test is quarantined");
    assert_eq!(flaky.full_description.as_deref(), Some("Cart totals line items"));
    assert_eq!(flaky.location.as_deref(), Some("./spec/cart_spec.rb:10"));
    assert_eq!(flaky.extra_attributes.as_ref(), attributes.as_object());
    ensure!(flaky.updated_at.is_some(), "updated_at is stamped");
    Ok(())
}

#[tokio::test]
async fn spreadsheet_keeps_its_own_columns() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(SPREADSHEET_CONFIG)?;
    let workbook = workspace.path("quarantine/workbook.json");
    std::fs::create_dir_all(workspace.path("quarantine"))?;
    std::fs::write(
        &workbook,
        serde_json::to_vec(&json!({
            "worksheets": {
                "test_statuses": [
                    ["id", "status", "owner"],
                    ["A", "quarantined", "team-a"],
                    ["B", "passing", "team-b"],
                ],
            },
        }))?,
    )?;

    let run = workspace
        .run_suite(&[
            ("A", ExampleSignals::failed()),
            ("C", ExampleSignals::passed()),
        ])
        .await?;
    assert_eq!(run.suppressed, vec!["A".to_owned()]);

    let contents: serde_json::Value = serde_json::from_slice(&std::fs::read(&workbook)?)?;
    assert_eq!(
        contents["worksheets"]["test_statuses"],
        json!([
            ["id", "status", "owner"],
            ["A", "quarantined", "team-a"],
            ["B", "passing", "team-b"],
            ["C", "passing", ""],
        ])
    );
    Ok(())
}

#[tokio::test]
async fn missing_table_is_reported_not_fatal() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(SPREADSHEET_CONFIG)?;

    let run = workspace
        .run_suite(&[("A", ExampleSignals::failed())])
        .await?;
    ensure!(!run.upload.is_success(), "writing to a missing worksheet fails");
    assert_eq!(run.summary.counts.failing, 1);
    // Fetch, re-fetch and write all failed.
    assert_eq!(run.summary.warnings.len(), 3);
    for warning in &run.summary.warnings {
        let error = warning.storage_error().expect("storage warning");
        assert_eq!(error.kind(), StorageErrorKind::NotFound);
    }
    Ok(())
}

#[tokio::test]
async fn throttled_writes_are_retried() -> Result<()> {
    test_init();
    let client = MemoryKeyValueClient::new().with_table(QuarantineOptions::DEFAULT_TABLE);
    client.throttle_next_puts(2);
    let backend =
        KeyValueBackend::new(client).with_retry_policy(RetryPolicy::immediate(3));

    let quarantine = Quarantine::new(&backend, QuarantineOptions::default());
    quarantine.fetch_test_statuses().await;
    quarantine.record_test("A", TestStatus::Passing, true);
    let report = quarantine.upload_tests().await;

    ensure!(report.is_success(), "upload failed: {:?}", report.warnings);
    assert_eq!(backend.client().put_calls(), 3);
    let stored = backend.fetch_items(QuarantineOptions::DEFAULT_TABLE).await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(
        TestRecord {
            updated_at: None,
            ..stored[0].clone()
        },
        TestRecord {
            consecutive_passes: 1,
            ..TestRecord::new("A", TestStatus::Passing)
        }
    );
    Ok(())
}

#[test]
fn unknown_backend_fails_config_load() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(indoc! {r#"
        [database]
        type = "bigtable"
    "#})?;

    let err = QuarantineConfig::from_sources(workspace.root(), None)
        .expect_err("unknown backend type is rejected");
    assert_eq!(
        err.config_file(),
        workspace.path(QuarantineConfig::CONFIG_PATH)
    );
    ensure!(
        matches!(err.kind(), ConfigParseErrorKind::DeserializeError(_)),
        "unexpected error kind: {:?}",
        err.kind()
    );
    Ok(())
}
