// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, WrapErr};
use quarantine_runner::{
    config::QuarantineConfig,
    engine::{ExampleSignals, Quarantine, RunSummary, TestIdentity, UploadReport},
    storage::StoragePort,
};
use std::sync::Once;

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().expect("color-eyre installed once");
        // A global subscriber may already be set.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// A temporary workspace with a quarantine config, standing in for a
/// repository that is tested by successive CI runs.
pub(crate) struct TestWorkspace {
    dir: Utf8TempDir,
}

impl TestWorkspace {
    pub(crate) fn new(config: &str) -> Result<Self> {
        let dir = camino_tempfile::Builder::new()
            .prefix("quarantine-test-")
            .tempdir()?;
        let config_path = dir.path().join(QuarantineConfig::CONFIG_PATH);
        std::fs::create_dir_all(dir.path().join(".config"))?;
        std::fs::write(&config_path, config)
            .wrap_err_with(|| format!("failed to write {config_path}"))?;
        Ok(Self { dir })
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn path(&self, rel: &str) -> Utf8PathBuf {
        self.dir.path().join(rel)
    }

    pub(crate) fn load_config(&self) -> Result<QuarantineConfig> {
        Ok(QuarantineConfig::from_sources(self.dir.path(), None)?)
    }

    /// Creates the statuses table, as a one-off setup step would.
    pub(crate) async fn create_table(&self) -> Result<()> {
        let config = self.load_config()?;
        config
            .open_database()
            .create_table(&config.options().test_statuses_table)
            .await?;
        Ok(())
    }

    /// Runs a suite against the configured database, the way a CI job does:
    /// fetch, record every example, then upload.
    pub(crate) async fn run_suite(
        &self,
        examples: &[(&str, ExampleSignals)],
    ) -> Result<SuiteRun> {
        let config = self.load_config()?;
        let quarantine = Quarantine::new(config.open_database(), config.options().clone());
        Ok(run_suite_with(&quarantine, examples).await)
    }
}

pub(crate) struct SuiteRun {
    pub(crate) suppressed: Vec<String>,
    pub(crate) upload: UploadReport,
    pub(crate) summary: RunSummary,
}

pub(crate) async fn run_suite_with<S: StoragePort>(
    quarantine: &Quarantine<S>,
    examples: &[(&str, ExampleSignals)],
) -> SuiteRun {
    quarantine.fetch_test_statuses().await;

    let mut suppressed = Vec::new();
    for (id, signals) in examples {
        let classification = quarantine.record_example(TestIdentity::new(*id), *signals);
        if classification.is_some_and(|c| c.suppress_failure) {
            suppressed.push((*id).to_owned());
        }
    }

    let upload = quarantine.upload_tests().await;
    SuiteRun {
        suppressed,
        upload,
        summary: quarantine.summary(),
    }
}
