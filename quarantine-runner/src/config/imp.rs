// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DatabaseConfig, FailsafeLimit};
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    storage::{Database, check_table_name},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{
    Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState,
};
use serde::Deserialize;
use std::{collections::BTreeSet, num::NonZeroU32, time::Duration};
use tracing::warn;

/// Options that control a single quarantine session.
///
/// Usually obtained from [`QuarantineConfig::options`], but can also be built
/// directly, e.g. by adapters that manage their own settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuarantineOptions {
    /// The table (or worksheet) holding test statuses.
    pub test_statuses_table: String,

    /// Whether observations are uploaded at the end of the run.
    pub record_tests: bool,

    /// Whether failures of quarantined tests are kept from failing the build.
    pub skip_quarantined_tests: bool,

    /// The most tests that may be quarantined by a single upload.
    pub failsafe_limit: FailsafeLimit,

    /// If set, quarantined tests are released after passing this many runs
    /// in a row.
    pub release_at_consecutive_passes: Option<NonZeroU32>,

    /// The longest any single storage operation may take.
    pub storage_timeout: Duration,
}

impl QuarantineOptions {
    /// The default table name.
    pub const DEFAULT_TABLE: &'static str = "test_statuses";

    /// The default storage timeout.
    pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);
}

impl Default for QuarantineOptions {
    fn default() -> Self {
        Self {
            test_statuses_table: Self::DEFAULT_TABLE.to_owned(),
            record_tests: true,
            skip_quarantined_tests: true,
            failsafe_limit: FailsafeLimit::DEFAULT,
            release_at_consecutive_passes: None,
            storage_timeout: Self::DEFAULT_STORAGE_TIMEOUT,
        }
    }
}

/// Overall quarantine configuration.
///
/// Configuration is layered: the embedded [default
/// config](Self::DEFAULT_CONFIG), then the repository's config file, then
/// environment variables prefixed with [`QUARANTINE_`](Self::ENVIRONMENT_PREFIX).
#[derive(Clone, Debug)]
pub struct QuarantineConfig {
    workspace_root: Utf8PathBuf,
    options: QuarantineOptions,
    database: DatabaseConfig,
    log_summary: bool,
}

impl QuarantineConfig {
    /// The default location of the config within the workspace:
    /// `.config/quarantine.toml`.
    pub const CONFIG_PATH: &'static str = ".config/quarantine.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Environment configuration uses this prefix, plus a _.
    ///
    /// Only top-level keys can be set this way: `QUARANTINE_FAILSAFE_LIMIT=3`
    /// sets `failsafe-limit`.
    pub const ENVIRONMENT_PREFIX: &'static str = "QUARANTINE";

    /// Reads the quarantine config from the given file, or if not specified
    /// from `.config/quarantine.toml` in the workspace root.
    ///
    /// If no config file is specified and the workspace doesn't have
    /// `.config/quarantine.toml`, uses the default config options.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config, ignored) =
            Self::read_from_sources(&workspace_root, config_file, Self::make_environment())?;
        if !ignored.is_empty() {
            warn!(
                "ignoring unknown configuration keys in {}: {}",
                config.config_file,
                ignored.into_iter().collect::<Vec<_>>().join(", "),
            );
        }
        Ok(config.into_config(workspace_root))
    }

    /// Returns the workspace root that relative paths are resolved against.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the session options.
    pub fn options(&self) -> &QuarantineOptions {
        &self.options
    }

    /// Returns the database configuration.
    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    /// Returns true if the adapter should print the run summary.
    pub fn log_summary(&self) -> bool {
        self.log_summary
    }

    /// Opens the configured storage backend.
    pub fn open_database(&self) -> Database {
        Database::from_config(&self.database, &self.workspace_root)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn make_environment() -> Environment {
        Environment::with_prefix(Self::ENVIRONMENT_PREFIX)
            .convert_case(config::Case::Kebab)
            .try_parsing(true)
    }

    /// Returns the validated config and the set of ignored keys.
    fn read_from_sources(
        workspace_root: &Utf8Path,
        file: Option<&Utf8Path>,
        environment: Environment,
    ) -> Result<(ValidatedConfig, BTreeSet<String>), ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config()
            .add_source(source)
            .add_source(environment);
        let (deserialized, ignored) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file.clone(), kind))?;
        let config = deserialized
            .validate(config_file.clone())
            .map_err(|kind| ConfigParseError::new(config_file.clone(), kind))?;

        Ok((config, ignored))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(QuarantineConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: QuarantineConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate also reports the key. Drop it so the path
                // is only shown once.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct QuarantineConfigDeserialize {
    test_statuses_table: String,
    record_tests: bool,
    skip_quarantined_tests: bool,
    log_summary: bool,
    failsafe_limit: FailsafeLimit,
    #[serde(default)]
    release_at_consecutive_passes: Option<u32>,
    #[serde(with = "humantime_serde")]
    storage_timeout: Duration,
    #[serde(default)]
    database: DatabaseConfig,
}

impl QuarantineConfigDeserialize {
    fn validate(self, config_file: Utf8PathBuf) -> Result<ValidatedConfig, ConfigParseErrorKind> {
        if let Err(reason) = check_table_name(&self.test_statuses_table) {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "test-statuses-table",
                message: reason.to_owned(),
            });
        }

        let release_at_consecutive_passes = match self.release_at_consecutive_passes {
            None => None,
            Some(n) => Some(NonZeroU32::new(n).ok_or_else(|| {
                ConfigParseErrorKind::InvalidValue {
                    key: "release-at-consecutive-passes",
                    message: "must be a positive number of runs".to_owned(),
                }
            })?),
        };

        if self.storage_timeout.is_zero() {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "storage-timeout",
                message: "must be greater than zero".to_owned(),
            });
        }

        Ok(ValidatedConfig {
            config_file,
            options: QuarantineOptions {
                test_statuses_table: self.test_statuses_table,
                record_tests: self.record_tests,
                skip_quarantined_tests: self.skip_quarantined_tests,
                failsafe_limit: self.failsafe_limit,
                release_at_consecutive_passes,
                storage_timeout: self.storage_timeout,
            },
            database: self.database,
            log_summary: self.log_summary,
        })
    }
}

#[derive(Debug)]
struct ValidatedConfig {
    config_file: Utf8PathBuf,
    options: QuarantineOptions,
    database: DatabaseConfig,
    log_summary: bool,
}

impl ValidatedConfig {
    fn into_config(self, workspace_root: Utf8PathBuf) -> QuarantineConfig {
        QuarantineConfig {
            workspace_root,
            options: self.options,
            database: self.database,
            log_summary: self.log_summary,
        }
    }
}
