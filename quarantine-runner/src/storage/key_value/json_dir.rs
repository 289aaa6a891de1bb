// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{KeyValueClient, KeyValueClientError, KeyValueItem};
use crate::{
    errors::{MalformedRecordError, StorageError},
    storage::{BackendKind, helpers},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

/// Documents in a table, keyed by test id, in insertion order.
type TableContents = IndexMap<String, serde_json::Value>;

/// A [`KeyValueClient`] that keeps each table in a JSON file.
///
/// The table `name` lives at `<dir>/<name>.json` and holds a JSON object
/// mapping keys to documents. Each batch put rewrites the file atomically.
///
/// Tables are not created implicitly; use [`create_table`](Self::create_table).
#[derive(Clone, Debug)]
pub struct JsonDirClient {
    dir: Utf8PathBuf,
}

impl JsonDirClient {
    /// Creates a new client for tables under `dir`.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory containing the tables.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Creates an empty table if it doesn't already exist.
    pub async fn create_table(&self, table: &str) -> Result<(), StorageError> {
        let path = self.table_path(table)?;
        let existing = helpers::read_optional(&path)
            .await
            .map_err(|error| StorageError::from_io(BackendKind::KeyValue, path.as_str(), error))?;
        if existing.is_some() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| StorageError::from_io(BackendKind::KeyValue, self.dir.as_str(), error))?;
        self.write_table(table, &TableContents::new()).await
    }

    fn table_path(&self, table: &str) -> Result<Utf8PathBuf, StorageError> {
        helpers::check_table_name(table).map_err(|reason| StorageError::InvalidTableName {
            backend: BackendKind::KeyValue,
            table: table.to_owned(),
            reason,
        })?;
        Ok(self.dir.join(format!("{table}.json")))
    }

    async fn read_table(&self, table: &str) -> Result<TableContents, StorageError> {
        let path = self.table_path(table)?;
        let contents = helpers::read_optional(&path)
            .await
            .map_err(|error| StorageError::from_io(BackendKind::KeyValue, path.as_str(), error))?
            .ok_or_else(|| StorageError::NotFound {
                backend: BackendKind::KeyValue,
                table: table.to_owned(),
            })?;

        serde_json::from_str(&contents).map_err(|error| StorageError::Malformed {
            backend: BackendKind::KeyValue,
            table: table.to_owned(),
            error: MalformedRecordError::Table(error),
        })
    }

    async fn write_table(&self, table: &str, contents: &TableContents) -> Result<(), StorageError> {
        let path = self.table_path(table)?;
        let bytes = serde_json::to_vec_pretty(contents).map_err(|error| StorageError::Malformed {
            backend: BackendKind::KeyValue,
            table: table.to_owned(),
            error: MalformedRecordError::Table(error),
        })?;
        helpers::write_atomic(path.clone(), bytes)
            .await
            .map_err(|error| StorageError::from_io(BackendKind::KeyValue, path.as_str(), error))
    }
}

impl KeyValueClient for JsonDirClient {
    async fn scan(&self, table: &str) -> Result<Vec<serde_json::Value>, KeyValueClientError> {
        let contents = self.read_table(table).await?;
        Ok(contents.into_values().collect())
    }

    async fn batch_put(&self, table: &str, items: &[KeyValueItem]) -> Result<(), KeyValueClientError> {
        let mut contents = self.read_table(table).await?;
        for item in items {
            contents.insert(item.key.clone(), item.document.clone());
        }
        self.write_table(table, &contents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::StorageErrorKind,
        storage::{KeyValueBackend, StoragePort},
    };
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use quarantine_metadata::{TestRecord, TestStatus};
    use serde_json::json;

    #[tokio::test]
    async fn table_lifecycle() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let client = JsonDirClient::new(temp_dir.path().join("tables"));

        // The table doesn't exist yet.
        let err = client.scan("statuses").await.unwrap_err();
        assert!(
            matches!(
                err,
                KeyValueClientError::Storage(ref e) if e.kind() == StorageErrorKind::NotFound
            ),
            "{err:?}"
        );

        client.create_table("statuses").await.unwrap();
        assert!(client.scan("statuses").await.unwrap().is_empty());

        client
            .batch_put(
                "statuses",
                &[KeyValueItem {
                    key: "a".to_owned(),
                    document: json!({ "id": "a", "status": "passing" }),
                }],
            )
            .await
            .unwrap();

        // Creating an existing table leaves its contents alone.
        client.create_table("statuses").await.unwrap();
        assert_eq!(
            client.scan("statuses").await.unwrap(),
            vec![json!({ "id": "a", "status": "passing" })]
        );
    }

    #[tokio::test]
    async fn round_trip_through_backend() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let client = JsonDirClient::new(temp_dir.path());
        client.create_table("statuses").await.unwrap();
        let backend = KeyValueBackend::new(client);

        let mut record = TestRecord::new("./spec/a_spec.rb[1:2]", TestStatus::Quarantined);
        record.full_description = Some("A does things".to_owned());
        record.extra_attributes = Some(
            json!({ "build": 1234, "tags": ["slow"] })
                .as_object()
                .cloned()
                .unwrap(),
        );

        backend
            .write_items("statuses", std::slice::from_ref(&record))
            .await
            .unwrap();
        assert_eq!(backend.fetch_items("statuses").await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn corrupt_table_is_malformed() {
        let temp_dir = Utf8TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("statuses.json"), "[not json").unwrap();
        let backend = KeyValueBackend::new(JsonDirClient::new(temp_dir.path()));

        let err = backend.fetch_items("statuses").await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Malformed);
    }

    #[tokio::test]
    async fn table_names_stay_inside_dir() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let client = JsonDirClient::new(temp_dir.path().join("tables"));

        let err = client.create_table("../outside").await.unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::InvalidTableName);

        let backend = KeyValueBackend::new(client);
        let err = backend
            .write_items(
                "../outside",
                &[TestRecord::new("a", TestStatus::Passing)],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::InvalidTableName);
        assert!(!temp_dir.path().join("outside.json").exists());
    }
}
