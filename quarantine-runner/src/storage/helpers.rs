// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use std::io;

/// Reads a file to a string, returning `None` if it doesn't exist.
pub(super) async fn read_optional(path: &Utf8Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Replaces the contents of `path` atomically: readers observe either the old
/// file or the new one, never a partial write.
pub(super) async fn write_atomic(path: Utf8PathBuf, contents: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || {
        atomicwrites::AtomicFile::new(&path, atomicwrites::AllowOverwrite)
            .write(|file| io::Write::write_all(file, &contents))
            .map_err(|error| match error {
                atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error) => error,
            })
    })
    .await
    .map_err(io::Error::other)?
}

/// Checks that `table` can be used as a single file name component.
///
/// Returns the reason the name is rejected, if any.
pub(crate) fn check_table_name(table: &str) -> Result<(), &'static str> {
    if table.trim().is_empty() {
        Err("table name must not be empty")
    } else if table.contains(['/', '\\']) {
        Err("table name must not contain path separators")
    } else if table == "." || table == ".." {
        Err("table name must not be `.` or `..`")
    } else {
        Ok(())
    }
}
