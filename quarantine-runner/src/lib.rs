// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Quarantine reconciliation for flaky and failing tests.
//!
//! A CI run drives a [`Quarantine`](engine::Quarantine) session through three
//! calls made by a test-framework adapter:
//!
//! 1. [`fetch_test_statuses`](engine::Quarantine::fetch_test_statuses) before
//!    the suite, which loads the baseline of known statuses.
//! 2. [`record_test`](engine::Quarantine::record_test) after each test,
//!    usually through [`record_example`](engine::Quarantine::record_example)
//!    which also applies the outcome classification policy.
//! 3. [`upload_tests`](engine::Quarantine::upload_tests) after the suite,
//!    which merges the run's observations back into storage.
//!
//! Storage is abstracted by the [`StoragePort`](storage::StoragePort) trait,
//! implemented by a key-value backend and a spreadsheet backend.

pub mod config;
pub mod engine;
pub mod errors;
pub mod storage;
#[cfg(test)]
mod test_helpers;
