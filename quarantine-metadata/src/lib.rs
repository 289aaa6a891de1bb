// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Serializable record model for quarantine test statuses.
//!
//! These types describe what is persisted per test across CI runs: a stable
//! [`TestId`], the [`TestStatus`] vocabulary, and the [`TestRecord`] row
//! itself. Storage backends and the quarantine engine live in
//! `quarantine-runner`.

mod errors;
mod record;

pub use errors::*;
pub use record::*;
