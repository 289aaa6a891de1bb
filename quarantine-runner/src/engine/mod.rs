// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The quarantine engine.
//!
//! A [`Quarantine`] holds the state of one CI run: the baseline fetched
//! before the suite starts, and the outcomes recorded while it runs. At the end
//! of the suite, [`Quarantine::upload_tests`] re-reads the table and merges the
//! outcomes into it, applying two policies:
//!
//! - **Release**: if `release-at-consecutive-passes` is set, a quarantined
//!   test that has passed that many runs in a row is written as passing.
//! - **Failsafe**: at most `failsafe-limit` records are written as quarantined.
//!   Tests that were already quarantined keep their status. New entries
//!   beyond the limit are written as failing instead.
//!
//! Storage errors never escape the engine. They are logged and returned as
//! [`QuarantineWarning`]s.

mod imp;
mod merge;
mod outcome;
mod report;
mod summary;

pub use imp::*;
pub use outcome::*;
pub use report::*;
pub use summary::*;
