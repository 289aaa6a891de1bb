// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quarantine configuration.
//!
//! Configuration is layered: the built-in defaults, then
//! `.config/quarantine.toml` (or an explicitly passed file), then
//! `QUARANTINE_*` environment variables for top-level keys.

mod database;
mod failsafe;
mod imp;
mod retry_policy;

pub use database::*;
pub use failsafe::*;
pub use imp::*;
pub use retry_policy::*;
