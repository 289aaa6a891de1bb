// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod backends;
mod fixtures;
mod lifecycle;
