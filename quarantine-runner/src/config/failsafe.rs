// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::FailsafeLimitParseError;
use serde::Deserialize;
use std::{fmt, num::NonZeroUsize, str::FromStr};

/// Type for the failsafe-limit config key: the most tests that may be
/// quarantined by a single upload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FailsafeLimit(NonZeroUsize);

impl FailsafeLimit {
    /// The default limit.
    pub const DEFAULT: Self = Self(NonZeroUsize::new(10).unwrap());

    /// Creates a new limit. Returns `None` if `limit` is zero.
    pub fn new(limit: usize) -> Option<Self> {
        NonZeroUsize::new(limit).map(Self)
    }

    /// Returns the limit.
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// Returns true if `quarantined` entries exceed the limit.
    pub fn is_exceeded(self, quarantined: usize) -> bool {
        quarantined > self.get()
    }
}

impl Default for FailsafeLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for FailsafeLimit {
    type Err = FailsafeLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<isize>() {
            Err(e) => Err(FailsafeLimitParseError::new(format!("{e} parsing {s}"))),
            Ok(j) if j <= 0 => Err(FailsafeLimitParseError::new(
                "failsafe-limit may not be <= 0",
            )),
            Ok(j) => Self::new(j.unsigned_abs())
                .ok_or_else(|| FailsafeLimitParseError::new("failsafe-limit may not be <= 0")),
        }
    }
}

impl fmt::Display for FailsafeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for FailsafeLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = FailsafeLimit;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a positive integer")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                FailsafeLimit::from_str(v).map_err(serde::de::Error::custom)
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                usize::try_from(v)
                    .ok()
                    .and_then(FailsafeLimit::new)
                    .ok_or_else(|| {
                        serde::de::Error::invalid_value(serde::de::Unexpected::Signed(v), &self)
                    })
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                usize::try_from(v)
                    .ok()
                    .and_then(FailsafeLimit::new)
                    .ok_or_else(|| {
                        serde::de::Error::invalid_value(serde::de::Unexpected::Unsigned(v), &self)
                    })
            }
        }

        deserializer.deserialize_any(V)
    }
}
