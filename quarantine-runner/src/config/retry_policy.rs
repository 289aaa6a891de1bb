// Copyright (c) The quarantine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Deserialize;
use std::time::Duration;

/// How the key-value backend retries a batch that the service throttled.
///
/// In config, either a bare number of retries made back to back, or a table:
///
/// ```toml
/// retries = { count = 5, backoff = "exponential", delay = "50ms", max-delay = "2s", jitter = true }
/// ```
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RetryPolicyDeserialize")]
pub struct RetryPolicy {
    /// The number of times a throttled batch is retried before the write
    /// fails.
    pub count: u32,

    /// The wait before the first retry.
    pub delay: Duration,

    /// How the wait grows between retries.
    pub backoff: Backoff,

    /// If true, each wait is scaled by a random factor in `(0.5, 1]`.
    pub jitter: bool,
}

/// How the wait between throttle retries grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Every retry waits the same [`delay`](RetryPolicy::delay).
    Fixed,

    /// The wait doubles after each retry.
    Exponential {
        /// Caps the wait, if set.
        max_delay: Option<Duration>,
    },
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::default_throttle_policy()
    }
}

impl RetryPolicy {
    /// Retries `count` times without waiting in between.
    pub fn immediate(count: u32) -> Self {
        Self {
            count,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    /// The policy used when none is configured: five retries with jittered
    /// exponential backoff starting at 50ms, capped at 2s.
    pub fn default_throttle_policy() -> Self {
        Self {
            count: 5,
            delay: Duration::from_millis(50),
            backoff: Backoff::Exponential {
                max_delay: Some(Duration::from_secs(2)),
            },
            jitter: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(
    untagged,
    expecting = "a retry count (3) or a table ({ count = 3, backoff = \"exponential\", delay = \"50ms\" })"
)]
enum RetryPolicyDeserialize {
    Count(u32),
    Table(RetryTable),
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RetryTable {
    count: u32,
    #[serde(default)]
    backoff: BackoffKind,
    #[serde(default, with = "humantime_serde")]
    delay: Duration,
    #[serde(default, with = "humantime_serde")]
    max_delay: Option<Duration>,
    #[serde(default)]
    jitter: bool,
}

#[derive(Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

impl TryFrom<RetryPolicyDeserialize> for RetryPolicy {
    type Error = &'static str;

    fn try_from(value: RetryPolicyDeserialize) -> Result<Self, Self::Error> {
        let table = match value {
            RetryPolicyDeserialize::Count(count) => return Ok(Self::immediate(count)),
            RetryPolicyDeserialize::Table(table) => table,
        };

        if table.jitter && table.delay.is_zero() {
            return Err("`jitter` needs a non-zero `delay`");
        }

        let backoff = match table.backoff {
            BackoffKind::Fixed => {
                if table.max_delay.is_some() {
                    return Err("`max-delay` only applies to exponential backoff");
                }
                Backoff::Fixed
            }
            BackoffKind::Exponential => {
                if table.count == 0 {
                    return Err("exponential backoff needs a non-zero `count`");
                }
                if table.delay.is_zero() {
                    return Err("exponential backoff needs a non-zero `delay`");
                }
                if table.max_delay.is_some_and(|max| max < table.delay) {
                    return Err("`max-delay` must be at least `delay`");
                }
                Backoff::Exponential {
                    max_delay: table.max_delay,
                }
            }
        };

        Ok(Self {
            count: table.count,
            delay: table.delay,
            backoff,
            jitter: table.jitter,
        })
    }
}
