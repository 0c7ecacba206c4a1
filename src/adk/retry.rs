// SPDX-License-Identifier: MIT

//! Retry policy with configurable backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry
    Fixed,
    /// `base * n` before retry n
    Linear,
    /// `base * 2^(n-1)` before retry n
    #[default]
    Exponential,
}

/// Declared retry behaviour for a step or action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default, alias = "backoffStrategy")]
    pub backoff: BackoffKind,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffKind::default(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, backoff: BackoffKind, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            backoff,
            base_delay_ms,
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-based), capped at `max_delay_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.base_delay_ms == 0 || retry == 0 {
            return Duration::ZERO;
        }
        let base = self.base_delay_ms as u128;
        let raw = match self.backoff {
            BackoffKind::Fixed => base,
            BackoffKind::Linear => base.saturating_mul(retry as u128),
            BackoffKind::Exponential => {
                let shift = (retry - 1).min(20);
                base.saturating_mul(1u128 << shift)
            }
        };
        let cap = (self.max_delay_ms as u128).max(base);
        let millis = u64::try_from(raw.min(cap)).unwrap_or(u64::MAX);
        Duration::from_millis(millis)
    }
}
