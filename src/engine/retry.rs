// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use crate::config::RetryOptions;

/// Bounded retries with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &RetryOptions) -> Self {
        Self {
            retries: options.get_attempts(),
            backoff: Duration::from_millis(options.get_backoff_ms()),
            multiplier: options.get_backoff_multiplier(),
            max_backoff: Duration::from_millis(options.get_max_backoff_ms()),
        }
    }

    /// No retries, no delay.
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retry `retry` (0-based): `backoff × multiplier^retry`, capped.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let millis = self.backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        if capped.is_finite() && capped > 0.0 {
            Duration::from_millis(capped as u64)
        } else {
            Duration::ZERO
        }
    }
}
