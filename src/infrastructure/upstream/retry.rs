//! # Retry Policy
//!
//! Backoff settings for one upstream, turned into a `backon` exponential
//! backoff. The n-th retry (0-indexed) waits `min(base * 2^n, max_delay)`,
//! plus backon's jitter when enabled.
//!
//! [`RetryPolicy::within_budget`] stops the schedule as soon as the next
//! delay would end past the call deadline.

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::time::{Duration, Instant};

/// Statuses retried unless configured otherwise.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Retry behaviour for one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first (0 = single attempt).
    pub max_retries: u32,
    /// Delay before the first retry, before jitter.
    pub base_delay: Duration,
    /// Cap on the delay, before jitter.
    pub max_delay: Duration,
    /// Add random jitter to every delay.
    pub jitter: bool,
    /// HTTP statuses treated as transient.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(150),
            max_delay: Duration::from_millis(2000),
            jitter: true,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the maximum retry count.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets base and maximum delay.
    #[must_use]
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the statuses treated as transient.
    #[must_use]
    pub fn with_retryable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retryable_statuses = statuses;
        self
    }

    /// Returns the exponential backoff described by this policy.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }

    /// Returns the backoff cut off at `deadline`.
    #[must_use]
    pub fn within_budget(&self, deadline: Instant) -> BudgetedBackoff {
        BudgetedBackoff {
            builder: self.backoff(),
            deadline,
        }
    }

    /// Returns true if `status` is transient.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

/// Exponential backoff that yields no delay ending past a deadline.
#[derive(Debug, Clone)]
pub struct BudgetedBackoff {
    builder: ExponentialBuilder,
    deadline: Instant,
}

impl BackoffBuilder for BudgetedBackoff {
    type Backoff = BudgetedDelays;

    fn build(self) -> Self::Backoff {
        BudgetedDelays {
            inner: self.builder.build(),
            deadline: self.deadline,
        }
    }
}

/// Delay sequence produced by [`BudgetedBackoff`].
#[derive(Debug)]
pub struct BudgetedDelays {
    inner: ExponentialBackoff,
    deadline: Instant,
}

impl Iterator for BudgetedDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.inner.next()?;
        (Instant::now() + delay < self.deadline).then_some(delay)
    }
}
