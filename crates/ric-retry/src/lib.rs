// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use ric_cancel::CancellationToken;
use ric_error::RicError;
use std::future::Future;
use std::time::Duration;

/// Per-attempt timeout applied on top of the overall retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum duration for a single attempt, if set.
    pub per_attempt: Option<Duration>,
}

impl TimeoutConfig {
    /// No per-attempt timeout.
    #[must_use]
    pub fn none() -> Self {
        Self { per_attempt: None }
    }

    /// Cap each attempt at `d`.
    #[must_use]
    pub fn capped_at(d: Duration) -> Self {
        Self {
            per_attempt: Some(d),
        }
    }
}

/// Exponential-backoff retry policy: `base_delay * 2^i` between attempts,
/// up to `max_attempts` total tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    timeout: TimeoutConfig,
}

impl RetryPolicy {
    /// Start building a policy.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Maximum number of attempts this policy allows.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the `i`-th retry (0-indexed: delay before attempt 2 is
    /// `i = 0`).
    #[must_use]
    pub fn delay_for(&self, i: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(i)
    }

    /// Run `f`, retrying on transient failure up to `max_attempts` times.
    ///
    /// A [`RicError::LlmPermanent`] short-circuits retry after the first
    /// attempt. Cancellation of `token` aborts immediately, returning the
    /// most recent error, per §4.5 step 4.
    pub async fn retry<T, F, Fut>(&self, token: &CancellationToken, mut f: F) -> Result<T, RicError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RicError>>,
    {
        let mut attempt = 0;
        loop {
            if token.is_cancelled() {
                return Err(RicError::RateCreditExhausted);
            }

            let result = match self.timeout.per_attempt {
                Some(d) => match tokio::time::timeout(d, f()).await {
                    Ok(r) => r,
                    Err(_) => Err(RicError::Unknown(format!(
                        "attempt {} timed out after {:?}",
                        attempt + 1,
                        d
                    ))),
                },
                None => f().await,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if matches!(err, RicError::LlmPermanent(_)) {
                tracing::debug!(attempt = attempt + 1, "permanent error, not retrying");
                return Err(err);
            }

            attempt += 1;
            if attempt >= self.max_attempts {
                tracing::debug!(attempts = attempt, "retry budget exhausted");
                return Err(err);
            }

            let delay = self.delay_for(attempt - 1);
            tracing::debug!(attempt, ?delay, "retrying after transient error");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => return Err(err),
            }
        }
    }
}

/// Fluent builder for [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    base_delay: Duration,
    timeout: TimeoutConfig,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            timeout: TimeoutConfig::none(),
        }
    }
}

impl RetryPolicyBuilder {
    /// Set the maximum number of attempts (must be at least 1).
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the base delay used in `base * 2^i`.
    #[must_use]
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    /// Set a per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, t: TimeoutConfig) -> Self {
        self.timeout = t;
        self
    }

    /// Finalize the policy.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            timeout: self.timeout,
        }
    }
}
